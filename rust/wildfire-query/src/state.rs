use crate::{
    config::AppConfig,
    query::{PgSessions, QueryEngine},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState<S = PgSessions> {
    pub config: Arc<AppConfig>,
    pub query: QueryEngine<S>,
}

impl<S> AppState<S> {
    pub fn new(config: Arc<AppConfig>, query: QueryEngine<S>) -> Self {
        Self { config, query }
    }
}
