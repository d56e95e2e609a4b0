//! Scoped storage sessions.
//!
//! A session is acquired once per request and released when dropped, on every
//! exit path. The Postgres implementation hands back a pooled connection.

use super::statement::Statement;
use crate::{
    db::{PgConnectionManager, PgPool},
    error::{Result, ServiceError},
};
use async_trait::async_trait;
use bb8::PooledConnection;
use chrono::NaiveDateTime;
use diesel::deserialize::QueryableByName;
use diesel::pg::Pg;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_query;
use diesel::sql_types::{Float8, Jsonb, Nullable, Text, Timestamp};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::{debug, error};

/// One result row before geometry normalisation.
#[derive(Debug, Clone, PartialEq, QueryableByName)]
pub struct RawRow {
    #[diesel(sql_type = Jsonb)]
    pub properties: serde_json::Value,
    #[diesel(sql_type = Nullable<Text>)]
    pub geometry: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, QueryableByName, serde::Serialize)]
pub struct Extent {
    #[diesel(sql_type = Nullable<Float8>)]
    #[serde(rename = "min")]
    pub min_value: Option<f64>,
    #[diesel(sql_type = Nullable<Float8>)]
    #[serde(rename = "max")]
    pub max_value: Option<f64>,
}

#[derive(QueryableByName)]
struct TimeRow {
    #[diesel(sql_type = Nullable<Timestamp>)]
    at: Option<NaiveDateTime>,
}

#[derive(QueryableByName)]
struct TextRow {
    #[diesel(sql_type = Nullable<Text>)]
    value: Option<String>,
}

#[async_trait]
pub trait Session: Send {
    async fn load_rows(&mut self, statement: &Statement) -> Result<Vec<RawRow>>;

    /// Expects a single `at` column.
    async fn load_times(&mut self, statement: &Statement) -> Result<Vec<Option<NaiveDateTime>>>;

    /// Expects a single `value` column.
    async fn load_texts(&mut self, statement: &Statement) -> Result<Vec<Option<String>>>;

    /// Expects one row of `min_value`/`max_value`.
    async fn load_extent(&mut self, statement: &Statement) -> Result<Extent>;
}

#[async_trait]
pub trait SessionSource: Send + Sync {
    type Session: Session;

    async fn acquire(&self) -> Result<Self::Session>;
}

#[derive(Clone)]
pub struct PgSessions {
    pool: PgPool,
}

impl PgSessions {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionSource for PgSessions {
    type Session = PgSession;

    async fn acquire(&self) -> Result<PgSession> {
        let conn = self.pool.get_owned().await.map_err(|err| {
            error!(error = ?err, "failed to acquire database connection");
            ServiceError::StorageUnavailable(format!("{err:?}"))
        })?;
        Ok(PgSession { conn })
    }
}

pub struct PgSession {
    conn: PooledConnection<'static, PgConnectionManager>,
}

impl PgSession {
    fn prepare(statement: &Statement) -> BoxedSqlQuery<'static, Pg, SqlQuery> {
        let sql = statement.sql();
        debug!(%sql, binds = statement.binds().len(), "issuing statement");
        let mut query = sql_query(sql).into_boxed::<Pg>();
        for bind in statement.binds() {
            query = bind.apply(query);
        }
        query
    }

    fn conn(&mut self) -> &mut AsyncPgConnection {
        &mut self.conn
    }
}

#[async_trait]
impl Session for PgSession {
    async fn load_rows(&mut self, statement: &Statement) -> Result<Vec<RawRow>> {
        let query = Self::prepare(statement);
        Ok(query.load::<RawRow>(self.conn()).await?)
    }

    async fn load_times(&mut self, statement: &Statement) -> Result<Vec<Option<NaiveDateTime>>> {
        let query = Self::prepare(statement);
        let rows = query.load::<TimeRow>(self.conn()).await?;
        Ok(rows.into_iter().map(|row| row.at).collect())
    }

    async fn load_texts(&mut self, statement: &Statement) -> Result<Vec<Option<String>>> {
        let query = Self::prepare(statement);
        let rows = query.load::<TextRow>(self.conn()).await?;
        Ok(rows.into_iter().map(|row| row.value).collect())
    }

    async fn load_extent(&mut self, statement: &Statement) -> Result<Extent> {
        let query = Self::prepare(statement);
        let rows = query.load::<Extent>(self.conn()).await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }
}
