pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod query;
pub mod registry;
pub mod server;
pub mod shape;
pub mod state;
pub mod telemetry;
pub mod time;

use crate::{config::AppConfig, server::Server};

/// Bootstraps the wildfire query service from environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    Server::new(config).await?.run().await
}
