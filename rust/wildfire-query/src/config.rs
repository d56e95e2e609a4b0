use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub max_pool_size: u32,
    pub pg_ssl_root_cert: Option<String>,
    pub pg_ssl_cert: Option<String>,
    pub pg_ssl_key: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    wildfire_listen_addr: Option<String>,
    #[serde(default)]
    wildfire_listen_host: Option<String>,
    #[serde(default)]
    wildfire_listen_port: Option<u16>,
    #[serde(default)]
    wildfire_database_url: Option<String>,
    #[serde(default)]
    database_url: Option<String>,
    /// Connection string variable read by the earlier dashboard deployments.
    #[serde(default)]
    postgres: Option<String>,
    #[serde(default = "default_pool_size")]
    wildfire_max_pool_size: u32,
    #[serde(default)]
    wildfire_api_key: Option<String>,
    #[serde(default)]
    pgsslrootcert: Option<String>,
    #[serde(default)]
    pgsslcert: Option<String>,
    #[serde(default)]
    pgsslkey: Option<String>,
}

const fn default_pool_size() -> u32 {
    10
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse WILDFIRE_* environment variables")?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let listen_addr = resolve_addr(
            raw.wildfire_listen_addr,
            raw.wildfire_listen_host,
            raw.wildfire_listen_port,
        )?;

        let database_url = [raw.wildfire_database_url, raw.database_url, raw.postgres]
            .into_iter()
            .flatten()
            .find(|url| !url.trim().is_empty())
            .context("WILDFIRE_DATABASE_URL, DATABASE_URL or POSTGRES must be set")?;

        Ok(Self {
            listen_addr,
            database_url,
            max_pool_size: raw.wildfire_max_pool_size.max(1),
            pg_ssl_root_cert: non_blank(raw.pgsslrootcert),
            pg_ssl_cert: non_blank(raw.pgsslcert),
            pg_ssl_key: non_blank(raw.pgsslkey),
            api_key: non_blank(raw.wildfire_api_key),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid WILDFIRE_LISTEN_ADDR value")?
            .next()
            .context("WILDFIRE_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8480);
    format!("{host}:{port}")
        .to_socket_addrs()
        .context("invalid listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}
