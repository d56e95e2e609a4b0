use anyhow::Context;
use axum::{
    body::{self, Body},
    http::{self, Request, StatusCode},
    Router,
};
use rustls::{ClientConfig, RootCertStore};
use rustls_pemfile::certs;
use serde::Serialize;
use serde_json::Value;
use std::{
    env,
    fs::{self, File},
    future::Future,
    io::BufReader,
    net::SocketAddr,
    path::PathBuf,
    sync::Once,
};
use tokio::{
    task::JoinHandle,
    time::{sleep, Duration},
};
use tokio_postgres::{error::SqlState, Client, Config as PgConfig, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tower::ServiceExt;
use wildfire_query::{config::AppConfig, query::QueryRequest, server::Server};

const API_KEY: &str = "test-api-key";
const DB_CONNECT_RETRIES: usize = 120;
const DB_CONNECT_DELAY_MS: u64 = 250;
const FIXTURE_LOCK_ID: i64 = 7_310_224;

static TRACING_INIT: Once = Once::new();

/// Runs a test closure against the service router backed by the seeded PostGIS fixture.
pub async fn with_wildfire_harness<F, Fut>(test: F)
where
    F: FnOnce(WildfireTestHarness) -> Fut,
    Fut: Future<Output = ()>,
{
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });

    let database_url = match read_env_value("WILDFIRE_TEST_DATABASE_URL")
        .expect("failed to read WILDFIRE_TEST_DATABASE_URL")
    {
        Some(url) => url,
        None => {
            eprintln!(
                "[wildfire-test] skipping harness: WILDFIRE_TEST_DATABASE_URL is not set"
            );
            return;
        }
    };

    let (client, _task) = connect_with_retry(&database_url)
        .await
        .expect("failed to connect to fixture database");
    client
        .execute("SELECT pg_advisory_lock($1)", &[&FIXTURE_LOCK_ID])
        .await
        .expect("failed to take fixture lock");
    seed_fixture_database(&client)
        .await
        .expect("failed to seed fixture database");

    let server = Server::new(test_config(database_url))
        .await
        .expect("failed to boot wildfire query server");
    let harness = WildfireTestHarness {
        router: server.router(),
        api_key: API_KEY.to_string(),
    };

    test(harness).await;

    let _ = client
        .execute("SELECT pg_advisory_unlock($1)", &[&FIXTURE_LOCK_ID])
        .await;
}

fn test_config(database_url: String) -> AppConfig {
    AppConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        database_url,
        max_pool_size: 4,
        pg_ssl_root_cert: env::var("PGSSLROOTCERT").ok(),
        pg_ssl_cert: env::var("PGSSLCERT").ok(),
        pg_ssl_key: env::var("PGSSLKEY").ok(),
        api_key: Some(API_KEY.to_string()),
    }
}

async fn seed_fixture_database(client: &Client) -> anyhow::Result<()> {
    ensure_postgis(client).await?;
    client
        .batch_execute(&load_fixture("schema.sql")?)
        .await
        .context("schema.sql failed")?;
    client
        .batch_execute(&load_fixture("seed.sql")?)
        .await
        .context("seed.sql failed")?;
    Ok(())
}

async fn ensure_postgis(client: &Client) -> anyhow::Result<()> {
    match client
        .batch_execute("CREATE EXTENSION IF NOT EXISTS postgis;")
        .await
    {
        Ok(()) => Ok(()),
        Err(err) if err.code() == Some(&SqlState::INSUFFICIENT_PRIVILEGE) => {
            let installed = client
                .query_opt("SELECT 1 FROM pg_extension WHERE extname = 'postgis'", &[])
                .await?
                .is_some();
            if installed {
                Ok(())
            } else {
                Err(err.into())
            }
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Clone)]
pub struct WildfireTestHarness {
    router: Router,
    api_key: String,
}

impl WildfireTestHarness {
    pub async fn query(&self, request: QueryRequest) -> http::Response<Body> {
        self.post("/api/query", &request, true).await
    }

    pub async fn query_without_api_key(&self, request: QueryRequest) -> http::Response<Body> {
        self.post("/api/query", &request, false).await
    }

    pub async fn get(&self, path: &str) -> http::Response<Body> {
        let request = Request::builder()
            .uri(path)
            .header("x-api-key", &self.api_key)
            .body(Body::empty())
            .expect("failed to build harness request");
        self.send(request).await
    }

    async fn post<T: Serialize>(
        &self,
        path: &str,
        payload: &T,
        include_api_key: bool,
    ) -> http::Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(http::header::CONTENT_TYPE, "application/json");

        if include_api_key {
            builder = builder.header("x-api-key", &self.api_key);
        }

        let body = serde_json::to_vec(payload).expect("request payload should serialize");
        let request = builder
            .body(Body::from(body))
            .expect("failed to build harness request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> http::Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should handle harness request")
    }
}

pub async fn read_json(response: http::Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 4 * 1024 * 1024)
        .await
        .expect("response body should be readable");
    let value =
        serde_json::from_slice::<Value>(&bytes).expect("response body should be valid JSON");
    (status, value)
}

fn read_env_value(key: &str) -> anyhow::Result<Option<String>> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => anyhow::bail!("{key} is set but empty"),
        Ok(value) => Ok(Some(value)),
        Err(_) => Ok(None),
    }
}

fn load_fixture(name: &str) -> anyhow::Result<String> {
    let path = fixture_root().join(name);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture {name} from {}", path.display()))
}

fn fixture_root() -> PathBuf {
    if let Ok(root) = env::var("WILDFIRE_FIXTURE_ROOT") {
        let candidate = PathBuf::from(root);
        if candidate.exists() {
            return candidate;
        }
    }

    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

async fn connect_with_retry(database_url: &str) -> anyhow::Result<(Client, JoinHandle<()>)> {
    let mut attempts = 0usize;
    loop {
        let config: PgConfig = database_url.parse()?;
        match connect_with_env_tls(config).await {
            Ok(connected) => return Ok(connected),
            Err(err) if attempts >= DB_CONNECT_RETRIES => return Err(err),
            Err(_) => {
                attempts += 1;
                sleep(Duration::from_millis(DB_CONNECT_DELAY_MS)).await;
            }
        }
    }
}

async fn connect_with_env_tls(config: PgConfig) -> anyhow::Result<(Client, JoinHandle<()>)> {
    match tls_connector_from_env()? {
        Some(connector) => {
            let (client, connection) = config.connect(connector).await?;
            Ok((client, spawn_connection(connection)))
        }
        None => {
            let (client, connection) = config.connect(NoTls).await?;
            Ok((client, spawn_connection(connection)))
        }
    }
}

fn spawn_connection<F, E>(connection: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            eprintln!("fixture connection closed with error: {err}");
        }
    })
}

/// Root-certificate TLS only; client certificates are left to the service itself.
fn tls_connector_from_env() -> anyhow::Result<Option<MakeRustlsConnect>> {
    let root_cert = match env::var("PGSSLROOTCERT") {
        Ok(value) if !value.trim().is_empty() => value,
        _ => return Ok(None),
    };

    let mut reader =
        BufReader::new(File::open(&root_cert).context("failed to open PGSSLROOTCERT")?);
    let mut roots = RootCertStore::empty();
    for cert in certs(&mut reader) {
        roots
            .add(cert.context("failed to parse PGSSLROOTCERT")?)
            .map_err(|_| anyhow::anyhow!("invalid certificate in PGSSLROOTCERT"))?;
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Some(MakeRustlsConnect::new(config)))
}
