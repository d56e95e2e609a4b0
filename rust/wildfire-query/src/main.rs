use wildfire_query::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    wildfire_query::run().await
}
