use anyhow::Context;
use docqa_server::{ServiceConfig, init_tracing, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    init_tracing(config.log_format)?;
    tracing::info!(?config, "starting docqa server");

    run_server(config).await
}
