use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use terrabench_service::clock::SystemClock;
use terrabench_service::config::ServiceConfig;
use terrabench_service::{app_state, http};

#[derive(Parser)]
#[command(about, long_about = None)]
struct ServiceCli {
    /// The address to bind the HTTP listener to
    #[clap(short, long, default_value = "127.0.0.1:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = ServiceCli::parse();
    let config = ServiceConfig::from_env()?;
    log::debug!(
        "Starting with partition template {} (lookback {} months, discovery TTL {}s)",
        config.partition_url_template,
        config.lookback_months,
        config.discovery_ttl.num_seconds()
    );

    let state = app_state(&config, Arc::new(SystemClock));
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cli.listen))?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
