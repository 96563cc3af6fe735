use anyhow::Result;
use docgate::config::Config;
use docgate::server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Load configuration from environment
    let config =
        Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docgate=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting docgate service");
    tracing::info!(
        "Configuration: bind_addr={}, rpm_per_key={}, fail_fast={}, max_concurrency_per_key={}",
        config.bind_addr,
        config.rpm_per_key,
        config.rpm_fail_fast,
        config.max_concurrency_per_key
    );

    server::run(config).await
}
