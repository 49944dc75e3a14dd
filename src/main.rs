use tracing::info;

use cove::relay::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("cove multi-room chat relay starting");

    // Configuration comes from COVE_* environment variables.
    let config = Config::from_env()?;

    cove::relay::server::run(config).await
}
