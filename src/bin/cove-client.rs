use cove::client;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Logs go to stderr and stay quiet unless RUST_LOG asks for more.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let addr = client::resolve_server_addr(
        std::env::args().nth(1),
        std::env::var("COVE_SERVER").ok(),
    );

    client::run(&addr).await?;
    Ok(())
}
