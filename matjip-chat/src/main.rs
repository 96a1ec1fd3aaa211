//! Matjip Chat - Main entry point.

use anyhow::Result;
use matjip_chat::start_server;
use matjip_common::config::Config;
use matjip_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Matjip Chat v{}", env!("CARGO_PKG_VERSION"));

    // Start the HTTP/WebSocket server
    start_server(&config).await
}
