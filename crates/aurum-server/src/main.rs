//! Precious metals and FX price pipeline - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Real-time precious metals and FX price service
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via AURUM_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS crypto provider must be installed before any WS connection.
    aurum_provider::init_crypto();

    let args = Args::parse();

    aurum_telemetry::init_logging()?;

    info!("Starting aurum-server v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > AURUM_CONFIG env var > default.
    let config_path = args
        .config
        .or_else(|| std::env::var("AURUM_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = aurum_server::AppConfig::load(&config_path)?;
    info!(
        port = config.server.port,
        window_secs = config.aggregation.window_secs,
        "Configuration loaded"
    );

    let app = aurum_server::Application::new(config);
    app.run().await?;

    Ok(())
}
