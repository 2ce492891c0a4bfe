//! anchorsync-server: shared entity authority for anchorsync clients
//!
//! Serves the entity query and world map HTTP API, and the real-time
//! channel that relays published entities between nearby clients.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::info;

use anchorsync_server::{Server, ServerConfig};

#[derive(Parser)]
#[command(name = "anchorsync-server")]
#[command(about = "Entity server for shared augmented reality scenes")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "anchorsync.toml")]
    config: String,

    /// HTTP API listen address (overrides config file)
    #[arg(long, env = "ANCHORSYNC_HTTP_ADDR")]
    http_addr: Option<SocketAddr>,

    /// Real-time channel listen address (overrides config file)
    #[arg(long, env = "ANCHORSYNC_CHANNEL_ADDR")]
    channel_addr: Option<SocketAddr>,

    /// World map upload directory (overrides config file)
    #[arg(short, long, env = "ANCHORSYNC_UPLOAD_DIR")]
    upload_dir: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "ANCHORSYNC_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("anchorsync=info".parse()?)
        .add_directive("anchorsync_server=info".parse()?);
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting anchorsync-server");
    info!("Config file: {}", cli.config);

    let mut config = ServerConfig::load_or_default(Path::new(&cli.config))?;

    // Apply CLI overrides
    if let Some(addr) = cli.http_addr {
        config.http_addr = addr;
    }
    if let Some(addr) = cli.channel_addr {
        config.channel_addr = addr;
    }
    if let Some(dir) = cli.upload_dir {
        config.upload_dir = PathBuf::from(dir);
    }

    info!("HTTP API: {}", config.http_addr);
    info!("Channel: {}", config.channel_addr);
    info!("Upload dir: {}", config.upload_dir.display());

    let server = Server::bind(config).await?;
    server.run().await?;
    Ok(())
}
