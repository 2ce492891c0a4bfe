//! Server configuration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use anchorsync_core::NEARBY_RADIUS_KM;
use anchorsync_wire::MAX_FRAME_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Real-time channel listen address
    #[serde(default = "default_channel_addr")]
    pub channel_addr: SocketAddr,

    /// Directory holding uploaded world maps
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Radius of the entity proximity query (km, inclusive)
    #[serde(default = "default_radius")]
    pub query_radius_km: f64,

    /// Radius within which connections hear each other (km, exclusive)
    #[serde(default = "default_radius")]
    pub nearby_radius_km: f64,

    /// Largest channel frame body accepted or sent
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Largest HTTP request body (world map uploads)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_channel_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3001))
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("public/uploads")
}

fn default_radius() -> f64 {
    NEARBY_RADIUS_KM
}

fn default_max_frame_size() -> usize {
    MAX_FRAME_SIZE
}

fn default_max_upload_size() -> usize {
    64 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            http_addr: default_http_addr(),
            channel_addr: default_channel_addr(),
            upload_dir: default_upload_dir(),
            query_radius_km: default_radius(),
            nearby_radius_km: default_radius(),
            max_frame_size: default_max_frame_size(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load `path`, or defaults when it does not exist
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(ServerConfig::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }
}
