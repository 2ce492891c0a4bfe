//! Server assembly: store, hub, HTTP API and channel listener

use std::net::SocketAddr;

use tokio::net::TcpListener;

use anchorsync_core::{SyncError, SyncResult};
use anchorsync_store::ServerEntityStore;
use anchorsync_transport::ChannelListener;
use anchorsync_wire::FrameCodec;

use crate::{create_router, AppState, ServerConfig, SyncHub};

/// A bound, not yet running server
pub struct Server {
    config: ServerConfig,
    hub: SyncHub,
    http: TcpListener,
    http_addr: SocketAddr,
    channel: ChannelListener,
}

impl Server {
    /// Bind both listeners and prepare the upload directory
    pub async fn bind(config: ServerConfig) -> SyncResult<Self> {
        tokio::fs::create_dir_all(&config.upload_dir).await?;

        let store = ServerEntityStore::with_radii(config.query_radius_km, config.nearby_radius_km);
        let hub = SyncHub::new(store);

        let http = TcpListener::bind(config.http_addr)
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        let http_addr = http.local_addr()?;

        let codec = FrameCodec::with_max_frame_size(config.max_frame_size);
        let channel = ChannelListener::bind(config.channel_addr, codec).await?;

        Ok(Server {
            config,
            hub,
            http,
            http_addr,
            channel,
        })
    }

    #[inline]
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    #[inline]
    pub fn channel_addr(&self) -> SocketAddr {
        self.channel.local_addr()
    }

    pub fn hub(&self) -> &SyncHub {
        &self.hub
    }

    /// Serve until the HTTP listener fails
    pub async fn run(self) -> SyncResult<()> {
        let Server {
            config,
            hub,
            http,
            http_addr,
            channel,
        } = self;

        let channel_hub = hub.clone();
        tokio::spawn(async move { channel_hub.serve(channel).await });

        let app = create_router(
            AppState::new(hub, config.upload_dir.clone()),
            config.max_upload_size,
        );
        tracing::info!(%http_addr, upload_dir = %config.upload_dir.display(), "http api listening");
        axum::serve(http, app).await?;
        Ok(())
    }
}
