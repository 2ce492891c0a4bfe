//! Server-facing entity service
//!
//! The client talks to the server in two ways: request/response over HTTP
//! (queries, world maps) and the real-time channel. `EntityService`
//! bundles both so the repository can be wired to a real server or to an
//! in-process double.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client};
use serde_json::Value;

use anchorsync_core::{EntityRecord, EntityUuid, SyncError, SyncResult};
use anchorsync_transport::{connect, ChannelHandle};
use anchorsync_wire::{FrameCodec, MapUpload, StatusReply, MAP_BLOB_FIELD, MAX_FRAME_SIZE};

/// Query results keyed by uuid
pub type EntityMap = BTreeMap<EntityUuid, EntityRecord>;

/// Remote entity authority
#[async_trait]
pub trait EntityService: Send + Sync {
    /// Run a filter query (`{"gps": {...}, "kind": ...}`)
    async fn query(&self, filter: &Value) -> SyncResult<EntityMap>;

    /// Upload a world map
    async fn save_map(&self, upload: MapUpload) -> SyncResult<StatusReply>;

    /// Download a stored world map
    async fn fetch_map(&self, filename: &str) -> SyncResult<Bytes>;

    /// Open the real-time channel
    async fn connect_channel(&self) -> SyncResult<ChannelHandle>;

    /// Largest channel frame body the server accepts
    fn max_frame_size(&self) -> usize {
        MAX_FRAME_SIZE
    }
}

/// HTTP client configuration
#[derive(Clone, Debug)]
pub struct HttpServiceConfig {
    /// Base url of the HTTP API, e.g. `http://127.0.0.1:3000`
    pub base_url: String,
    /// Address of the real-time channel listener
    pub channel_addr: SocketAddr,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_frame_size: usize,
}

impl HttpServiceConfig {
    pub fn new(base_url: impl Into<String>, channel_addr: SocketAddr) -> Self {
        HttpServiceConfig {
            base_url: base_url.into(),
            channel_addr,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// `EntityService` over reqwest and a TCP channel
pub struct HttpEntityService {
    client: Client,
    config: HttpServiceConfig,
}

fn http_error(e: reqwest::Error) -> SyncError {
    SyncError::Http(e.to_string())
}

impl HttpEntityService {
    pub fn new(config: HttpServiceConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(http_error)?;

        tracing::info!(base_url = %config.base_url, channel = %config.channel_addr, "entity service created");
        Ok(HttpEntityService { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn check(response: reqwest::Response) -> SyncResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%status, "request failed: {}", body);
        Err(SyncError::Http(format!("status {status}: {body}")))
    }
}

#[async_trait]
impl EntityService for HttpEntityService {
    async fn query(&self, filter: &Value) -> SyncResult<EntityMap> {
        let response = self
            .client
            .post(self.url("api/entity/query"))
            .json(filter)
            .send()
            .await
            .map_err(http_error)?;
        let response = Self::check(response).await?;
        response.json().await.map_err(http_error)
    }

    async fn save_map(&self, upload: MapUpload) -> SyncResult<StatusReply> {
        let size = upload.blob.len();
        let blob = multipart::Part::bytes(upload.blob.to_vec())
            .file_name(upload.filename().to_string())
            .mime_str("application/octet-stream")
            .map_err(http_error)?;

        let form = upload
            .fields()
            .into_iter()
            .fold(multipart::Form::new(), |form, (key, value)| form.text(key, value))
            .part(MAP_BLOB_FIELD, blob);

        let response = self
            .client
            .post(self.url("api/map/save"))
            .multipart(form)
            .send()
            .await
            .map_err(http_error)?;
        let response = Self::check(response).await?;

        tracing::info!(uuid = %upload.uuid, size, "map uploaded");
        response.json().await.map_err(http_error)
    }

    async fn fetch_map(&self, filename: &str) -> SyncResult<Bytes> {
        let response = self
            .client
            .get(self.url(&format!("uploads/{filename}")))
            .send()
            .await
            .map_err(http_error)?;
        let response = Self::check(response).await?;
        response.bytes().await.map_err(http_error)
    }

    async fn connect_channel(&self) -> SyncResult<ChannelHandle> {
        connect(
            self.config.channel_addr,
            FrameCodec::with_max_frame_size(self.config.max_frame_size),
        )
        .await
    }

    fn max_frame_size(&self) -> usize {
        self.config.max_frame_size
    }
}
