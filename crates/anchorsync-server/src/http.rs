//! HTTP API
//!
//! - `POST /api/entity/query`  filter object -> entities keyed by uuid
//! - `POST /api/map/save`      multipart world map upload
//! - `GET  /uploads/:filename` stored world map
//! - `POST /api/entity/flush`  not implemented (501)
//! - `GET  /health`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path as UrlPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use anchorsync_core::SyncError;
use anchorsync_store::{EntityFilter, QueryResults};
use anchorsync_wire::{ErrorReply, MapUpload, StatusReply, MAP_BLOB_FIELD};

use crate::SyncHub;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub hub: SyncHub,
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(hub: SyncHub, upload_dir: impl Into<PathBuf>) -> Self {
        AppState {
            hub,
            upload_dir: upload_dir.into(),
        }
    }
}

/// `SyncError` rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub SyncError);

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        ApiError(e)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError(SyncError::Io(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            SyncError::NotImplemented(_) => (StatusCode::NOT_IMPLEMENTED, "TBD".to_string()),
            SyncError::InvalidField(_) | SyncError::Codec(_) => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            SyncError::UnknownEntity(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            SyncError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                (StatusCode::NOT_FOUND, "not found".to_string())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()),
        };
        if status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED {
            tracing::warn!("http: {}", self.0);
        }
        (status, Json(ErrorReply { error })).into_response()
    }
}

/// Build the API router
pub fn create_router(state: AppState, max_upload_size: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/entity/query", post(query_entities))
        .route("/api/entity/flush", post(flush_entities))
        .route("/api/map/save", post(save_map))
        .route("/uploads/:filename", get(download_map))
        .layer(DefaultBodyLimit::max(max_upload_size))
        .with_state(state)
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

/// POST /api/entity/query
pub async fn query_entities(
    State(state): State<AppState>,
    Json(filter): Json<Value>,
) -> Result<Json<QueryResults>, ApiError> {
    let filter = EntityFilter::from_json(filter)?;
    let results = state.hub.store().lock().query(&filter)?;
    tracing::debug!(count = results.len(), "http: query answered");
    Ok(Json(results))
}

/// POST /api/entity/flush
pub async fn flush_entities(State(state): State<AppState>) -> Result<Json<StatusReply>, ApiError> {
    state.hub.store().lock().flush()?;
    Ok(Json(StatusReply {
        status: "flushed".to_string(),
    }))
}

/// POST /api/map/save
pub async fn save_map(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StatusReply>, ApiError> {
    let mut fields = HashMap::new();
    let mut blob = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SyncError::InvalidField(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == MAP_BLOB_FIELD {
            let data = field
                .bytes()
                .await
                .map_err(|e| SyncError::InvalidField(e.to_string()))?;
            blob = Some(data);
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| SyncError::InvalidField(e.to_string()))?;
            fields.insert(name, text);
        }
    }

    let blob = blob.ok_or_else(|| SyncError::InvalidField("map upload without blob".into()))?;
    let upload = MapUpload::from_fields(fields, blob)?;

    let target = state.upload_dir.join(upload.filename());
    tokio::fs::create_dir_all(&state.upload_dir).await?;
    tokio::fs::write(&target, &upload.blob).await?;

    let saved = state.hub.store().lock().save(upload.to_record());
    tracing::info!(uuid = %saved.uuid, path = %target.display(), size = upload.blob.len(), "http: map saved");

    Ok(Json(StatusReply::map_saved()))
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

/// GET /uploads/:filename
pub async fn download_map(
    State(state): State<AppState>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, ApiError> {
    if !is_plain_filename(&filename) {
        return Err(SyncError::InvalidField(format!("bad file name {filename:?}")).into());
    }
    let data = tokio::fs::read(state.upload_dir.join(&filename)).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Bytes::from(data),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorsync_core::{EntityKind, EntityRecord, EntityUuid, GeoPoint};
    use anchorsync_store::ServerEntityStore;
    use serde_json::json;

    fn state(dir: &Path) -> AppState {
        AppState::new(SyncHub::new(ServerEntityStore::new()), dir)
    }

    #[tokio::test]
    async fn test_query_handler() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());
        state.hub.store().lock().save(
            EntityRecord::new(EntityUuid::from("z_p_1"), EntityKind::Content)
                .with_gps(GeoPoint::new(37.0, -122.0, 0.0)),
        );

        let Json(near) = query_entities(
            State(state.clone()),
            Json(json!({"gps": {"latitude": 37.003, "longitude": -122.0}})),
        )
        .await
        .unwrap();
        assert!(near.contains_key("z_p_1"));

        let Json(far) = query_entities(
            State(state.clone()),
            Json(json!({"gps": {"latitude": 37.02, "longitude": -122.0}})),
        )
        .await
        .unwrap();
        assert!(far.is_empty());
    }

    #[tokio::test]
    async fn test_query_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let result = query_entities(State(state(dir.path())), Json(json!("everything"))).await;
        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_flush_is_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let result = flush_entities(State(state(dir.path()))).await;
        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_download_missing_and_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path());

        let missing = download_map(State(state.clone()), UrlPath("A1".to_string()))
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let sneaky = download_map(State(state.clone()), UrlPath("..".to_string()))
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(sneaky.status(), StatusCode::BAD_REQUEST);

        std::fs::write(dir.path().join("A1"), b"world").unwrap();
        let found = download_map(State(state), UrlPath("A1".to_string()))
            .await
            .unwrap();
        assert_eq!(found.status(), StatusCode::OK);
    }

    #[test]
    fn test_plain_filename() {
        assert!(is_plain_filename("A1"));
        assert!(is_plain_filename("anchor-7.map"));
        assert!(!is_plain_filename("a/b"));
        assert!(!is_plain_filename(".hidden"));
        assert!(!is_plain_filename(""));
    }
}
