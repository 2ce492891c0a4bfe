//! In-process entity service
//!
//! Serves a client straight from a `SyncHub`: queries and map uploads go
//! to the hub's store, channel connections are in-memory pairs attached to
//! the hub. Behaves like the HTTP service without sockets.

use std::collections::HashMap;
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;

use anchorsync_client::{EntityMap, EntityService};
use anchorsync_core::{SyncError, SyncResult};
use anchorsync_server::SyncHub;
use anchorsync_store::{EntityFilter, ServerEntityStore};
use anchorsync_transport::{memory_pair, ChannelHandle};
use anchorsync_wire::{MapUpload, StatusReply};

pub struct InProcessService {
    hub: SyncHub,
    maps: Mutex<HashMap<String, Bytes>>,
    online: Mutex<bool>,
}

impl InProcessService {
    pub fn new(hub: SyncHub) -> Self {
        InProcessService {
            hub,
            maps: Mutex::new(HashMap::new()),
            online: Mutex::new(true),
        }
    }

    /// Fresh hub around an empty store
    pub fn standalone() -> Self {
        Self::new(SyncHub::new(ServerEntityStore::new()))
    }

    #[inline]
    pub fn hub(&self) -> &SyncHub {
        &self.hub
    }

    /// Refuse new channel connections while offline
    pub fn set_online(&self, online: bool) {
        *self.online.lock() = online;
    }

    pub fn map_count(&self) -> usize {
        self.maps.lock().len()
    }
}

#[async_trait]
impl EntityService for InProcessService {
    async fn query(&self, filter: &Value) -> SyncResult<EntityMap> {
        let filter = EntityFilter::from_json(filter.clone())?;
        self.hub.store().lock().query(&filter)
    }

    async fn save_map(&self, upload: MapUpload) -> SyncResult<StatusReply> {
        self.hub.store().lock().save(upload.to_record());
        self.maps
            .lock()
            .insert(upload.filename().to_string(), upload.blob);
        Ok(StatusReply::map_saved())
    }

    async fn fetch_map(&self, filename: &str) -> SyncResult<Bytes> {
        self.maps.lock().get(filename).cloned().ok_or_else(|| {
            SyncError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no map named {filename}"),
            ))
        })
    }

    async fn connect_channel(&self) -> SyncResult<ChannelHandle> {
        if !*self.online.lock() {
            return Err(SyncError::TransportUnavailable);
        }
        let (client, server) = memory_pair();
        let (id, _) = self.hub.attach(server);
        tracing::debug!(conn = %id, "in-process channel attached");
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorsync_core::{EntityKind, EntityRecord, EntityUuid, GeoPoint};
    use serde_json::json;

    #[tokio::test]
    async fn test_query_goes_to_store() {
        let service = InProcessService::standalone();
        service.hub().store().lock().save(
            EntityRecord::new(EntityUuid::from("z_p_1"), EntityKind::Content)
                .with_gps(GeoPoint::new(37.0, -122.0, 0.0)),
        );

        let found = service
            .query(&json!({"gps": {"latitude": 37.0, "longitude": -122.0}}))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        assert!(service.query(&json!(["not", "an", "object"])).await.is_err());
    }

    #[tokio::test]
    async fn test_map_round_trip() {
        let service = InProcessService::standalone();
        let mut reference = EntityRecord::new(EntityUuid::from("z_p_A1"), EntityKind::Gps)
            .with_gps(GeoPoint::new(37.0, -122.0, 0.0));
        reference.anchor_uid = "A1".to_string();

        let upload = MapUpload::for_reference(&reference, Bytes::from_static(b"world")).unwrap();
        let reply = service.save_map(upload).await.unwrap();
        assert_eq!(reply, StatusReply::map_saved());

        assert_eq!(service.fetch_map("A1").await.unwrap(), Bytes::from_static(b"world"));
        assert!(matches!(service.fetch_map("A2").await, Err(SyncError::Io(_))));

        let store = service.hub().store().lock();
        let map = store.get("MAPz_p_A1").unwrap();
        assert_eq!(map.kind, EntityKind::Map);
    }

    #[tokio::test]
    async fn test_offline_refuses_channel() {
        let service = InProcessService::standalone();
        service.set_online(false);
        assert!(matches!(
            service.connect_channel().await,
            Err(SyncError::TransportUnavailable)
        ));

        service.set_online(true);
        assert!(service.connect_channel().await.is_ok());
        assert_eq!(service.hub().connection_count(), 1);
    }
}
