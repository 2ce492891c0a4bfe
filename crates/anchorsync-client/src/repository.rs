//! Client entity repository
//!
//! Owns the client's mirror of nearby entities and, once per frame,
//! drives the relocalize/publish decision for each of them:
//!
//! 1. `map` records are never touched.
//! 2. Nothing but `gps` records is processed until a reference exists.
//! 3. Every other record is relocalized against the reference.
//! 4. The first `gps` record to relocalize becomes the reference.
//! 5. A record with a geocentric position that was never published is
//!    published, once per local lifetime.

use std::sync::Arc;

use anchorsync_core::{
    EntityKind, EntityRecord, EntityUuid, GeoPoint, SyncError, SyncResult,
};
use anchorsync_wire::{MapUpload, StatusReply};

use crate::{
    AnchorRelocalizer, ClientConfig, EntityService, EntityTable, Feature, Frame, MergeOutcome,
    PublishOutcome, ReferenceFrame, SyncChannel, Tracker, VIEW_CENTER,
};

fn tracking_failed(what: &str, e: SyncError) -> SyncError {
    tracing::warn!("{}: anchor failed: {}", what, e);
    e
}

/// Client-side entity mirror
pub struct ClientEntityRepository<T: Tracker> {
    config: ClientConfig,
    tracker: T,
    relocalizer: AnchorRelocalizer,
    channel: SyncChannel,
    entities: EntityTable,
    /// The single gps record all relative positions derive from
    reference: Option<EntityUuid>,
    /// This client's own party record
    party: Option<EntityUuid>,
}

impl<T: Tracker> ClientEntityRepository<T> {
    pub fn new(config: ClientConfig, tracker: T, service: Arc<dyn EntityService>) -> Self {
        ClientEntityRepository {
            config,
            tracker,
            relocalizer: AnchorRelocalizer::new(),
            channel: SyncChannel::new(service),
            entities: EntityTable::new(),
            reference: None,
            party: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    pub fn channel(&self) -> &SyncChannel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut SyncChannel {
        &mut self.channel
    }

    pub fn get(&self, uuid: &str) -> Option<&EntityRecord> {
        self.entities.get(uuid)
    }

    /// All records in the order they became known
    pub fn entities(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The reference gps record, once one has relocalized
    pub fn reference(&self) -> Option<&EntityRecord> {
        self.reference
            .as_ref()
            .and_then(|uuid| self.entities.get(uuid.as_str()))
    }

    pub fn party(&self) -> Option<&EntityRecord> {
        self.party
            .as_ref()
            .and_then(|uuid| self.entities.get(uuid.as_str()))
    }

    // Creation

    /// Create a local record of `kind` at a freshly made anchor
    pub async fn create(&mut self, kind: EntityKind, frame: &Frame) -> SyncResult<&EntityRecord> {
        let uuid = match kind {
            EntityKind::Gps => self.create_gps(frame).await?,
            EntityKind::Content => self.create_content(frame).await?,
            EntityKind::Party => self.create_party(frame).await?,
            EntityKind::Map => {
                tracing::warn!("create: maps are written by the server only");
                return Err(SyncError::UnsupportedKind(kind));
            }
        };
        self.entities
            .get(uuid.as_str())
            .ok_or(SyncError::UnknownEntity(uuid))
    }

    fn record_for(&self, kind: EntityKind, feature: Feature) -> EntityRecord {
        let uuid = EntityUuid::derive(&self.config.zone, &self.config.party, &feature.anchor_uid);
        let mut record = EntityRecord::new(uuid, kind)
            .with_zone(self.config.zone.clone(), self.config.party.clone());
        record.anchor_uid = feature.anchor_uid;
        record.transform = Some(feature.transform);
        record.translation = Some(feature.transform.translation());
        record.orientation = feature.orientation;
        record.gps = feature.gps;
        record.tags = self.config.tags.clone();
        record.local.anchor = Some(feature.anchor);
        record
    }

    async fn create_gps(&mut self, frame: &Frame) -> SyncResult<EntityUuid> {
        let feature = self
            .tracker
            .anchor_at_fix(frame)
            .await
            .map_err(|e| tracking_failed("create gps", e))?;
        let Some(gps) = feature.gps else {
            self.tracker.remove_anchor(&feature.anchor_uid);
            return Err(tracking_failed(
                "create gps",
                SyncError::Tracking("anchor carries no gps fix".into()),
            ));
        };

        let mut record = self.record_for(EntityKind::Gps, feature);
        record.name = format!("a gps anchor at {} {}", gps.latitude, gps.longitude);
        record.descr = record.name.clone();

        let uuid = record.uuid.clone();
        tracing::debug!(uuid = %uuid, "create: gps entity");
        self.entities.insert(record);
        Ok(uuid)
    }

    async fn create_content(&mut self, frame: &Frame) -> SyncResult<EntityUuid> {
        let (x, y) = VIEW_CENTER;
        let feature = self
            .tracker
            .anchor_at_intersection(frame, x, y)
            .await
            .map_err(|e| tracking_failed("create content", e))?;

        let mut record = self.record_for(EntityKind::Content, feature);
        record.name = "art".to_string();
        record.descr = "some user art".to_string();

        let uuid = record.uuid.clone();
        tracing::debug!(uuid = %uuid, "create: content entity");
        self.entities.insert(record);
        Ok(uuid)
    }

    /// Create this client's party record, or move the existing one to a
    /// new anchor at the device pose
    async fn create_party(&mut self, frame: &Frame) -> SyncResult<EntityUuid> {
        let feature = self
            .tracker
            .anchor_at_pose(frame)
            .await
            .map_err(|e| tracking_failed("create party", e))?;

        let existing = self
            .party
            .as_ref()
            .and_then(|uuid| self.entities.get_mut(uuid.as_str()));
        if let Some(party) = existing {
            self.tracker.remove_anchor(&party.anchor_uid);

            party.anchor_uid = feature.anchor_uid;
            party.local.anchor = Some(feature.anchor);
            party.transform = Some(feature.transform);
            party.translation = Some(feature.transform.translation());
            party.orientation = feature.orientation;
            if feature.gps.is_some() {
                party.gps = feature.gps;
            }
            // A new local lifetime: position and publication start over
            party.cartesian = None;
            party.relocalized = false;
            party.published = false;
            party.dirty = false;

            tracing::debug!(uuid = %party.uuid, anchor = %party.anchor_uid, "create: party moved");
            return Ok(party.uuid.clone());
        }

        let mut record = self.record_for(EntityKind::Party, feature);
        record.name = self.config.party.clone();
        record.descr = format!("a representation for a person named {}", self.config.party);

        let uuid = record.uuid.clone();
        tracing::debug!(uuid = %uuid, "create: party entity");
        self.entities.insert(record);
        self.party = Some(uuid.clone());
        Ok(uuid)
    }

    // Per-frame update

    /// Update every record once; returns how many were published
    pub fn update_all(&mut self, frame: &Frame) -> usize {
        let mut published = 0;
        for uuid in self.entities.uuids() {
            match self.update_one(frame, uuid.as_str()) {
                Ok(Some(PublishOutcome::Sent | PublishOutcome::Deferred)) => published += 1,
                Ok(_) => {}
                Err(e) => tracing::debug!(uuid = %uuid, "update: {}", e),
            }
            self.debug_dump(uuid.as_str());
        }
        published
    }

    /// Relocalize one record and publish it if it just became publishable.
    ///
    /// Returns the publish outcome when a publish was attempted.
    pub fn update_one(&mut self, frame: &Frame, uuid: &str) -> SyncResult<Option<PublishOutcome>> {
        let kind = self
            .entities
            .get(uuid)
            .map(|e| e.kind)
            .ok_or_else(|| SyncError::UnknownEntity(uuid.into()))?;

        match kind {
            EntityKind::Map => return Ok(None),
            EntityKind::Content | EntityKind::Party if self.reference.is_none() => {
                return Ok(None)
            }
            EntityKind::Gps | EntityKind::Content | EntityKind::Party => {}
        }

        let is_reference = self
            .reference
            .as_ref()
            .is_some_and(|r| r.as_str() == uuid);
        let reference = if is_reference {
            None
        } else {
            self.reference()
                .and_then(ReferenceFrame::of)
        };

        let entity = self
            .entities
            .get_mut(uuid)
            .ok_or_else(|| SyncError::UnknownEntity(uuid.into()))?;

        let outcome = self
            .relocalizer
            .relocalize_with(frame, entity, reference.as_ref());
        tracing::trace!(uuid = %entity.uuid, ?outcome, "update: relocalized");

        if kind == EntityKind::Gps && entity.relocalized && self.reference.is_none() {
            tracing::info!(uuid = %entity.uuid, "update: reference gps entity chosen");
            self.reference = Some(entity.uuid.clone());
        }

        if !entity.published && entity.has_cartesian() {
            return Ok(Some(self.channel.publish(entity)));
        }
        Ok(None)
    }

    fn debug_dump(&mut self, uuid: &str) {
        let Some(entity) = self.entities.get_mut(uuid) else {
            return;
        };
        if entity.local.debugged || entity.transform.is_none() {
            return;
        }
        entity.local.debugged = true;
        tracing::debug!(
            uuid = %entity.uuid,
            anchor = %entity.anchor_uid,
            kind = %entity.kind,
            relocalized = entity.relocalized,
            anchored = entity.has_local_anchor(),
            translation = ?entity.local_translation(),
            gps = ?entity.gps,
            cartesian = ?entity.cartesian,
            "entity status"
        );
    }

    // Local queries

    /// Local records of exactly `kind`
    pub fn query(&self, kind: EntityKind) -> Vec<&EntityRecord> {
        self.entities.iter().filter(|e| e.kind == kind).collect()
    }

    /// Drop the local mirror; nothing is sent to the server
    pub fn reset(&mut self) {
        tracing::info!(count = self.entities.len(), "reset: clearing local entities");
        self.entities.clear();
        self.reference = None;
        self.party = None;
    }

    // Network

    /// Merge one record received from the network
    pub fn receive(&mut self, entity: EntityRecord) -> MergeOutcome {
        SyncChannel::receive(&mut self.entities, entity)
    }

    /// Apply every pending channel event
    pub fn drain_incoming(&mut self) -> usize {
        self.channel.drain_incoming(&mut self.entities)
    }

    /// Bulk-load everything the server has near `gps`
    pub async fn load_all(&mut self, gps: Option<&GeoPoint>) -> SyncResult<usize> {
        self.channel.load_all(&mut self.entities, gps).await
    }

    /// Connect the channel if needed, announce `gps`, then bulk-load.
    ///
    /// Loading happens after subscribing so that no broadcast falls into
    /// the gap. A channel that cannot connect leaves the client local-only.
    pub async fn network_restart(&mut self, gps: Option<GeoPoint>) -> SyncResult<usize> {
        match self.channel.connect().await {
            Ok(true) => {
                if let Some(gps) = gps {
                    if let Err(e) = self.channel.send_location(gps) {
                        tracing::warn!("network restart: location not sent: {}", e);
                    }
                }
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("network restart: channel unavailable: {}", e),
        }
        self.load_all(gps.as_ref()).await
    }

    // World maps

    /// Upload the tracker's world map, anchored on the reference gps
    /// record. A reference is created on the spot when none exists yet.
    pub async fn map_save(&mut self, frame: &Frame) -> SyncResult<StatusReply> {
        let reference = match self.reference.clone() {
            Some(uuid) => uuid,
            None => self.force_reference(frame).await?,
        };

        tracing::info!(reference = %reference, "map save: saving map");
        let blob = self.tracker.world_map().await.map_err(|e| {
            tracing::warn!("map save: no usable world map yet: {}", e);
            e
        })?;

        let entity = self
            .entities
            .get(reference.as_str())
            .ok_or_else(|| SyncError::UnknownEntity(reference.clone()))?;
        let upload = MapUpload::for_reference(entity, blob)?;

        let reply = self.channel.service().save_map(upload).await?;
        tracing::info!(status = %reply.status, "map save: succeeded");
        Ok(reply)
    }

    async fn force_reference(&mut self, frame: &Frame) -> SyncResult<EntityUuid> {
        let created = self.create(EntityKind::Gps, frame).await.map_err(|e| {
            tracing::warn!("map save: failed to add gps entity: {}", e);
            e
        })?;
        let uuid = created.uuid.clone();

        let entity = self
            .entities
            .get_mut(uuid.as_str())
            .ok_or_else(|| SyncError::UnknownEntity(uuid.clone()))?;

        // The new anchor is not part of `frame` yet; track it at its
        // creation pose.
        let mut frame = frame.clone();
        if let (Some(anchor), Some(pose)) = (entity.local.anchor, entity.transform) {
            frame.set_anchor(anchor, pose);
        }

        let outcome = self.relocalizer.relocalize_with(&frame, entity, None);
        if !outcome.is_relocalized() {
            tracing::warn!(uuid = %uuid, ?outcome, "map save: failed to relocalize gps entity");
            return Err(SyncError::Tracking(format!(
                "gps entity {uuid} did not relocalize: {outcome:?}"
            )));
        }

        tracing::info!(uuid = %uuid, "map save: reference gps entity forced");
        self.reference = Some(uuid.clone());
        Ok(uuid)
    }

    /// Fetch a stored world map and hand it to the tracker.
    ///
    /// Restoring the anchors saved with the map is up to the tracker.
    pub async fn map_load(&mut self, filename: &str) -> SyncResult<()> {
        let data = self.channel.service().fetch_map(filename).await?;
        let size = data.len();
        self.tracker.load_world_map(data).await?;
        tracing::info!(filename, size, "map load: a fresh map file arrived");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use serde_json::Value;

    use anchorsync_core::{AnchorHandle, Timestamp, Transform, Vector3};
    use anchorsync_transport::{memory_pair, ChannelHandle};
    use anchorsync_wire::{ChannelMessage, EntitySnapshot};

    use crate::EntityMap;

    const HERE: GeoPoint = GeoPoint {
        latitude: 37.0,
        longitude: -122.0,
        altitude: 0.0,
        accuracy: None,
    };

    #[derive(Default)]
    struct StubTracker {
        next: u64,
        anchors: Vec<(AnchorHandle, String, Transform)>,
        removed: Vec<String>,
        place_at: Vector3,
        world: Option<Bytes>,
        loaded: Option<Bytes>,
    }

    impl StubTracker {
        fn make(&mut self, gps: Option<GeoPoint>) -> Feature {
            self.next += 1;
            let anchor = AnchorHandle(self.next);
            let anchor_uid = format!("A{}", self.next);
            let transform = Transform::from_translation(self.place_at);
            self.anchors.push((anchor, anchor_uid.clone(), transform));
            Feature {
                anchor,
                anchor_uid,
                transform,
                orientation: None,
                gps,
            }
        }

        fn frame(&self) -> Frame {
            let mut frame = Frame::new(Timestamp::ZERO).with_gps(HERE);
            for (anchor, _, pose) in &self.anchors {
                frame.set_anchor(*anchor, *pose);
            }
            frame
        }
    }

    #[async_trait]
    impl Tracker for StubTracker {
        async fn anchor_at_fix(&mut self, frame: &Frame) -> SyncResult<Feature> {
            match frame.gps {
                Some(gps) => Ok(self.make(Some(gps))),
                None => Err(SyncError::Tracking("no fix".into())),
            }
        }

        async fn anchor_at_intersection(&mut self, _frame: &Frame, _x: f64, _y: f64) -> SyncResult<Feature> {
            Ok(self.make(None))
        }

        async fn anchor_at_pose(&mut self, frame: &Frame) -> SyncResult<Feature> {
            Ok(self.make(frame.gps))
        }

        fn remove_anchor(&mut self, anchor_uid: &str) {
            self.anchors.retain(|(_, uid, _)| uid != anchor_uid);
            self.removed.push(anchor_uid.to_string());
        }

        async fn world_map(&mut self) -> SyncResult<Bytes> {
            self.world
                .clone()
                .ok_or_else(|| SyncError::Tracking("map not ready".into()))
        }

        async fn load_world_map(&mut self, data: Bytes) -> SyncResult<()> {
            self.loaded = Some(data);
            Ok(())
        }
    }

    #[derive(Default)]
    struct StubService {
        entities: EntityMap,
        uploads: Mutex<Vec<MapUpload>>,
        server_end: Mutex<Option<ChannelHandle>>,
        connectable: bool,
    }

    #[async_trait]
    impl EntityService for StubService {
        async fn query(&self, _filter: &Value) -> SyncResult<EntityMap> {
            Ok(self.entities.clone())
        }

        async fn save_map(&self, upload: MapUpload) -> SyncResult<StatusReply> {
            self.uploads.lock().push(upload);
            Ok(StatusReply::map_saved())
        }

        async fn fetch_map(&self, filename: &str) -> SyncResult<Bytes> {
            Ok(Bytes::from(format!("map:{filename}")))
        }

        async fn connect_channel(&self) -> SyncResult<ChannelHandle> {
            if !self.connectable {
                return Err(SyncError::TransportUnavailable);
            }
            let (client, server) = memory_pair();
            *self.server_end.lock() = Some(server);
            Ok(client)
        }
    }

    fn repository() -> ClientEntityRepository<StubTracker> {
        repository_with(Arc::new(StubService::default()))
    }

    fn repository_with(service: Arc<StubService>) -> ClientEntityRepository<StubTracker> {
        ClientEntityRepository::new(ClientConfig::new("z", "p"), StubTracker::default(), service)
    }

    #[tokio::test]
    async fn test_create_content_defaults() {
        let mut repo = repository();
        let frame = repo.tracker().frame();

        let entity = repo.create(EntityKind::Content, &frame).await.unwrap();
        assert_eq!(entity.uuid.as_str(), "z_p_A1");
        assert_eq!(entity.name, "art");
        assert_eq!(entity.descr, "some user art");
        assert_eq!(entity.art, "box");
        assert_eq!(entity.tags, "aesthetic");
        assert!(!entity.published && !entity.remote && entity.dirty);
        assert!(entity.has_local_anchor());
    }

    #[tokio::test]
    async fn test_create_gps_needs_fix() {
        let mut repo = repository();
        let frame = Frame::new(Timestamp::ZERO);

        assert!(matches!(
            repo.create(EntityKind::Gps, &frame).await,
            Err(SyncError::Tracking(_))
        ));
        assert!(repo.is_empty());

        let frame = repo.tracker().frame();
        let gps = repo.create(EntityKind::Gps, &frame).await.unwrap();
        assert_eq!(gps.name, "a gps anchor at 37 -122");
        assert_eq!(gps.art, "cylinder");
    }

    #[tokio::test]
    async fn test_create_map_unsupported() {
        let mut repo = repository();
        let frame = repo.tracker().frame();
        assert!(matches!(
            repo.create(EntityKind::Map, &frame).await,
            Err(SyncError::UnsupportedKind(EntityKind::Map))
        ));
    }

    #[tokio::test]
    async fn test_content_waits_for_reference_then_publishes() {
        let mut repo = repository();
        let frame = repo.tracker().frame();
        let art = repo.create(EntityKind::Content, &frame).await.unwrap().uuid.clone();

        let frame = repo.tracker().frame();
        assert_eq!(repo.update_all(&frame), 0);
        assert!(!repo.get(art.as_str()).unwrap().relocalized);
        assert!(repo.reference().is_none());

        repo.create(EntityKind::Gps, &frame).await.unwrap();
        let frame = repo.tracker().frame();
        // gps is visited after the content this pass
        assert_eq!(repo.update_all(&frame), 1);
        assert!(repo.reference().is_some());
        assert_eq!(repo.update_all(&frame), 1);

        let art = repo.get(art.as_str()).unwrap();
        assert!(art.relocalized);
        assert!(art.published);
        assert_eq!(repo.update_all(&frame), 0);
    }

    #[tokio::test]
    async fn test_single_reference() {
        let mut repo = repository();
        let frame = repo.tracker().frame();
        let first = repo.create(EntityKind::Gps, &frame).await.unwrap().uuid.clone();
        repo.tracker_mut().place_at = Vector3::new(5.0, 0.0, 0.0);
        let second = repo.create(EntityKind::Gps, &frame).await.unwrap().uuid.clone();

        let frame = repo.tracker().frame();
        repo.update_all(&frame);
        repo.update_all(&frame);

        assert_eq!(repo.reference().unwrap().uuid, first);
        assert!(repo.get(second.as_str()).unwrap().relocalized);
        assert_eq!(repo.query(EntityKind::Gps).len(), 2);
    }

    #[tokio::test]
    async fn test_published_is_monotonic() {
        let mut repo = repository();
        let frame = repo.tracker().frame();
        let uuid = repo.create(EntityKind::Gps, &frame).await.unwrap().uuid.clone();
        let frame = repo.tracker().frame();

        assert_eq!(
            repo.update_one(&frame, uuid.as_str()).unwrap(),
            Some(PublishOutcome::Deferred)
        );
        assert!(repo.get(uuid.as_str()).unwrap().published);

        let echo = repo.get(uuid.as_str()).unwrap().clone();
        assert_eq!(repo.receive(echo), MergeOutcome::Merged);
        assert_eq!(repo.update_one(&frame, uuid.as_str()).unwrap(), None);
        assert!(repo.get(uuid.as_str()).unwrap().published);
    }

    #[tokio::test]
    async fn test_party_recreate_moves_anchor() {
        let mut repo = repository();
        let frame = repo.tracker().frame();
        repo.create(EntityKind::Gps, &frame).await.unwrap();
        let party = repo.create(EntityKind::Party, &frame).await.unwrap();
        let uuid = party.uuid.clone();
        assert_eq!(party.name, "p");
        assert_eq!(party.descr, "a representation for a person named p");

        let frame = repo.tracker().frame();
        repo.update_all(&frame);
        repo.update_all(&frame);
        assert!(repo.party().unwrap().published);

        let moved = repo.create(EntityKind::Party, &frame).await.unwrap();
        assert_eq!(moved.uuid, uuid);
        assert_eq!(moved.anchor_uid, "A3");
        assert!(moved.cartesian.is_none());
        assert!(!moved.published);
        assert!(!moved.dirty);
        assert_eq!(repo.tracker().removed, vec!["A2".to_string()]);
        assert_eq!(repo.query(EntityKind::Party).len(), 1);

        let frame = repo.tracker().frame();
        assert_eq!(repo.update_one(&frame, uuid.as_str()).unwrap(), Some(PublishOutcome::Deferred));
    }

    #[tokio::test]
    async fn test_map_records_are_skipped() {
        let mut repo = repository();
        let map = EntityRecord::new(EntityUuid::from("MAPz_q_1"), EntityKind::Map)
            .with_gps(HERE)
            .with_cartesian(HERE.to_ecef());
        repo.receive(map);

        let frame = repo.tracker().frame();
        assert_eq!(repo.update_one(&frame, "MAPz_q_1").unwrap(), None);
        assert!(matches!(
            repo.update_one(&frame, "nope"),
            Err(SyncError::UnknownEntity(_))
        ));
    }

    #[tokio::test]
    async fn test_reset() {
        let mut repo = repository();
        let frame = repo.tracker().frame();
        repo.create(EntityKind::Gps, &frame).await.unwrap();
        repo.create(EntityKind::Party, &frame).await.unwrap();
        let frame = repo.tracker().frame();
        repo.update_all(&frame);

        repo.reset();
        assert!(repo.is_empty());
        assert!(repo.reference().is_none());
        assert!(repo.party().is_none());
    }

    #[tokio::test]
    async fn test_map_save_forces_reference() {
        let service = Arc::new(StubService::default());
        let mut repo = repository_with(service.clone());
        repo.tracker_mut().world = Some(Bytes::from_static(b"world"));

        let frame = repo.tracker().frame();
        let reply = repo.map_save(&frame).await.unwrap();
        assert_eq!(reply, StatusReply::map_saved());

        let reference = repo.reference().unwrap();
        assert_eq!(reference.kind, EntityKind::Gps);
        assert!(reference.relocalized);

        let uploads = service.uploads.lock();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].uuid, reference.uuid.map_uuid());
        assert_eq!(uploads[0].anchor_uid, reference.anchor_uid);
        assert_eq!(&uploads[0].blob[..], b"world");
    }

    #[tokio::test]
    async fn test_map_save_without_world_map() {
        let mut repo = repository();
        let frame = repo.tracker().frame();
        assert!(matches!(
            repo.map_save(&frame).await,
            Err(SyncError::Tracking(_))
        ));
    }

    #[tokio::test]
    async fn test_map_load() {
        let mut repo = repository();
        repo.map_load("A1").await.unwrap();
        assert_eq!(repo.tracker().loaded.as_deref(), Some(&b"map:A1"[..]));
    }

    #[tokio::test]
    async fn test_network_restart_subscribes_then_loads() {
        let mut remote = EntityRecord::new(EntityUuid::from("z_q_1"), EntityKind::Content)
            .with_cartesian(HERE.to_ecef());
        remote.published = true;
        let mut entities = EntityMap::new();
        entities.insert(remote.uuid.clone(), remote);

        let service = Arc::new(StubService {
            entities,
            connectable: true,
            ..Default::default()
        });
        let mut repo = repository_with(service.clone());

        assert_eq!(repo.network_restart(Some(HERE)).await.unwrap(), 1);
        assert!(repo.channel().is_connected());
        assert!(repo.get("z_q_1").unwrap().remote);

        let mut server = service.server_end.lock().take().unwrap();
        assert_eq!(server.try_recv(), Some(ChannelMessage::Location(HERE)));

        // Second restart reuses the channel and sends no second location
        repo.network_restart(Some(HERE)).await.unwrap();
        assert!(service.server_end.lock().is_none());
        assert_eq!(server.try_recv(), None);

        let incoming = EntityRecord::new(EntityUuid::from("z_q_2"), EntityKind::Party)
            .with_cartesian(HERE.to_ecef());
        server
            .send(ChannelMessage::Publish(EntitySnapshot::from(&incoming)))
            .unwrap();
        assert_eq!(repo.drain_incoming(), 1);
        assert!(repo.get("z_q_2").unwrap().published);
    }

    #[tokio::test]
    async fn test_network_restart_without_channel_still_loads() {
        let mut repo = repository();
        assert_eq!(repo.network_restart(Some(HERE)).await.unwrap(), 0);
        assert!(!repo.channel().is_connected());
        assert!(matches!(
            repo.network_restart(None).await,
            Err(SyncError::NoGeodeticFix)
        ));
    }
}
