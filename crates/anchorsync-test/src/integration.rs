//! End-to-end integration suite
//!
//! Simulated clients, each with its own tracking space, sharing one
//! server:
//! - publish/receive between nearby clients
//! - proximity filtering of broadcasts and queries
//! - late joiners bulk-loading and relocalizing
//! - world map save/load
//! - admin promotion of the first party

use std::sync::Arc;
use std::time::Duration;

use anchorsync_client::{ClientConfig, ClientEntityRepository, EntityService, Frame};
use anchorsync_core::{EntityKind, EntityUuid, SyncResult, Timestamp, Vector3};
use anchorsync_wire::StatusReply;

use crate::SimulatedTracker;

/// Simulated frame interval
pub const FRAME_MILLIS: i64 = 16;

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const POLL_ATTEMPTS: usize = 400;

/// Poll `cond` until it holds or about two seconds pass
pub async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..POLL_ATTEMPTS {
        if cond() {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    cond()
}

/// What one simulated frame did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    pub received: usize,
    pub published: usize,
}

/// A client app: repository, simulated tracker and a frame clock
pub struct SimulatedClient {
    repo: ClientEntityRepository<SimulatedTracker>,
    clock: Timestamp,
}

impl SimulatedClient {
    pub fn new(config: ClientConfig, tracker: SimulatedTracker, service: Arc<dyn EntityService>) -> Self {
        SimulatedClient {
            repo: ClientEntityRepository::new(config, tracker, service),
            clock: Timestamp::ZERO,
        }
    }

    pub fn repo(&self) -> &ClientEntityRepository<SimulatedTracker> {
        &self.repo
    }

    pub fn repo_mut(&mut self) -> &mut ClientEntityRepository<SimulatedTracker> {
        &mut self.repo
    }

    pub fn tracker(&self) -> &SimulatedTracker {
        self.repo.tracker()
    }

    pub fn tracker_mut(&mut self) -> &mut SimulatedTracker {
        self.repo.tracker_mut()
    }

    /// Advance the clock and capture the next frame
    pub fn frame(&mut self) -> Frame {
        self.clock = Timestamp::from_millis(self.clock.as_millis() + FRAME_MILLIS);
        self.repo.tracker().frame(self.clock)
    }

    /// (Re)connect, announce the current fix and bulk-load
    pub async fn connect(&mut self) -> SyncResult<usize> {
        let gps = self.repo.tracker().gps();
        self.repo.network_restart(gps).await
    }

    pub async fn create(&mut self, kind: EntityKind) -> SyncResult<EntityUuid> {
        let frame = self.frame();
        let created = self.repo.create(kind, &frame).await?;
        Ok(created.uuid.clone())
    }

    /// One frame: apply channel traffic, then relocalize and publish
    pub fn step(&mut self) -> StepReport {
        let received = self.repo.drain_incoming();
        let frame = self.frame();
        let published = self.repo.update_all(&frame);
        StepReport {
            received,
            published,
        }
    }

    /// Step until `cond` holds on the repository
    pub async fn step_until(
        &mut self,
        cond: impl Fn(&ClientEntityRepository<SimulatedTracker>) -> bool,
    ) -> bool {
        for _ in 0..POLL_ATTEMPTS {
            self.step();
            if cond(&self.repo) {
                return true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        false
    }

    pub async fn map_save(&mut self) -> SyncResult<StatusReply> {
        let frame = self.frame();
        self.repo.map_save(&frame).await
    }

    /// Local position of a record, if it has one
    pub fn local_position(&self, uuid: &str) -> Option<Vector3> {
        self.repo.get(uuid).and_then(|e| e.local_translation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use anchorsync_client::{HttpEntityService, HttpServiceConfig};
    use anchorsync_core::{GeoPoint, ADMIN_LEVEL};
    use anchorsync_server::{Server, ServerConfig, SyncHub};
    use serde_json::json;

    use crate::InProcessService;

    const HERE: GeoPoint = GeoPoint {
        latitude: 37.0,
        longitude: -122.0,
        altitude: 0.0,
        accuracy: None,
    };

    const FAR: GeoPoint = GeoPoint {
        latitude: 37.02,
        longitude: -122.0,
        altitude: 0.0,
        accuracy: None,
    };

    fn client(party: &str, seed: u64, gps: GeoPoint, service: Arc<dyn EntityService>) -> SimulatedClient {
        SimulatedClient::new(
            ClientConfig::new("z", party),
            SimulatedTracker::new(seed).with_gps(gps),
            service,
        )
    }

    fn assert_near(actual: Vector3, expected: Vector3) {
        let d = actual.sub(&expected);
        assert!(
            d.x.abs() < 1e-6 && d.y.abs() < 1e-6 && d.z.abs() < 1e-6,
            "{actual:?} != {expected:?}"
        );
    }

    async fn wait_for_presence(hub: &SyncHub, count: usize) {
        assert!(wait_for(|| hub.store().lock().presence().len() == count).await);
    }

    async fn wait_for_stored(hub: &SyncHub, uuid: &EntityUuid) {
        assert!(wait_for(|| hub.store().lock().get(uuid.as_str()).is_some()).await);
    }

    /// Connect, place a gps anchor and step until it is the reference
    async fn bootstrap(client: &mut SimulatedClient) -> EntityUuid {
        client.connect().await.unwrap();
        let gps = client.create(EntityKind::Gps).await.unwrap();
        assert!(client.step_until(|r| r.reference().is_some()).await);
        gps
    }

    #[tokio::test]
    async fn test_peer_sees_content_at_same_place() {
        let service = Arc::new(InProcessService::standalone());
        let mut alice = client("alice", 1, HERE, service.clone());
        let mut bob = client("bob", 2, HERE, service.clone());
        bob.tracker_mut().set_position(Vector3::new(5.0, 0.0, 5.0));

        bootstrap(&mut alice).await;
        bootstrap(&mut bob).await;
        wait_for_presence(service.hub(), 2).await;

        let art = alice.create(EntityKind::Content).await.unwrap();
        assert_eq!(alice.step().published, 1);
        assert!(alice.repo().get(art.as_str()).unwrap().published);

        assert!(
            bob.step_until(|r| r.get(art.as_str()).is_some_and(|e| e.relocalized))
                .await
        );
        let seen = bob.repo().get(art.as_str()).unwrap();
        assert!(seen.remote && seen.published);
        assert!(!seen.has_local_anchor());
        // Two metres north of bob's own gps anchor
        assert_near(bob.local_position(art.as_str()).unwrap(), Vector3::new(5.0, 0.0, 3.0));

        // Received records are never published back
        assert_eq!(bob.step().published, 0);
        assert_eq!(service.hub().stats().publishes, 3);
    }

    #[tokio::test]
    async fn test_far_client_hears_nothing() {
        let service = Arc::new(InProcessService::standalone());
        let mut alice = client("alice", 1, HERE, service.clone());
        let mut carol = client("carol", 3, FAR, service.clone());

        bootstrap(&mut alice).await;
        let own = bootstrap(&mut carol).await;
        wait_for_presence(service.hub(), 2).await;

        let art = alice.create(EntityKind::Content).await.unwrap();
        alice.step();
        wait_for_stored(service.hub(), &art).await;

        for _ in 0..10 {
            carol.step();
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        assert_eq!(carol.repo().len(), 1);
        assert!(carol.repo().get(own.as_str()).is_some());

        // Reloading from the server still sees only carol's own records
        assert_eq!(carol.connect().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_late_joiner_loads_and_relocalizes() {
        let service = Arc::new(InProcessService::standalone());
        let mut alice = client("alice", 1, HERE, service.clone());
        bootstrap(&mut alice).await;
        let art = alice.create(EntityKind::Content).await.unwrap();
        alice.step();
        wait_for_stored(service.hub(), &art).await;

        let mut dave = client("dave", 4, HERE, service.clone());
        dave.tracker_mut().set_position(Vector3::new(-3.0, 0.0, 0.0));
        assert_eq!(dave.connect().await.unwrap(), 2);

        let loaded = dave.repo().get(art.as_str()).unwrap();
        assert!(loaded.remote && loaded.published && !loaded.relocalized);

        // Nothing relocalizes before dave has a reference of his own
        assert_eq!(dave.step().published, 0);
        assert!(!dave.repo().get(art.as_str()).unwrap().relocalized);

        dave.create(EntityKind::Gps).await.unwrap();
        assert_eq!(dave.step().published, 1);
        assert!(dave.step_until(|r| r.get(art.as_str()).is_some_and(|e| e.relocalized)).await);
        assert_near(dave.local_position(art.as_str()).unwrap(), Vector3::new(-3.0, 0.0, -2.0));
    }

    #[tokio::test]
    async fn test_first_party_is_admin() {
        let service = Arc::new(InProcessService::standalone());
        let mut alice = client("alice", 1, HERE, service.clone());
        let mut bob = client("bob", 2, HERE, service.clone());
        bootstrap(&mut alice).await;
        bootstrap(&mut bob).await;

        let first = alice.create(EntityKind::Party).await.unwrap();
        alice.step();
        wait_for_stored(service.hub(), &first).await;

        let second = bob.create(EntityKind::Party).await.unwrap();
        bob.step();
        wait_for_stored(service.hub(), &second).await;

        let store = service.hub().store().lock();
        assert_eq!(store.get(first.as_str()).unwrap().admin, Some(ADMIN_LEVEL));
        assert_eq!(store.get(second.as_str()).unwrap().admin, None);
    }

    #[tokio::test]
    async fn test_publish_while_offline_is_not_resent() {
        let service = Arc::new(InProcessService::standalone());
        service.set_online(false);
        let mut alice = client("alice", 1, HERE, service.clone());

        assert_eq!(alice.connect().await.unwrap(), 0);
        assert!(!alice.repo().channel().is_connected());

        let gps = alice.create(EntityKind::Gps).await.unwrap();
        assert_eq!(alice.step().published, 1);
        assert!(alice.repo().get(gps.as_str()).unwrap().published);

        service.set_online(true);
        alice.connect().await.unwrap();
        assert!(alice.repo().channel().is_connected());
        assert_eq!(alice.step().published, 0);
        assert!(service.hub().store().lock().get(gps.as_str()).is_none());
    }

    #[tokio::test]
    async fn test_map_save_forces_reference_and_loads_elsewhere() {
        let service = Arc::new(InProcessService::standalone());
        let mut alice = client("alice", 1, HERE, service.clone());
        alice.connect().await.unwrap();
        assert!(alice.repo().reference().is_none());

        let reply = alice.map_save().await.unwrap();
        assert_eq!(reply, StatusReply::map_saved());

        let reference = alice.repo().reference().unwrap().clone();
        assert!(reference.relocalized);
        assert_eq!(service.map_count(), 1);
        {
            let store = service.hub().store().lock();
            let map = store.get(reference.uuid.map_uuid().as_str()).unwrap();
            assert_eq!(map.kind, EntityKind::Map);
            assert_eq!(map.anchor_uid, reference.anchor_uid);
        }

        let mut erin = client("erin", 5, HERE, service.clone());
        erin.connect().await.unwrap();
        erin.repo_mut().map_load(&reference.anchor_uid).await.unwrap();
        assert_eq!(erin.tracker().maps_loaded(), 1);
        assert!(erin.tracker().anchor_uids().contains(&reference.anchor_uid.as_str()));

        // Map records are left alone by the update loop
        erin.step();
        let map = erin.repo().get(reference.uuid.map_uuid().as_str()).unwrap();
        assert!(!map.relocalized);
    }

    #[tokio::test]
    async fn test_end_to_end_over_http_and_tcp() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            http_addr: "127.0.0.1:0".parse().unwrap(),
            channel_addr: "127.0.0.1:0".parse().unwrap(),
            upload_dir: dir.path().join("uploads"),
            ..Default::default()
        };
        let server = Server::bind(config).await.unwrap();
        let hub = server.hub().clone();
        let http = HttpServiceConfig::new(
            format!("http://{}", server.http_addr()),
            server.channel_addr(),
        );
        tokio::spawn(server.run());

        let service: Arc<dyn EntityService> = Arc::new(HttpEntityService::new(http).unwrap());
        let mut alice = client("alice", 1, HERE, service.clone());
        let mut bob = client("bob", 2, HERE, service.clone());
        bob.tracker_mut().set_position(Vector3::new(0.0, 1.0, 0.0));

        bootstrap(&mut alice).await;
        bootstrap(&mut bob).await;
        wait_for_presence(&hub, 2).await;

        let art = alice.create(EntityKind::Content).await.unwrap();
        alice.step();
        assert!(
            bob.step_until(|r| r.get(art.as_str()).is_some_and(|e| e.relocalized))
                .await
        );
        assert_near(bob.local_position(art.as_str()).unwrap(), Vector3::new(0.0, 1.0, -2.0));

        let found = service
            .query(&json!({ "gps": HERE }))
            .await
            .unwrap();
        assert!(found.contains_key(art.as_str()));

        let reply = alice.map_save().await.unwrap();
        assert_eq!(reply.status, "thanks");
        let reference = alice.repo().reference().unwrap().anchor_uid.clone();
        assert!(dir.path().join("uploads").join(&reference).is_file());

        bob.repo_mut().map_load(&reference).await.unwrap();
        assert_eq!(bob.tracker().maps_loaded(), 1);
    }
}
