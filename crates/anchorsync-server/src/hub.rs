//! Real-time hub
//!
//! Every channel connection gets a `ConnectionId` and a task that applies
//! its events to the shared store:
//! - `location` remembers where the connection is
//! - `publish` saves the record, then broadcasts the saved copy to every
//!   other connection near the sender
//! - disconnect forgets the connection's location
//!
//! Lock order is always store, then connections. Outbound sends are
//! unbounded queue pushes, so no lock is held across an await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use anchorsync_core::{ConnectionId, EntityRecord};
use anchorsync_store::ServerEntityStore;
use anchorsync_transport::{ChannelHandle, ChannelListener, ChannelSender};
use anchorsync_wire::{ChannelMessage, EntitySnapshot};

/// Pause after a failed accept, e.g. when out of file descriptors
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Shared handle to the store
pub type SharedStore = Arc<Mutex<ServerEntityStore>>;

#[derive(Clone, Debug, Default)]
pub struct HubStats {
    pub connections_accepted: u64,
    pub publishes: u64,
    pub broadcasts: u64,
    pub locations: u64,
}

struct HubInner {
    store: SharedStore,
    connections: Mutex<HashMap<ConnectionId, ChannelSender>>,
    next_id: AtomicU64,
    stats: Mutex<HubStats>,
}

/// Fan-out hub; cheap to clone
#[derive(Clone)]
pub struct SyncHub {
    inner: Arc<HubInner>,
}

impl SyncHub {
    pub fn new(store: ServerEntityStore) -> Self {
        SyncHub {
            inner: Arc::new(HubInner {
                store: Arc::new(Mutex::new(store)),
                connections: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                stats: Mutex::new(HubStats::default()),
            }),
        }
    }

    #[inline]
    pub fn store(&self) -> &SharedStore {
        &self.inner.store
    }

    pub fn stats(&self) -> HubStats {
        self.inner.stats.lock().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }

    /// Register a connection and serve it in the background
    pub fn attach(&self, handle: ChannelHandle) -> (ConnectionId, JoinHandle<()>) {
        let id = ConnectionId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, mut rx) = handle.into_parts();

        if let Some(tx) = tx {
            self.inner.connections.lock().insert(id, tx);
        }
        self.inner.stats.lock().connections_accepted += 1;
        tracing::info!(conn = %id, "hub: connection attached");

        let hub = self.clone();
        let task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                hub.handle_message(id, msg);
            }
            hub.disconnect(id);
        });

        (id, task)
    }

    /// Apply one event from connection `from`
    pub fn handle_message(&self, from: ConnectionId, msg: ChannelMessage) {
        match msg {
            ChannelMessage::Location(location) => {
                self.inner.store.lock().socket_remember(from, location);
                self.inner.stats.lock().locations += 1;
            }
            ChannelMessage::Publish(snapshot) => {
                self.publish(from, snapshot.into_record());
            }
        }
    }

    /// Save `entity` and broadcast the stored copy; returns the number of
    /// connections it was sent to
    pub fn publish(&self, from: ConnectionId, entity: EntityRecord) -> usize {
        let mut store = self.inner.store.lock();
        let saved = store.save(entity);
        tracing::debug!(conn = %from, uuid = %saved.uuid, "hub: publish saved");

        let msg = ChannelMessage::Publish(EntitySnapshot::from(&saved));
        let mut sent = 0;
        let mut dead = Vec::new();
        {
            let connections = self.inner.connections.lock();
            for (id, tx) in connections.iter() {
                if *id == from || !store.socket_nearby(from, *id) {
                    continue;
                }
                if tx.send(msg.clone()).is_err() {
                    dead.push(*id);
                } else {
                    sent += 1;
                }
            }
        }
        drop(store);

        for id in dead {
            self.disconnect(id);
        }

        let mut stats = self.inner.stats.lock();
        stats.publishes += 1;
        stats.broadcasts += sent as u64;
        sent
    }

    /// Forget everything about a connection
    pub fn disconnect(&self, id: ConnectionId) {
        self.inner.store.lock().socket_forget(id);
        if self.inner.connections.lock().remove(&id).is_some() {
            tracing::info!(conn = %id, "hub: connection closed");
        }
    }

    /// Accept channel connections until the listener fails
    pub async fn serve(&self, listener: ChannelListener) {
        tracing::info!(addr = %listener.local_addr(), "hub: accepting channel connections");
        loop {
            match listener.accept().await {
                Ok((handle, peer)) => {
                    let (id, _) = self.attach(handle);
                    tracing::debug!(conn = %id, %peer, "hub: accepted");
                }
                Err(e) => {
                    tracing::warn!("hub: accept error: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use anchorsync_core::{
        Cartesian3, EntityKind, EntityUuid, GeoPoint, ADMIN_LEVEL,
    };
    use anchorsync_transport::memory_pair;

    fn hub() -> SyncHub {
        SyncHub::new(ServerEntityStore::new())
    }

    fn art(uuid: &str) -> EntitySnapshot {
        let record = EntityRecord::new(EntityUuid::from(uuid), EntityKind::Content)
            .with_gps(GeoPoint::new(37.0, -122.0, 0.0))
            .with_cartesian(Cartesian3::new(1.0, 2.0, 3.0));
        EntitySnapshot::from(&record)
    }

    async fn recv_soon(handle: &mut ChannelHandle) -> Option<ChannelMessage> {
        tokio::time::timeout(Duration::from_millis(200), handle.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_publish_reaches_only_nearby_others() {
        let hub = hub();
        let (_a_client, a_server) = memory_pair();
        let (mut b_client, b_server) = memory_pair();
        let (mut c_client, c_server) = memory_pair();
        let (a, _) = hub.attach(a_server);
        let (b, _) = hub.attach(b_server);
        let (c, _) = hub.attach(c_server);

        hub.handle_message(a, ChannelMessage::Location(GeoPoint::new(37.0, -122.0, 0.0)));
        hub.handle_message(b, ChannelMessage::Location(GeoPoint::new(37.003, -122.0, 0.0)));
        hub.handle_message(c, ChannelMessage::Location(GeoPoint::new(37.02, -122.0, 0.0)));

        assert_eq!(hub.publish(a, art("z_a_1").into_record()), 1);

        match b_client.try_recv() {
            Some(ChannelMessage::Publish(snapshot)) => assert_eq!(snapshot.uuid.as_str(), "z_a_1"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(c_client.try_recv().is_none());
        assert!(hub.store().lock().get("z_a_1").is_some());
    }

    #[tokio::test]
    async fn test_connection_without_location_hears_nothing() {
        let hub = hub();
        let (a_client, a_server) = memory_pair();
        let (mut b_client, b_server) = memory_pair();
        hub.attach(a_server);
        hub.attach(b_server);

        a_client
            .send(ChannelMessage::Location(GeoPoint::new(37.0, -122.0, 0.0)))
            .unwrap();
        a_client.send(ChannelMessage::Publish(art("z_a_1"))).unwrap();

        assert!(recv_soon(&mut b_client).await.is_none());
    }

    #[tokio::test]
    async fn test_channel_round_trip_through_tasks() {
        let hub = hub();
        let (a_client, a_server) = memory_pair();
        let (mut b_client, b_server) = memory_pair();
        hub.attach(a_server);
        hub.attach(b_server);

        let here = GeoPoint::new(37.0, -122.0, 0.0);
        a_client.send(ChannelMessage::Location(here)).unwrap();
        b_client.send(ChannelMessage::Location(here)).unwrap();
        // Let both locations land before publishing
        tokio::time::sleep(Duration::from_millis(20)).await;

        a_client.send(ChannelMessage::Publish(art("z_a_1"))).unwrap();
        match recv_soon(&mut b_client).await {
            Some(ChannelMessage::Publish(snapshot)) => {
                assert_eq!(snapshot.uuid.as_str(), "z_a_1");
                assert_eq!(snapshot.cartesian, Some(Cartesian3::new(1.0, 2.0, 3.0)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(hub.stats().publishes, 1);
        assert_eq!(hub.stats().broadcasts, 1);
    }

    #[tokio::test]
    async fn test_disconnect_forgets_location() {
        let hub = hub();
        let (a_client, a_server) = memory_pair();
        let (a, task) = hub.attach(a_server);
        hub.handle_message(a, ChannelMessage::Location(GeoPoint::new(37.0, -122.0, 0.0)));
        assert_eq!(hub.store().lock().presence().len(), 1);

        drop(a_client);
        task.await.unwrap();

        assert_eq!(hub.connection_count(), 0);
        assert!(hub.store().lock().presence().is_empty());
    }

    #[tokio::test]
    async fn test_serve_accepts_tcp_connections() {
        use anchorsync_transport::{connect, ChannelListener};
        use anchorsync_wire::FrameCodec;

        let hub = hub();
        let listener = ChannelListener::bind("127.0.0.1:0".parse().unwrap(), FrameCodec::new())
            .await
            .unwrap();
        let addr = listener.local_addr();
        let serving = hub.clone();
        let server = tokio::spawn(async move { serving.serve(listener).await });

        let client = connect(addr, FrameCodec::new()).await.unwrap();
        client
            .send(ChannelMessage::Location(GeoPoint::new(37.0, -122.0, 0.0)))
            .unwrap();
        for _ in 0..100 {
            if hub.store().lock().presence().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(hub.store().lock().presence().len(), 1);
        assert!(!ACCEPT_ERROR_BACKOFF.is_zero());

        server.abort();
    }

    #[tokio::test]
    async fn test_first_party_admin_through_hub() {
        let hub = hub();
        let (_client, server) = memory_pair();
        let (id, _) = hub.attach(server);

        let party = |uuid: &str| {
            EntityRecord::new(EntityUuid::from(uuid), EntityKind::Party)
                .with_cartesian(Cartesian3::new(1.0, 0.0, 0.0))
        };
        hub.publish(id, party("z_p_1"));
        hub.publish(id, party("z_p_2"));

        let store = hub.store().lock();
        assert_eq!(store.get("z_p_1").unwrap().admin, Some(ADMIN_LEVEL));
        assert_eq!(store.get("z_p_2").unwrap().admin, None);
    }
}
