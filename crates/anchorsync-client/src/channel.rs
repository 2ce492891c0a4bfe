//! Client side of the sync channel
//!
//! Publishing sends an allow-listed snapshot of a local record. Receiving
//! merges a remote record into the local table without clobbering state
//! that only this client can produce (anchors, scene nodes, poses).

use std::sync::Arc;

use serde_json::json;

use anchorsync_core::{EntityRecord, GeoPoint, SyncError, SyncResult};
use anchorsync_transport::ChannelHandle;
use anchorsync_wire::{ChannelMessage, EntitySnapshot, FrameCodec};

use crate::{EntityService, EntityTable};

/// Result of a publish attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// No geocentric position yet; nothing sent, `published` untouched
    Refused,
    /// Not connected; `published` is set and the record is not re-sent
    Deferred,
    /// Queued on the channel
    Sent,
    /// Snapshot exceeds the channel frame limit; `published` is set and
    /// nothing is sent
    Dropped,
}

/// Result of merging a remote record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Unknown uuid, stored verbatim
    Inserted,
    /// Known uuid, `cartesian`, `art`, `tags` and `gps` overwritten
    Merged,
}

/// Publish/receive endpoint of one client
pub struct SyncChannel {
    handle: Option<ChannelHandle>,
    service: Arc<dyn EntityService>,
}

impl SyncChannel {
    pub fn new(service: Arc<dyn EntityService>) -> Self {
        SyncChannel {
            handle: None,
            service,
        }
    }

    #[inline]
    pub fn service(&self) -> &Arc<dyn EntityService> {
        &self.service
    }

    /// Connected and the peer still listening
    pub fn is_connected(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_closed())
    }

    /// Use `handle` for all further traffic
    pub fn attach(&mut self, handle: ChannelHandle) {
        if let Some(mut previous) = self.handle.replace(handle) {
            previous.close();
        }
    }

    /// Open the channel through the service unless already connected
    pub async fn connect(&mut self) -> SyncResult<bool> {
        if self.is_connected() {
            return Ok(false);
        }
        let handle = self.service.connect_channel().await?;
        self.attach(handle);
        tracing::info!("sync channel connected");
        Ok(true)
    }

    /// Cancel the subscription
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
    }

    /// Announce this client's position to the server
    pub fn send_location(&self, gps: GeoPoint) -> SyncResult<()> {
        let handle = self.handle.as_ref().ok_or(SyncError::TransportUnavailable)?;
        handle.send(ChannelMessage::Location(gps))
    }

    /// Publish `entity`; only records with a geocentric position leave
    /// this client
    pub fn publish(&mut self, entity: &mut EntityRecord) -> PublishOutcome {
        if !entity.has_cartesian() {
            tracing::warn!(uuid = %entity.uuid, "publish: entity has no cartesian");
            return PublishOutcome::Refused;
        }

        entity.published = true;

        let Some(handle) = &self.handle else {
            tracing::debug!(uuid = %entity.uuid, "publish: not connected, deferred");
            return PublishOutcome::Deferred;
        };

        let msg = ChannelMessage::Publish(EntitySnapshot::from(&*entity));
        let codec = FrameCodec::with_max_frame_size(self.service.max_frame_size());
        if let Err(e) = codec.encode(&msg) {
            tracing::warn!(uuid = %entity.uuid, "publish: snapshot dropped: {}", e);
            return PublishOutcome::Dropped;
        }

        match handle.send(msg) {
            Ok(()) => {
                tracing::debug!(uuid = %entity.uuid, kind = %entity.kind, "publish: sent");
                PublishOutcome::Sent
            }
            Err(e) => {
                tracing::warn!(uuid = %entity.uuid, "publish: channel lost: {}", e);
                self.handle = None;
                PublishOutcome::Deferred
            }
        }
    }

    /// Merge a record received from the network
    pub fn receive(table: &mut EntityTable, mut incoming: EntityRecord) -> MergeOutcome {
        incoming.mark_remote();

        match table.get_mut(incoming.uuid.as_str()) {
            None => {
                tracing::debug!(uuid = %incoming.uuid, "receive: saving new remote entity");
                table.insert(incoming);
                MergeOutcome::Inserted
            }
            Some(previous) => {
                previous.cartesian = incoming.cartesian;
                previous.art = incoming.art;
                previous.tags = incoming.tags;
                previous.gps = incoming.gps;
                tracing::debug!(uuid = %previous.uuid, "receive: remote entity found again and updated");
                MergeOutcome::Merged
            }
        }
    }

    /// Apply every pending `publish` event; returns how many were applied
    pub fn drain_incoming(&mut self, table: &mut EntityTable) -> usize {
        let Some(handle) = self.handle.as_mut() else {
            return 0;
        };

        let mut applied = 0;
        while let Some(msg) = handle.try_recv() {
            match msg {
                ChannelMessage::Publish(snapshot) => {
                    Self::receive(table, snapshot.into_record());
                    applied += 1;
                }
                ChannelMessage::Location(_) => {
                    tracing::debug!("receive: ignoring location event from server");
                }
            }
        }
        applied
    }

    /// Replace local records with everything the server has near `gps`.
    ///
    /// Loaded records follow the receive flag policy. Local attachments of
    /// records already known are kept.
    pub async fn load_all(&self, table: &mut EntityTable, gps: Option<&GeoPoint>) -> SyncResult<usize> {
        let Some(gps) = gps else {
            tracing::warn!("load_all: a gps location is needed before loading");
            return Err(SyncError::NoGeodeticFix);
        };
        tracing::info!(lat = gps.latitude, lon = gps.longitude, "load_all: getting all entities nearby");

        let results = self.service.query(&json!({ "gps": gps })).await?;

        let count = results.len();
        for (_, mut entity) in results {
            entity.mark_remote();
            if let Some(previous) = table.get_mut(entity.uuid.as_str()) {
                entity.local = std::mem::take(&mut previous.local);
            }
            tracing::debug!(uuid = %entity.uuid, kind = %entity.kind, anchor = %entity.anchor_uid, "load_all: made entity");
            table.insert(entity);
        }

        tracing::info!(count, "load_all: loading done");
        Ok(count)
    }
}
