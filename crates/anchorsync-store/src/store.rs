//! Server entity store - the sole authority for entity state
//!
//! In-memory table keyed by uuid. Saves are full-record replaces; the
//! server never merges fields from two writers. Server-assigned fields
//! (`admin`, `createdAt`) survive a replace of the same uuid.

use std::collections::{BTreeMap, HashMap};

use anchorsync_core::{
    ConnectionId, DistanceFilter, EntityKind, EntityRecord, EntityUuid, GeoPoint, SyncError,
    SyncResult, Timestamp, ADMIN_LEVEL, NEARBY_RADIUS_KM,
};

use crate::{EntityFilter, PresenceTable};

/// Result of a query, keyed by uuid
pub type QueryResults = BTreeMap<EntityUuid, EntityRecord>;

/// Authoritative entity store
#[derive(Debug)]
pub struct ServerEntityStore {
    entities: HashMap<EntityUuid, EntityRecord>,
    presence: PresenceTable,
    proximity: DistanceFilter,
    /// Uuid of the first party ever saved
    admin: Option<EntityUuid>,
}

impl ServerEntityStore {
    pub fn new() -> Self {
        Self::with_radii(NEARBY_RADIUS_KM, NEARBY_RADIUS_KM)
    }

    /// Store with custom query and presence radii (km)
    pub fn with_radii(query_radius_km: f64, nearby_radius_km: f64) -> Self {
        ServerEntityStore {
            entities: HashMap::new(),
            presence: PresenceTable::with_radius(nearby_radius_km),
            proximity: DistanceFilter::new(query_radius_km),
            admin: None,
        }
    }

    /// Pre-save hook: the first party ever registered becomes admin.
    ///
    /// Clients cannot assert admin themselves; any incoming marker is
    /// dropped before the check. Only that party's uuid, saved as a party,
    /// carries the marker afterwards.
    pub fn sanitize(&self, entity: &mut EntityRecord) {
        entity.admin = None;

        match entity.kind {
            EntityKind::Party => match &self.admin {
                None => {
                    tracing::info!(uuid = %entity.uuid, "store: first party joined, granting admin");
                    entity.admin = Some(ADMIN_LEVEL);
                }
                Some(uuid) if *uuid == entity.uuid => entity.admin = Some(ADMIN_LEVEL),
                Some(_) => {}
            },
            EntityKind::Gps | EntityKind::Content | EntityKind::Map => {}
        }
    }

    /// Upsert an entity by uuid and return the stored copy
    pub fn save(&mut self, mut entity: EntityRecord) -> EntityRecord {
        self.sanitize(&mut entity);
        if entity.is_admin() && self.admin.is_none() {
            self.admin = Some(entity.uuid.clone());
        }

        let now = Timestamp::now();
        match self.entities.get(&entity.uuid) {
            Some(previous) => {
                entity.created_at = previous.created_at.or(Some(now));
                tracing::debug!(uuid = %entity.uuid, "store: replaced");
            }
            None => {
                entity.created_at = Some(now);
                tracing::debug!(uuid = %entity.uuid, kind = %entity.kind, "store: created");
            }
        }
        entity.updated_at = Some(now);

        self.entities.insert(entity.uuid.clone(), entity.clone());
        entity
    }

    /// Every entity matching all clauses of `filter`
    pub fn query(&self, filter: &EntityFilter) -> SyncResult<QueryResults> {
        let mut results = QueryResults::new();
        for (uuid, entity) in &self.entities {
            if filter.matches(entity, &self.proximity)? {
                tracing::debug!(uuid = %uuid, "query: returning entity");
                results.insert(uuid.clone(), entity.clone());
            }
        }
        Ok(results)
    }

    /// Entities within the query radius of `point`
    pub fn query_nearby(&self, point: GeoPoint) -> SyncResult<QueryResults> {
        self.query(&EntityFilter::new().near(point))
    }

    /// Bulk write-out of the table. Not implemented.
    pub fn flush(&mut self) -> SyncResult<()> {
        Err(SyncError::NotImplemented("flush"))
    }

    pub fn get(&self, uuid: &str) -> Option<&EntityRecord> {
        self.entities.get(uuid)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityUuid, &EntityRecord)> {
        self.entities.iter()
    }

    // Presence

    pub fn socket_remember(&mut self, id: ConnectionId, location: GeoPoint) {
        self.presence.remember(id, location);
    }

    pub fn socket_forget(&mut self, id: ConnectionId) {
        self.presence.forget(id);
    }

    pub fn socket_nearby(&self, a: ConnectionId, b: ConnectionId) -> bool {
        self.presence.nearby(a, b)
    }

    pub fn presence(&self) -> &PresenceTable {
        &self.presence
    }
}

impl Default for ServerEntityStore {
    fn default() -> Self {
        Self::new()
    }
}
