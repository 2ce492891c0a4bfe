//! Entity query filters
//!
//! A filter is a conjunction of key/value pairs. Every key except `gps`
//! is compared with strict JSON equality against the entity's serialized
//! field of the same name; an entity without that field never matches.
//! `gps` selects entities within the store's proximity radius instead.

use serde_json::{Map, Value};

use anchorsync_core::{DistanceFilter, EntityKind, EntityRecord, GeoPoint, SyncError, SyncResult};

/// Key that switches from equality to proximity matching
pub const GPS_KEY: &str = "gps";

/// Conjunctive entity filter
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityFilter {
    near: Option<GeoPoint>,
    fields: Map<String, Value>,
}

impl EntityFilter {
    pub fn new() -> Self {
        EntityFilter::default()
    }

    /// Only entities near `point`
    pub fn near(mut self, point: GeoPoint) -> Self {
        self.near = Some(point);
        self
    }

    /// Only entities whose `key` equals `value`
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key == GPS_KEY {
            tracing::warn!("filter: use EntityFilter::near for gps, ignoring equality on gps");
            return self;
        }
        self.fields.insert(key, value.into());
        self
    }

    pub fn kind(self, kind: EntityKind) -> Self {
        self.field("kind", kind.as_str())
    }

    pub fn zone(self, zone: &str) -> Self {
        self.field("zone", zone)
    }

    /// Parse a filter from a JSON object such as `{"gps": {...}, "kind": "gps"}`
    pub fn from_json(value: Value) -> SyncResult<Self> {
        let Value::Object(object) = value else {
            return Err(SyncError::InvalidField(
                "query filter must be a JSON object".into(),
            ));
        };

        let mut filter = EntityFilter::new();
        for (key, value) in object {
            if key == GPS_KEY {
                if !value.is_null() {
                    let point: GeoPoint = serde_json::from_value(value)?;
                    filter.near = Some(point);
                }
            } else {
                filter.fields.insert(key, value);
            }
        }
        Ok(filter)
    }

    #[inline]
    pub fn near_point(&self) -> Option<&GeoPoint> {
        self.near.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.near.is_none() && self.fields.is_empty()
    }

    /// Check one entity against every clause
    pub fn matches(&self, entity: &EntityRecord, proximity: &DistanceFilter) -> SyncResult<bool> {
        if let Some(origin) = &self.near {
            let Some(gps) = &entity.gps else {
                return Ok(false);
            };
            let distance = origin.distance_km(gps);
            if !proximity.accepts_distance(distance) {
                tracing::debug!(uuid = %entity.uuid, distance, "query: too far to return");
                return Ok(false);
            }
        }

        if self.fields.is_empty() {
            return Ok(true);
        }

        let serialized = serde_json::to_value(entity)?;
        for (key, expected) in &self.fields {
            match serialized.get(key) {
                Some(actual) if actual == expected => {}
                _ => {
                    tracing::debug!(uuid = %entity.uuid, key = %key, "query: rejecting");
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }
}
