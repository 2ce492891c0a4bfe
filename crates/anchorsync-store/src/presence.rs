//! Presence table - last known location of each live connection
//!
//! Independent of entity storage; used to decide which connections are
//! close enough to receive each other's broadcasts.

use std::collections::HashMap;

use anchorsync_core::{ConnectionId, DistanceFilter, GeoPoint};

#[derive(Debug, Default)]
pub struct PresenceTable {
    locations: HashMap<ConnectionId, GeoPoint>,
    proximity: DistanceFilter,
}

impl PresenceTable {
    pub fn new() -> Self {
        PresenceTable::default()
    }

    pub fn with_radius(radius_km: f64) -> Self {
        PresenceTable {
            locations: HashMap::new(),
            proximity: DistanceFilter::new(radius_km),
        }
    }

    /// Associate a connection with its last known location
    pub fn remember(&mut self, id: ConnectionId, location: GeoPoint) {
        tracing::debug!(conn = %id, lat = location.latitude, lon = location.longitude, "presence: remember");
        self.locations.insert(id, location);
    }

    pub fn forget(&mut self, id: ConnectionId) -> Option<GeoPoint> {
        self.locations.remove(&id)
    }

    pub fn location(&self, id: ConnectionId) -> Option<&GeoPoint> {
        self.locations.get(&id)
    }

    /// Both connections known and strictly closer than the radius
    pub fn nearby(&self, a: ConnectionId, b: ConnectionId) -> bool {
        match (self.locations.get(&a), self.locations.get(&b)) {
            (Some(la), Some(lb)) => self.proximity.strictly_within(la, lb),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearby_requires_both_locations() {
        let mut table = PresenceTable::new();
        let a = ConnectionId::new(1);
        let b = ConnectionId::new(2);

        assert!(!table.nearby(a, b));
        table.remember(a, GeoPoint::new(37.0, -122.0, 0.0));
        assert!(!table.nearby(a, b));
        table.remember(b, GeoPoint::new(37.003, -122.0, 0.0));
        assert!(table.nearby(a, b));
        assert!(table.nearby(b, a));
    }

    #[test]
    fn test_far_connections_not_nearby() {
        let mut table = PresenceTable::new();
        let a = ConnectionId::new(1);
        let b = ConnectionId::new(2);
        table.remember(a, GeoPoint::new(37.0, -122.0, 0.0));
        table.remember(b, GeoPoint::new(37.02, -122.0, 0.0));
        assert!(!table.nearby(a, b));
    }

    #[test]
    fn test_forget() {
        let mut table = PresenceTable::new();
        let a = ConnectionId::new(1);
        table.remember(a, GeoPoint::new(0.0, 0.0, 0.0));
        assert_eq!(table.len(), 1);
        assert!(table.forget(a).is_some());
        assert!(table.is_empty());
        assert!(!table.nearby(a, a));
    }
}
