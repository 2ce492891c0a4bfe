//! Client-side entity table
//!
//! Keyed by uuid, iterated in insertion order so that per-frame passes
//! visit entities in the order they became known.

use std::collections::HashMap;

use anchorsync_core::{EntityRecord, EntityUuid};

#[derive(Debug, Default)]
pub struct EntityTable {
    records: HashMap<EntityUuid, EntityRecord>,
    order: Vec<EntityUuid>,
}

impl EntityTable {
    pub fn new() -> Self {
        EntityTable::default()
    }

    /// Insert or fully replace; returns the previous record
    pub fn insert(&mut self, record: EntityRecord) -> Option<EntityRecord> {
        let uuid = record.uuid.clone();
        let previous = self.records.insert(uuid.clone(), record);
        if previous.is_none() {
            self.order.push(uuid);
        }
        previous
    }

    #[inline]
    pub fn get(&self, uuid: &str) -> Option<&EntityRecord> {
        self.records.get(uuid)
    }

    #[inline]
    pub fn get_mut(&mut self, uuid: &str) -> Option<&mut EntityRecord> {
        self.records.get_mut(uuid)
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.records.contains_key(uuid)
    }

    /// Uuids in insertion order
    pub fn uuids(&self) -> Vec<EntityUuid> {
        self.order.clone()
    }

    /// Records in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.order.iter().filter_map(|uuid| self.records.get(uuid))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorsync_core::EntityKind;

    fn record(uuid: &str) -> EntityRecord {
        EntityRecord::new(EntityUuid::from(uuid), EntityKind::Content)
    }

    #[test]
    fn test_insertion_order_survives_replace() {
        let mut table = EntityTable::new();
        table.insert(record("c"));
        table.insert(record("a"));
        table.insert(record("b"));
        assert!(table.insert(record("a")).is_some());

        let order: Vec<_> = table.iter().map(|e| e.uuid.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_clear() {
        let mut table = EntityTable::new();
        table.insert(record("a"));
        table.clear();
        assert!(table.is_empty());
        assert!(table.uuids().is_empty());
        assert!(!table.contains("a"));
    }
}
