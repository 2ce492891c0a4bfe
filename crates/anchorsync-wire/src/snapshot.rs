//! Entity snapshot - the publishable extract of a record
//!
//! Only allow-listed fields cross the wire. Local attachments, the full
//! tracking transform, admin markers and server timestamps stay behind.

use serde::{Deserialize, Serialize};

use anchorsync_core::{
    Cartesian3, EntityKind, EntityRecord, EntityUuid, GeoPoint, Quaternion, Vector3,
};

/// Allow-listed subset of an `EntityRecord`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub uuid: EntityUuid,
    #[serde(rename = "anchorUID", default)]
    pub anchor_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<Vector3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Quaternion>,
    #[serde(default)]
    pub relocalized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cartesian: Option<Cartesian3>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub descr: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub art: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub party: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub dirty: bool,
}

impl From<&EntityRecord> for EntitySnapshot {
    fn from(record: &EntityRecord) -> Self {
        EntitySnapshot {
            uuid: record.uuid.clone(),
            anchor_uid: record.anchor_uid.clone(),
            gps: record.gps,
            translation: record.local_translation(),
            orientation: record.orientation,
            relocalized: record.relocalized,
            cartesian: record.cartesian,
            name: record.name.clone(),
            descr: record.descr.clone(),
            kind: record.kind,
            art: record.art.clone(),
            zone: record.zone.clone(),
            tags: record.tags.clone(),
            party: record.party.clone(),
            published: record.published,
            remote: record.remote,
            dirty: record.dirty,
        }
    }
}

impl EntitySnapshot {
    /// Rebuild a record; fields outside the allow-list start empty
    pub fn into_record(self) -> EntityRecord {
        let mut record = EntityRecord::new(self.uuid, self.kind);
        record.anchor_uid = self.anchor_uid;
        record.gps = self.gps;
        record.translation = self.translation;
        record.orientation = self.orientation;
        record.relocalized = self.relocalized;
        record.cartesian = self.cartesian;
        record.name = self.name;
        record.descr = self.descr;
        record.art = self.art;
        record.zone = self.zone;
        record.tags = self.tags;
        record.party = self.party;
        record.published = self.published;
        record.remote = self.remote;
        record.dirty = self.dirty;
        record
    }
}
