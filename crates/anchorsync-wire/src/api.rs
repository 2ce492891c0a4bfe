//! HTTP API bodies shared by the client and the server

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use anchorsync_core::{EntityKind, EntityRecord, EntityUuid, GeoPoint, SyncError, SyncResult};

/// Multipart field carrying the serialized world map
pub const MAP_BLOB_FIELD: &str = "blob";

/// Reply body of a successful map upload
pub const MAP_SAVED_STATUS: &str = "thanks";

/// `{"status": ...}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
}

impl StatusReply {
    pub fn map_saved() -> Self {
        StatusReply {
            status: MAP_SAVED_STATUS.to_string(),
        }
    }
}

/// `{"error": ...}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

/// A world map upload: the blob plus the metadata of the gps entity it is
/// anchored to
#[derive(Clone, Debug, PartialEq)]
pub struct MapUpload {
    pub uuid: EntityUuid,
    pub anchor_uid: String,
    pub name: String,
    pub descr: String,
    pub art: String,
    pub zone: String,
    pub tags: String,
    pub party: String,
    pub gps: GeoPoint,
    pub blob: Bytes,
}

impl MapUpload {
    /// Build an upload for `reference`, which must carry a gps fix
    pub fn for_reference(reference: &EntityRecord, blob: Bytes) -> SyncResult<Self> {
        let gps = reference.gps.ok_or(SyncError::NoGeodeticFix)?;
        Ok(MapUpload {
            uuid: reference.uuid.map_uuid(),
            anchor_uid: reference.anchor_uid.clone(),
            name: reference.name.clone(),
            descr: reference.descr.clone(),
            art: reference.art.clone(),
            zone: reference.zone.clone(),
            tags: reference.tags.clone(),
            party: reference.party.clone(),
            gps,
            blob,
        })
    }

    /// Text fields in form order
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("uuid", self.uuid.to_string()),
            ("anchorUID", self.anchor_uid.clone()),
            ("name", self.name.clone()),
            ("descr", self.descr.clone()),
            ("kind", EntityKind::Map.to_string()),
            ("art", self.art.clone()),
            ("zone", self.zone.clone()),
            ("tags", self.tags.clone()),
            ("party", self.party.clone()),
            ("relocalized", "0".to_string()),
            ("latitude", self.gps.latitude.to_string()),
            ("longitude", self.gps.longitude.to_string()),
            ("altitude", self.gps.altitude.to_string()),
        ]
    }

    /// Parse the text fields of a received form
    pub fn from_fields(mut fields: HashMap<String, String>, blob: Bytes) -> SyncResult<Self> {
        let mut take = |key: &str| fields.remove(key).unwrap_or_default();

        let uuid = EntityUuid::from(take("uuid"));
        if uuid.is_empty() {
            return Err(SyncError::InvalidField("map upload without uuid".into()));
        }
        let anchor_uid = take("anchorUID");
        if anchor_uid.is_empty() || anchor_uid.contains(['/', '\\']) || anchor_uid.starts_with('.') {
            return Err(SyncError::InvalidField(format!(
                "unusable anchorUID {anchor_uid:?}"
            )));
        }

        let kind = take("kind");
        if !kind.is_empty() && kind.parse::<EntityKind>()? != EntityKind::Map {
            return Err(SyncError::InvalidField(format!("map upload of kind {kind}")));
        }

        let coordinate = |raw: String, name: &str| -> SyncResult<f64> {
            if raw.is_empty() {
                return Ok(0.0);
            }
            raw.parse()
                .map_err(|_| SyncError::InvalidField(format!("{name} is not a number")))
        };
        let latitude = coordinate(take("latitude"), "latitude")?;
        let longitude = coordinate(take("longitude"), "longitude")?;
        let altitude = coordinate(take("altitude"), "altitude")?;

        Ok(MapUpload {
            uuid,
            anchor_uid,
            name: take("name"),
            descr: take("descr"),
            art: take("art"),
            zone: take("zone"),
            tags: take("tags"),
            party: take("party"),
            gps: GeoPoint::new(latitude, longitude, altitude),
            blob,
        })
    }

    /// Stored file name of the blob
    #[inline]
    pub fn filename(&self) -> &str {
        &self.anchor_uid
    }

    /// The `map` record describing this upload
    pub fn to_record(&self) -> EntityRecord {
        let mut record = EntityRecord::new(self.uuid.clone(), EntityKind::Map)
            .with_zone(self.zone.clone(), self.party.clone())
            .with_gps(self.gps);
        record.anchor_uid = self.anchor_uid.clone();
        record.name = self.name.clone();
        record.descr = self.descr.clone();
        record.art = self.art.clone();
        record.tags = self.tags.clone();
        record.published = true;
        record
    }
}
