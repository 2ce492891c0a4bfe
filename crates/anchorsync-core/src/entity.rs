//! Entity record definitions
//!
//! An entity is the unit of synchronization: a gps reference anchor, a
//! piece of user content, a party's live position, or a stored world map.
//! Every record carries the same base fields; kind-dependent behaviour is
//! expressed by matching on `EntityKind`.
//!
//! Flag state machine:
//! - `published` goes false -> true once, when the record is sent to or
//!   received from the network
//! - `remote` marks records whose origin is the network
//! - `dirty` is advisory only
//! - `relocalized` is recomputed locally every frame and cleared whenever
//!   a record arrives from the network

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Cartesian3, EntityUuid, GeoPoint, Quaternion, SyncError, Timestamp, Transform, Vector3};

/// Privilege level granted to the first party in a store
pub const ADMIN_LEVEL: u32 = 10;

/// Tags given to newly created entities
pub const DEFAULT_TAGS: &str = "aesthetic";

/// Entity kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Geodetic reference anchor
    Gps,
    /// User-placed art
    Content,
    /// A person's live position
    Party,
    /// Serialized world reconstruction, written server-side only
    Map,
}

impl EntityKind {
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Gps,
            EntityKind::Content,
            EntityKind::Party,
            EntityKind::Map,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Gps => "gps",
            EntityKind::Content => "content",
            EntityKind::Party => "party",
            EntityKind::Map => "map",
        }
    }

    /// Art shown for a freshly created entity of this kind
    pub fn default_art(self) -> &'static str {
        match self {
            EntityKind::Gps | EntityKind::Party | EntityKind::Map => "cylinder",
            EntityKind::Content => "box",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gps" => Ok(EntityKind::Gps),
            "content" => Ok(EntityKind::Content),
            "party" => Ok(EntityKind::Party),
            "map" => Ok(EntityKind::Map),
            other => Err(SyncError::InvalidField(format!("unknown kind {other:?}"))),
        }
    }
}

/// Opaque handle to an anchor owned by the local tracking runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AnchorHandle(pub u64);

/// Opaque handle to a node in the local scene graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SceneHandle(pub u64);

/// Process-local resources attached to a record.
///
/// Never serialized; a network merge must leave it untouched because these
/// resources cannot be rebuilt from network data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocalAttachment {
    pub anchor: Option<AnchorHandle>,
    pub scene_node: Option<SceneHandle>,
    pub debugged: bool,
}

/// Entity record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub uuid: EntityUuid,
    pub kind: EntityKind,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub party: String,
    #[serde(rename = "anchorUID", default)]
    pub anchor_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<Vector3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Quaternion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps: Option<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cartesian: Option<Cartesian3>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub descr: String,
    #[serde(default)]
    pub art: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub relocalized: bool,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub dirty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    #[serde(skip)]
    pub local: LocalAttachment,
}

impl EntityRecord {
    /// Bare record with default flags (`dirty` set, nothing published)
    pub fn new(uuid: EntityUuid, kind: EntityKind) -> Self {
        EntityRecord {
            uuid,
            kind,
            zone: String::new(),
            party: String::new(),
            anchor_uid: String::new(),
            transform: None,
            translation: None,
            orientation: None,
            gps: None,
            cartesian: None,
            name: String::new(),
            descr: String::new(),
            art: kind.default_art().to_string(),
            tags: DEFAULT_TAGS.to_string(),
            relocalized: false,
            published: false,
            remote: false,
            dirty: true,
            admin: None,
            created_at: None,
            updated_at: None,
            local: LocalAttachment::default(),
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>, party: impl Into<String>) -> Self {
        self.zone = zone.into();
        self.party = party.into();
        self
    }

    pub fn with_gps(mut self, gps: GeoPoint) -> Self {
        self.gps = Some(gps);
        self
    }

    pub fn with_cartesian(mut self, cartesian: Cartesian3) -> Self {
        self.cartesian = Some(cartesian);
        self
    }

    #[inline]
    pub fn has_cartesian(&self) -> bool {
        self.cartesian.is_some()
    }

    #[inline]
    pub fn is_admin(&self) -> bool {
        self.admin.is_some()
    }

    /// Whether this record still owns a live anchor in the local tracker
    #[inline]
    pub fn has_local_anchor(&self) -> bool {
        self.local.anchor.is_some()
    }

    /// Apply the flag policy for records that arrive from the network.
    ///
    /// A received record must be relocalized locally before it can be
    /// trusted geometrically.
    pub fn mark_remote(&mut self) {
        self.published = true;
        self.remote = true;
        self.dirty = true;
        self.relocalized = false;
    }

    /// Tracking-space translation, preferring the full transform
    pub fn local_translation(&self) -> Option<Vector3> {
        self.transform
            .map(|t| t.translation())
            .or(self.translation)
    }
}
