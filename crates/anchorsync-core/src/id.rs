//! Identity types for anchorsync
//!
//! Entity uuids are textual and deterministic: every client derives the
//! same uuid for the same zone, party and tracking anchor. They are not
//! collision-proof across parties that reuse names.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix carried by the uuid of a stored world map
pub const MAP_UUID_PREFIX: &str = "MAP";

/// Separator between the uuid components
pub const UUID_SEPARATOR: char = '_';

/// Entity identity - `<zone>_<party>_<anchor>`
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityUuid(String);

impl EntityUuid {
    /// Derive the uuid for an anchor created by `party` inside `zone`
    pub fn derive(zone: &str, party: &str, anchor_id: &str) -> Self {
        EntityUuid(format!(
            "{zone}{UUID_SEPARATOR}{party}{UUID_SEPARATOR}{anchor_id}"
        ))
    }

    /// Wrap a uuid received from the network verbatim
    pub fn from_raw(raw: impl Into<String>) -> Self {
        EntityUuid(raw.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Uuid under which the world map anchored on this entity is stored
    pub fn map_uuid(&self) -> EntityUuid {
        EntityUuid(format!("{MAP_UUID_PREFIX}{}", self.0))
    }

    #[inline]
    pub fn is_map(&self) -> bool {
        self.0.starts_with(MAP_UUID_PREFIX)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Borrow<str> for EntityUuid {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityUuid {
    fn from(raw: &str) -> Self {
        EntityUuid(raw.to_string())
    }
}

impl From<String> for EntityUuid {
    fn from(raw: String) -> Self {
        EntityUuid(raw)
    }
}

impl fmt::Debug for EntityUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl fmt::Display for EntityUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Live connection on the server's real-time channel
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub const ZERO: ConnectionId = ConnectionId(0);

    #[inline]
    pub fn new(id: u64) -> Self {
        ConnectionId(id)
    }

    /// The id following this one
    #[inline]
    pub fn next(self) -> Self {
        ConnectionId(self.0.wrapping_add(1))
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conn({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
