//! Real-time channel messages

use serde::{Deserialize, Serialize};

use anchorsync_core::GeoPoint;

use crate::EntitySnapshot;

/// Event carried by the real-time channel.
///
/// `publish` flows both ways: client -> server announces a change,
/// server -> subscribers broadcasts it. `location` is sent once by a
/// client right after connecting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum ChannelMessage {
    Publish(EntitySnapshot),
    Location(GeoPoint),
}

impl ChannelMessage {
    /// Event name on the wire
    pub fn event_name(&self) -> &'static str {
        match self {
            ChannelMessage::Publish(_) => "publish",
            ChannelMessage::Location(_) => "location",
        }
    }
}
