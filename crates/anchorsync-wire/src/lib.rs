//! anchorsync Wire Protocol - JSON messages over length-prefixed frames
//!
//! This crate implements the real-time channel format:
//! - Entity snapshots (allow-listed subset of a record)
//! - Channel messages (`publish`, `location`)
//! - Frame codec (4-byte big-endian length + JSON body)
//! - HTTP API bodies (map uploads, status replies)

pub mod api;
pub mod frame;
pub mod message;
pub mod snapshot;

pub use api::*;
pub use frame::*;
pub use message::*;
pub use snapshot::*;
