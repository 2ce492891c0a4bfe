//! anchorsync Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every anchorsync component:
//! - Identifiers (EntityUuid, ConnectionId)
//! - Geodetic points, ECEF coordinates and the haversine distance filter
//! - Tracking-space poses
//! - The entity record and its synchronization flags
//! - The error taxonomy

pub mod entity;
pub mod error;
pub mod geo;
pub mod id;
pub mod pose;
pub mod time;

pub use entity::*;
pub use error::*;
pub use geo::*;
pub use id::*;
pub use pose::*;
pub use time::*;
