//! anchorsync Client - local mirror of nearby entities
//!
//! This crate provides:
//! - `ClientEntityRepository`, the per-frame relocalize/publish driver
//! - `AnchorRelocalizer`, tracking-space to geocentric conversion
//! - `SyncChannel`, publish/receive over the real-time channel
//! - `EntityService`, the HTTP side of the server (query, world maps)
//! - The `Tracker` seam to the AR tracking runtime

pub mod channel;
pub mod config;
pub mod relocalizer;
pub mod repository;
pub mod service;
pub mod table;
pub mod tracker;

pub use channel::*;
pub use config::*;
pub use relocalizer::*;
pub use repository::*;
pub use service::*;
pub use table::*;
pub use tracker::*;
