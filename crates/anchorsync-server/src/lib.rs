//! anchorsync Server - the shared entity authority
//!
//! This crate provides:
//! - `SyncHub`, the real-time channel fan-out around a `ServerEntityStore`
//! - The HTTP API (entity query, world map upload and download)
//! - `ServerConfig` and the `Server` that binds both listeners

pub mod config;
pub mod http;
pub mod hub;
pub mod server;

pub use config::*;
pub use http::*;
pub use hub::*;
pub use server::*;
