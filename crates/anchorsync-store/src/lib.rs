//! anchorsync Store - The server-side authority
//!
//! This crate implements the authoritative entity table:
//! - Keyed upsert with server timestamps
//! - First-party admin promotion
//! - Conjunctive field queries with a proximity operator
//! - Presence tracking for live connections

pub mod filter;
pub mod presence;
pub mod store;

pub use filter::*;
pub use presence::*;
pub use store::*;
