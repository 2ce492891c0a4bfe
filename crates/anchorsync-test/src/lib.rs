//! anchorsync Test Harness - simulated devices and end-to-end scenarios
//!
//! This crate provides:
//! - `SimulatedTracker`, a seeded stand-in for a device tracking runtime
//! - `InProcessService`, a client service backed directly by a `SyncHub`
//! - `SimulatedClient`, a repository driven frame by frame
//! - End-to-end scenarios, in process and over real sockets

pub mod integration;
pub mod service;
pub mod tracker;

pub use integration::*;
pub use service::*;
pub use tracker::*;
