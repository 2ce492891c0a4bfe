//! anchorsync Transport Layer - the real-time channel
//!
//! This crate provides:
//! - `ChannelHandle`, a typed bidirectional message channel with a
//!   closable subscription
//! - Framed TCP connections and a listener
//! - In-memory channel pairs for tests and embedding

pub mod channel;
pub mod tcp;

pub use channel::*;
pub use tcp::*;
