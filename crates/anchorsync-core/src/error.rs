//! Error types for anchorsync
//!
//! Nothing here is fatal. Tracking failures and unmet preconditions are
//! retried naturally on the next frame; transport failures degrade the
//! client to local-only operation.

use thiserror::Error;

use crate::{EntityKind, EntityUuid};

/// Core anchorsync errors
#[derive(Error, Debug)]
pub enum SyncError {
    // Tracking errors
    #[error("Tracking failure: {0}")]
    Tracking(String),

    // Precondition errors
    #[error("No geodetic fix available yet")]
    NoGeodeticFix,

    #[error("No reference gps entity yet")]
    NoReference,

    #[error("Entity {0} has no cartesian position")]
    NoCartesian(EntityUuid),

    #[error("Entity not found: {0}")]
    UnknownEntity(EntityUuid),

    #[error("Entities of kind {0} cannot be created here")]
    UnsupportedKind(EntityKind),

    // Transport errors
    #[error("Transport unavailable: channel not connected")]
    TransportUnavailable,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Frame too large: {actual} > {max}")]
    FrameTooLarge { actual: usize, max: usize },

    #[error("HTTP error: {0}")]
    Http(String),

    // Storage and codec errors
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Errors that the next frame may resolve on its own
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Tracking(_)
                | SyncError::NoGeodeticFix
                | SyncError::NoReference
                | SyncError::NoCartesian(_)
                | SyncError::TransportUnavailable
        )
    }
}

/// Result type for anchorsync operations
pub type SyncResult<T> = Result<T, SyncError>;
