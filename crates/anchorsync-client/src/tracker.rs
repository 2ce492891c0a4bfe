//! Seam to the AR tracking runtime
//!
//! The runtime owns anchors and reports their poses once per frame. It is
//! the only source of tracking-space geometry; everything geocentric is
//! derived from it by the relocalizer.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use anchorsync_core::{AnchorHandle, GeoPoint, Quaternion, SyncResult, Timestamp, Transform};

/// View-space point used when placing content (center of the view)
pub const VIEW_CENTER: (f64, f64) = (0.5, 0.5);

/// One tracking frame: the device fix and every tracked anchor's pose
#[derive(Clone, Debug, Default)]
pub struct Frame {
    pub timestamp: Timestamp,
    pub gps: Option<GeoPoint>,
    anchors: HashMap<AnchorHandle, Transform>,
}

impl Frame {
    pub fn new(timestamp: Timestamp) -> Self {
        Frame {
            timestamp,
            ..Default::default()
        }
    }

    pub fn with_gps(mut self, gps: GeoPoint) -> Self {
        self.gps = Some(gps);
        self
    }

    pub fn with_anchor(mut self, anchor: AnchorHandle, pose: Transform) -> Self {
        self.anchors.insert(anchor, pose);
        self
    }

    pub fn set_anchor(&mut self, anchor: AnchorHandle, pose: Transform) {
        self.anchors.insert(anchor, pose);
    }

    /// Pose of `anchor` this frame, if it is being tracked
    #[inline]
    pub fn anchor_pose(&self, anchor: AnchorHandle) -> Option<&Transform> {
        self.anchors.get(&anchor)
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }
}

/// A freshly created anchor
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub anchor: AnchorHandle,
    /// Runtime-assigned anchor id; the last part of the entity uuid
    pub anchor_uid: String,
    pub transform: Transform,
    pub orientation: Option<Quaternion>,
    /// Device fix at creation time, when the runtime has one
    pub gps: Option<GeoPoint>,
}

/// AR tracking runtime
#[async_trait]
pub trait Tracker: Send {
    /// Anchor at the device's current geodetic fix
    async fn anchor_at_fix(&mut self, frame: &Frame) -> SyncResult<Feature>;

    /// Anchor where a ray through view point (x, y) meets the world
    async fn anchor_at_intersection(&mut self, frame: &Frame, x: f64, y: f64)
        -> SyncResult<Feature>;

    /// Anchor at the device pose
    async fn anchor_at_pose(&mut self, frame: &Frame) -> SyncResult<Feature>;

    /// Release an anchor; unknown ids are ignored
    fn remove_anchor(&mut self, anchor_uid: &str);

    /// Serialized world reconstruction
    async fn world_map(&mut self) -> SyncResult<Bytes>;

    /// Replace the world reconstruction; previously saved anchors reappear
    /// in later frames
    async fn load_world_map(&mut self, data: Bytes) -> SyncResult<()>;
}
