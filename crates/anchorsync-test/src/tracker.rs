//! Simulated AR tracker
//!
//! A device moving through its own tracking space (x east, y up, z south)
//! with an optional geodetic fix. Anchors are placed with seeded jitter so
//! that runs are reproducible.

use async_trait::async_trait;
use bytes::Bytes;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use anchorsync_client::{Feature, Frame, Tracker};
use anchorsync_core::{AnchorHandle, GeoPoint, SyncError, SyncResult, Timestamp, Transform, Vector3};

/// Distance from the device to whatever the view centre hits (metres)
pub const DEFAULT_REACH_M: f64 = 2.0;

#[derive(Clone, Debug)]
struct SimulatedAnchor {
    handle: AnchorHandle,
    uid: String,
    translation: Vector3,
}

/// Anchor as written into a world map
#[derive(Serialize, Deserialize)]
struct SavedAnchor {
    uid: String,
    translation: Vector3,
}

/// Deterministic stand-in for a device tracking runtime
pub struct SimulatedTracker {
    rng: StdRng,
    jitter_m: f64,
    reach_m: f64,
    position: Vector3,
    gps: Option<GeoPoint>,
    next_handle: u64,
    anchors: Vec<SimulatedAnchor>,
    maps_loaded: usize,
}

impl SimulatedTracker {
    pub fn new(seed: u64) -> Self {
        SimulatedTracker {
            rng: StdRng::seed_from_u64(seed),
            jitter_m: 0.0,
            reach_m: DEFAULT_REACH_M,
            position: Vector3::ZERO,
            gps: None,
            next_handle: 1,
            anchors: Vec::new(),
            maps_loaded: 0,
        }
    }

    pub fn with_gps(mut self, gps: GeoPoint) -> Self {
        self.gps = Some(gps);
        self
    }

    /// Uniform placement noise of up to `jitter_m` per axis
    pub fn with_jitter(mut self, jitter_m: f64) -> Self {
        self.jitter_m = jitter_m;
        self
    }

    pub fn with_reach(mut self, reach_m: f64) -> Self {
        self.reach_m = reach_m;
        self
    }

    #[inline]
    pub fn position(&self) -> Vector3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vector3) {
        self.position = position;
    }

    pub fn walk(&mut self, delta: Vector3) {
        self.position = self.position.add(&delta);
    }

    pub fn gps(&self) -> Option<GeoPoint> {
        self.gps
    }

    pub fn set_gps(&mut self, gps: Option<GeoPoint>) {
        self.gps = gps;
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    pub fn anchor_uids(&self) -> Vec<&str> {
        self.anchors.iter().map(|a| a.uid.as_str()).collect()
    }

    pub fn anchor_translation(&self, uid: &str) -> Option<Vector3> {
        self.anchors
            .iter()
            .find(|a| a.uid == uid)
            .map(|a| a.translation)
    }

    pub fn maps_loaded(&self) -> usize {
        self.maps_loaded
    }

    /// Everything the tracker reports for one frame
    pub fn frame(&self, timestamp: Timestamp) -> Frame {
        let mut frame = Frame::new(timestamp);
        frame.gps = self.gps;
        for anchor in &self.anchors {
            frame.set_anchor(anchor.handle, Transform::from_translation(anchor.translation));
        }
        frame
    }

    fn noise(&mut self) -> Vector3 {
        if self.jitter_m <= 0.0 {
            return Vector3::ZERO;
        }
        let dist = Uniform::new_inclusive(-self.jitter_m, self.jitter_m);
        Vector3::new(
            dist.sample(&mut self.rng),
            dist.sample(&mut self.rng),
            dist.sample(&mut self.rng),
        )
    }

    fn add_anchor(&mut self, uid: String, translation: Vector3) -> AnchorHandle {
        let handle = AnchorHandle(self.next_handle);
        self.next_handle += 1;
        self.anchors.push(SimulatedAnchor {
            handle,
            uid,
            translation,
        });
        handle
    }

    fn place(&mut self, at: Vector3, gps: Option<GeoPoint>) -> Feature {
        let translation = at.add(&self.noise());
        let uid = format!("{:016X}", self.rng.gen::<u64>());
        let anchor = self.add_anchor(uid.clone(), translation);
        tracing::trace!(%uid, ?translation, "simulated anchor placed");
        Feature {
            anchor,
            anchor_uid: uid,
            transform: Transform::from_translation(translation),
            orientation: None,
            gps,
        }
    }
}

#[async_trait]
impl Tracker for SimulatedTracker {
    async fn anchor_at_fix(&mut self, frame: &Frame) -> SyncResult<Feature> {
        let gps = frame
            .gps
            .ok_or_else(|| SyncError::Tracking("no geodetic fix this frame".into()))?;
        Ok(self.place(self.position, Some(gps)))
    }

    async fn anchor_at_intersection(&mut self, _frame: &Frame, x: f64, y: f64) -> SyncResult<Feature> {
        // Looking north, which is -z
        let hit = self.position.add(&Vector3::new(
            (x - 0.5) * self.reach_m,
            (0.5 - y) * self.reach_m,
            -self.reach_m,
        ));
        Ok(self.place(hit, None))
    }

    async fn anchor_at_pose(&mut self, frame: &Frame) -> SyncResult<Feature> {
        Ok(self.place(self.position, frame.gps))
    }

    fn remove_anchor(&mut self, anchor_uid: &str) {
        self.anchors.retain(|a| a.uid != anchor_uid);
    }

    async fn world_map(&mut self) -> SyncResult<Bytes> {
        if self.anchors.is_empty() {
            return Err(SyncError::Tracking("world map has no anchors yet".into()));
        }
        let saved: Vec<SavedAnchor> = self
            .anchors
            .iter()
            .map(|a| SavedAnchor {
                uid: a.uid.clone(),
                translation: a.translation,
            })
            .collect();
        Ok(Bytes::from(serde_json::to_vec(&saved)?))
    }

    async fn load_world_map(&mut self, data: Bytes) -> SyncResult<()> {
        let saved: Vec<SavedAnchor> = serde_json::from_slice(&data)?;
        for anchor in saved {
            if self.anchor_translation(&anchor.uid).is_none() {
                self.add_anchor(anchor.uid, anchor.translation);
            }
        }
        self.maps_loaded += 1;
        Ok(())
    }
}
