//! Tracking-space pose data
//!
//! Poses are owned by the tracking runtime of the client that created the
//! anchor. Axes follow the gravity-and-heading convention: x points east,
//! y points up, z points south. Matrices are column-major with the
//! translation in elements 12..15.

use serde::{Deserialize, Serialize};

/// Vector in tracking space (metres)
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vector3 { x, y, z }
    }

    pub fn sub(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn add(&self, other: &Vector3) -> Vector3 {
        Vector3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

/// Orientation quaternion
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    pub fn identity() -> Self {
        Quaternion {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// 4x4 column-major rigid transform
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transform(pub [f64; 16]);

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        Transform(m)
    }

    pub fn from_translation(t: Vector3) -> Self {
        Self::identity().with_translation(t)
    }

    #[inline]
    pub fn translation(&self) -> Vector3 {
        Vector3::new(self.0[12], self.0[13], self.0[14])
    }

    /// Same rotation, new translation
    pub fn with_translation(mut self, t: Vector3) -> Self {
        self.0[12] = t.x;
        self.0[13] = t.y;
        self.0[14] = t.z;
        self
    }
}
