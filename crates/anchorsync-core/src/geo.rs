//! Geodetic primitives
//!
//! - `GeoPoint`: latitude/longitude in degrees, altitude in metres
//! - `Cartesian3`: earth-centred earth-fixed (ECEF) coordinate in metres
//! - `haversine_km`: great-circle distance on a spherical earth
//! - `EnuFrame`: local east-north-up frame anchored at an ECEF point
//!
//! Distances use the spherical haversine model (radius 6371 km). ECEF
//! conversion uses the WGS84 ellipsoid.

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Mean earth radius used by the haversine distance
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Radius inside which entities and connections count as nearby
pub const NEARBY_RADIUS_KM: f64 = 1.0;

/// WGS84 semi-major axis (metres)
pub const WGS84_A: f64 = 6_378_137.0;

/// WGS84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// WGS84 first eccentricity squared
const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);

/// Geodetic coordinate
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
    /// Horizontal accuracy reported by the positioning source (metres)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        GeoPoint {
            latitude,
            longitude,
            altitude,
            accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Great-circle distance to another point in kilometres
    #[inline]
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self, other)
    }

    /// Absolute ECEF position of this point
    pub fn to_ecef(&self) -> Cartesian3 {
        let lat = self.latitude.to_radians();
        let lon = self.longitude.to_radians();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();

        let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        let h = self.altitude;

        Cartesian3 {
            x: (n + h) * cos_lat * cos_lon,
            y: (n + h) * cos_lat * sin_lon,
            z: (n * (1.0 - WGS84_E2) + h) * sin_lat,
        }
    }

    /// Recover the geodetic coordinate of an ECEF position
    pub fn from_ecef(p: &Cartesian3) -> GeoPoint {
        let lon = p.y.atan2(p.x);
        let horizontal = (p.x * p.x + p.y * p.y).sqrt();

        if horizontal < 1e-9 {
            // On the polar axis
            let latitude = if p.z >= 0.0 { 90.0 } else { -90.0 };
            let b = WGS84_A * (1.0 - WGS84_F);
            return GeoPoint::new(latitude, 0.0, p.z.abs() - b);
        }

        let mut lat = p.z.atan2(horizontal * (1.0 - WGS84_E2));
        let mut alt = 0.0;
        for _ in 0..6 {
            let sin_lat = lat.sin();
            let n = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
            alt = horizontal / lat.cos() - n;
            lat = p.z.atan2(horizontal * (1.0 - WGS84_E2 * n / (n + alt)));
        }

        GeoPoint::new(lat.to_degrees(), lon.to_degrees(), alt)
    }
}

/// Haversine distance between two geodetic points in kilometres
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Proximity predicate over geodetic points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceFilter {
    pub radius_km: f64,
}

impl DistanceFilter {
    pub fn new(radius_km: f64) -> Self {
        DistanceFilter { radius_km }
    }

    /// Query semantics: a candidate is rejected only when `dist > radius`
    #[inline]
    pub fn accepts_distance(&self, distance_km: f64) -> bool {
        distance_km <= self.radius_km
    }

    pub fn accepts(&self, origin: &GeoPoint, candidate: &GeoPoint) -> bool {
        self.accepts_distance(haversine_km(origin, candidate))
    }

    /// Presence semantics: strictly inside the radius
    pub fn strictly_within(&self, a: &GeoPoint, b: &GeoPoint) -> bool {
        haversine_km(a, b) < self.radius_km
    }
}

impl Default for DistanceFilter {
    fn default() -> Self {
        DistanceFilter::new(NEARBY_RADIUS_KM)
    }
}

/// ECEF coordinate (metres)
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Cartesian3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Cartesian3 {
    pub const ZERO: Cartesian3 = Cartesian3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Cartesian3 { x, y, z }
    }

    #[inline]
    pub fn dot(&self, other: &Cartesian3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn scale(&self, k: f64) -> Cartesian3 {
        Cartesian3::new(self.x * k, self.y * k, self.z * k)
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(&self, other: &Cartesian3) -> f64 {
        (*self - *other).length()
    }
}

impl Add for Cartesian3 {
    type Output = Cartesian3;

    fn add(self, rhs: Cartesian3) -> Cartesian3 {
        Cartesian3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Cartesian3 {
    type Output = Cartesian3;

    fn sub(self, rhs: Cartesian3) -> Cartesian3 {
        Cartesian3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Local east-north-up frame fixed at an ECEF origin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EnuFrame {
    origin: Cartesian3,
    east: Cartesian3,
    north: Cartesian3,
    up: Cartesian3,
}

/// Offset in an east-north-up frame (metres)
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct EnuOffset {
    pub east: f64,
    pub north: f64,
    pub up: f64,
}

impl EnuOffset {
    pub fn new(east: f64, north: f64, up: f64) -> Self {
        EnuOffset { east, north, up }
    }
}

impl EnuFrame {
    /// Frame at an ECEF origin (the geodetic position is recovered from it)
    pub fn at(origin: Cartesian3) -> Self {
        let geo = GeoPoint::from_ecef(&origin);
        let (sin_lat, cos_lat) = geo.latitude.to_radians().sin_cos();
        let (sin_lon, cos_lon) = geo.longitude.to_radians().sin_cos();

        EnuFrame {
            origin,
            east: Cartesian3::new(-sin_lon, cos_lon, 0.0),
            north: Cartesian3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat),
            up: Cartesian3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat),
        }
    }

    #[inline]
    pub fn origin(&self) -> Cartesian3 {
        self.origin
    }

    /// Local offset -> absolute ECEF
    pub fn to_ecef(&self, offset: EnuOffset) -> Cartesian3 {
        self.origin
            + self.east.scale(offset.east)
            + self.north.scale(offset.north)
            + self.up.scale(offset.up)
    }

    /// Absolute ECEF -> local offset
    pub fn to_local(&self, point: &Cartesian3) -> EnuOffset {
        let d = *point - self.origin;
        EnuOffset {
            east: d.dot(&self.east),
            north: d.dot(&self.north),
            up: d.dot(&self.up),
        }
    }
}
