//! Anchor relocalization
//!
//! Converts tracking-space anchor poses into geocentric (ECEF) positions
//! using a single reference gps entity, and converts remote geocentric
//! positions back into local tracking space.
//!
//! Tracking space: x east, y up, z south. A tracking delta (dx, dy, dz)
//! is therefore the ENU offset (dx, -dz, dy).

use anchorsync_core::{
    Cartesian3, EntityKind, EntityRecord, EnuFrame, EnuOffset, GeoPoint, Vector3,
};

use crate::Frame;

/// Why an entity is or is not relocalized after a pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relocalization {
    /// Derived from the reference entity's pose
    Relative,
    /// Derived from the entity's own geodetic fix (gps entities only)
    Absolute,
    /// Remote entity placed into local tracking space
    Inverse,
    /// Has an anchor, but the tracker did not report it this frame
    Untracked,
    /// Needs a reference entity that is not available yet
    NoReference,
    /// A gps entity without a fix
    NoGeodeticFix,
    /// Neither an anchor nor a geocentric position
    Unanchored,
}

impl Relocalization {
    #[inline]
    pub fn is_relocalized(self) -> bool {
        matches!(
            self,
            Relocalization::Relative | Relocalization::Absolute | Relocalization::Inverse
        )
    }
}

/// Geometry of a relocalized reference entity
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceFrame {
    enu: EnuFrame,
    translation: Vector3,
}

impl ReferenceFrame {
    /// Usable only once the reference is relocalized and has both a
    /// geocentric position and a local pose
    pub fn of(reference: &EntityRecord) -> Option<Self> {
        if !reference.relocalized {
            return None;
        }
        Some(ReferenceFrame {
            enu: EnuFrame::at(reference.cartesian?),
            translation: reference.local_translation()?,
        })
    }

    /// Tracking-space position -> ECEF
    pub fn to_ecef(&self, translation: Vector3) -> Cartesian3 {
        let d = translation.sub(&self.translation);
        self.enu.to_ecef(EnuOffset::new(d.x, -d.z, d.y))
    }

    /// ECEF -> tracking-space position
    pub fn to_local(&self, point: &Cartesian3) -> Vector3 {
        let offset = self.enu.to_local(point);
        self.translation
            .add(&Vector3::new(offset.east, offset.up, -offset.north))
    }
}

/// Per-frame relocalization policy
#[derive(Clone, Copy, Debug, Default)]
pub struct AnchorRelocalizer;

impl AnchorRelocalizer {
    pub fn new() -> Self {
        AnchorRelocalizer
    }

    /// Relocalize `entity` against an optional reference entity
    pub fn relocalize(
        &self,
        frame: &Frame,
        entity: &mut EntityRecord,
        reference: Option<&EntityRecord>,
    ) -> Relocalization {
        let reference = reference.and_then(ReferenceFrame::of);
        self.relocalize_with(frame, entity, reference.as_ref())
    }

    /// Relocalize `entity` against precomputed reference geometry.
    ///
    /// Updates `transform`, `translation`, `cartesian` and `relocalized`
    /// in place. Fills `gps` from the derived position when the entity
    /// has none.
    pub fn relocalize_with(
        &self,
        frame: &Frame,
        entity: &mut EntityRecord,
        reference: Option<&ReferenceFrame>,
    ) -> Relocalization {
        let pose = entity
            .local
            .anchor
            .and_then(|anchor| frame.anchor_pose(anchor))
            .copied();
        if let Some(pose) = pose {
            entity.transform = Some(pose);
            entity.translation = Some(pose.translation());
        }

        let outcome = match (reference, pose) {
            (Some(reference), Some(pose)) => {
                entity.cartesian = Some(reference.to_ecef(pose.translation()));
                Relocalization::Relative
            }
            (None, Some(_)) => match entity.kind {
                EntityKind::Gps => match entity.gps {
                    Some(gps) => {
                        entity.cartesian = Some(gps.to_ecef());
                        Relocalization::Absolute
                    }
                    None => Relocalization::NoGeodeticFix,
                },
                EntityKind::Content | EntityKind::Party | EntityKind::Map => {
                    Relocalization::NoReference
                }
            },
            (_, None) if entity.has_local_anchor() => Relocalization::Untracked,
            (Some(reference), None) => match entity.cartesian {
                Some(cartesian) => {
                    let local = reference.to_local(&cartesian);
                    entity.transform =
                        Some(entity.transform.unwrap_or_default().with_translation(local));
                    entity.translation = Some(local);
                    Relocalization::Inverse
                }
                None => Relocalization::Unanchored,
            },
            (None, None) if entity.has_cartesian() => Relocalization::NoReference,
            (None, None) => Relocalization::Unanchored,
        };

        entity.relocalized = outcome.is_relocalized();
        if entity.relocalized && entity.gps.is_none() {
            entity.gps = entity.cartesian.map(|c| GeoPoint::from_ecef(&c));
        }

        outcome
    }
}
