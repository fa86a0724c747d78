use bevy::prelude::*;

/// Shape swept by a world query. Capsules are always upright.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProbeShape {
    Line,
    Sphere { radius: f32 },
    Capsule { radius: f32, half_height: f32 },
}

impl ProbeShape {
    /// Distance from the shape's center to its surface along `axis` (unit length).
    pub fn support(&self, axis: Vec3) -> f32 {
        match *self {
            ProbeShape::Line => 0.0,
            ProbeShape::Sphere { radius } => radius,
            ProbeShape::Capsule {
                radius,
                half_height,
            } => radius + (half_height - radius).max(0.0) * axis.y.abs(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitResult {
    /// Center of the swept shape at the moment of contact.
    pub location: Vec3,
    pub impact_point: Vec3,
    /// Surface normal facing the side the sweep started on.
    pub normal: Vec3,
    /// Fraction of the sweep travelled before contact.
    pub time: f32,
    pub distance: f32,
    /// Depth of overlap when the sweep started inside the surface, zero otherwise.
    pub penetration: f32,
    pub surface: u32,
}

impl HitResult {
    pub fn start_penetrating(&self) -> bool {
        self.penetration > 0.0
    }
}

/// Geometry queries the movement code runs against. Implementations must
/// answer identically for identical arguments so replays stay deterministic.
pub trait WorldProbe {
    fn trace(&self, from: Vec3, to: Vec3, shape: ProbeShape) -> Option<HitResult>;

    fn overlaps(&self, at: Vec3, shape: ProbeShape) -> bool {
        self.trace(at, at, shape).is_some()
    }
}

/// A world with nothing in it. Every query misses.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoWorld;

impl WorldProbe for NoWorld {
    fn trace(&self, _from: Vec3, _to: Vec3, _shape: ProbeShape) -> Option<HitResult> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capsule_support() {
        let capsule = ProbeShape::Capsule {
            radius: 34.0,
            half_height: 88.0,
        };
        assert_eq!(capsule.support(Vec3::Y), 88.0);
        assert_eq!(capsule.support(Vec3::X), 34.0);
        assert_eq!(ProbeShape::Line.support(Vec3::Y), 0.0);
        assert_eq!(ProbeShape::Sphere { radius: 5.0 }.support(Vec3::Z), 5.0);
    }

    #[test]
    fn test_no_world_never_hits() {
        let world = NoWorld;
        assert!(world.trace(Vec3::ZERO, Vec3::NEG_Y * 100.0, ProbeShape::Line).is_none());
        assert!(!world.overlaps(Vec3::ZERO, ProbeShape::Sphere { radius: 10.0 }));
    }
}
