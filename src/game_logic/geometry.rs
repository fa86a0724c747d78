use bevy::prelude::*;

use crate::game_logic::{HitResult, KINDA_SMALL_NUMBER, ProbeShape, WorldProbe};

/// A flat rectangle in the world. Queries treat it as two-sided.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfacePatch {
    pub id: u32,
    pub center: Vec3,
    pub normal: Vec3,
    pub u_axis: Vec3,
    pub v_axis: Vec3,
    pub half_u: f32,
    pub half_v: f32,
}

impl SurfacePatch {
    pub fn new(id: u32, center: Vec3, normal: Vec3, u_axis: Vec3, half_u: f32, half_v: f32) -> Self {
        let normal = normal.normalize();
        let u_axis = (u_axis - normal * u_axis.dot(normal)).normalize();
        let v_axis = normal.cross(u_axis);
        Self {
            id,
            center,
            normal,
            u_axis,
            v_axis,
            half_u,
            half_v,
        }
    }

    /// Horizontal rectangle facing up.
    pub fn floor(id: u32, center: Vec3, half_x: f32, half_z: f32) -> Self {
        Self::new(id, center, Vec3::Y, Vec3::X, half_x, half_z)
    }

    /// Rectangle whose `v` axis runs up the face. `normal` may lean away from vertical.
    pub fn wall(id: u32, center: Vec3, normal: Vec3, half_width: f32, half_height: f32) -> Self {
        let u_axis = Vec3::Y.cross(normal);
        Self::new(id, center, normal, u_axis, half_width, half_height)
    }

    fn contains(&self, point: Vec3, shape: ProbeShape) -> bool {
        let rel = point - self.center;
        rel.dot(self.u_axis).abs() <= self.half_u + shape.support(self.u_axis)
            && rel.dot(self.v_axis).abs() <= self.half_v + shape.support(self.v_axis)
    }

    fn sweep(&self, from: Vec3, to: Vec3, shape: ProbeShape) -> Option<HitResult> {
        let delta = to - from;
        let length = delta.length();
        let offset = shape.support(self.normal);
        let d0 = (from - self.center).dot(self.normal);
        let d1 = (to - self.center).dot(self.normal);
        let (normal, s0, s1) = if d0 >= 0.0 {
            (self.normal, d0, d1)
        } else {
            (-self.normal, -d0, -d1)
        };

        if s0 < offset {
            if !self.contains(from, shape) {
                return None;
            }
            // Already overlapping: only block motion that digs further in.
            let approaching = delta.dot(normal) < 0.0;
            if length > KINDA_SMALL_NUMBER && !approaching {
                return None;
            }
            return Some(HitResult {
                location: from,
                impact_point: from - normal * s0,
                normal,
                time: 0.0,
                distance: 0.0,
                penetration: offset - s0,
                surface: self.id,
            });
        }

        if s1 >= offset {
            return None;
        }

        let time = (s0 - offset) / (s0 - s1);
        let location = from + delta * time;
        if !self.contains(location, shape) {
            return None;
        }

        Some(HitResult {
            location,
            impact_point: location - normal * offset,
            normal,
            time,
            distance: length * time,
            penetration: 0.0,
            surface: self.id,
        })
    }
}

/// Fixed level geometry made of planar patches.
#[derive(Resource, Clone, Debug, Default, PartialEq)]
pub struct StaticGeometry {
    patches: Vec<SurfacePatch>,
}

impl StaticGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patch(mut self, patch: SurfacePatch) -> Self {
        self.patches.push(patch);
        self
    }

    pub fn push(&mut self, patch: SurfacePatch) {
        self.patches.push(patch);
    }

    pub fn patches(&self) -> &[SurfacePatch] {
        &self.patches
    }

    /// Open test level: a large floor, a ledge to mantle, a wall to run
    /// along, and a tall wall to climb.
    pub fn proving_ground() -> Self {
        let floor = SurfacePatch::floor(1, Vec3::ZERO, 5000.0, 5000.0);
        let ledge_front = SurfacePatch::wall(2, Vec3::new(0.0, 60.0, -800.0), Vec3::Z, 300.0, 60.0);
        let ledge_top = SurfacePatch::floor(3, Vec3::new(0.0, 120.0, -1000.0), 300.0, 200.0);
        let run_wall = SurfacePatch::wall(4, Vec3::new(600.0, 250.0, -400.0), Vec3::NEG_X, 800.0, 250.0);
        let climb_wall = SurfacePatch::wall(5, Vec3::new(-600.0, 400.0, -400.0), Vec3::X, 300.0, 400.0);
        Self::new()
            .with_patch(floor)
            .with_patch(ledge_front)
            .with_patch(ledge_top)
            .with_patch(run_wall)
            .with_patch(climb_wall)
    }
}

impl WorldProbe for StaticGeometry {
    fn trace(&self, from: Vec3, to: Vec3, shape: ProbeShape) -> Option<HitResult> {
        let mut best: Option<HitResult> = None;
        for patch in &self.patches {
            if let Some(hit) = patch.sweep(from, to, shape) {
                let closer = best.is_none_or(|current| hit.time < current.time);
                if closer {
                    best = Some(hit);
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capsule() -> ProbeShape {
        ProbeShape::Capsule {
            radius: 34.0,
            half_height: 88.0,
        }
    }

    #[test]
    fn test_capsule_lands_on_floor() {
        let world = StaticGeometry::new().with_patch(SurfacePatch::floor(7, Vec3::ZERO, 500.0, 500.0));
        let hit = world
            .trace(Vec3::new(0.0, 200.0, 0.0), Vec3::new(0.0, 0.0, 0.0), capsule())
            .expect("floor below");
        assert_eq!(hit.surface, 7);
        assert!((hit.location.y - 88.0).abs() < 1e-3);
        assert!((hit.normal - Vec3::Y).length() < 1e-6);
        assert!(!hit.start_penetrating());
    }

    #[test]
    fn test_line_misses_outside_patch() {
        let world = StaticGeometry::new().with_patch(SurfacePatch::floor(1, Vec3::ZERO, 10.0, 10.0));
        assert!(world
            .trace(Vec3::new(50.0, 10.0, 0.0), Vec3::new(50.0, -10.0, 0.0), ProbeShape::Line)
            .is_none());
    }

    #[test]
    fn test_wall_normal_faces_sweep_origin() {
        let wall = SurfacePatch::wall(2, Vec3::new(0.0, 100.0, -100.0), Vec3::Z, 100.0, 100.0);
        let world = StaticGeometry::new().with_patch(wall);
        let hit = world
            .trace(Vec3::new(0.0, 100.0, -300.0), Vec3::new(0.0, 100.0, 0.0), ProbeShape::Line)
            .expect("wall between");
        assert!((hit.normal - Vec3::NEG_Z).length() < 1e-6);
        assert!((hit.location.z + 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_overlap_and_moving_away() {
        let world = StaticGeometry::new().with_patch(SurfacePatch::floor(1, Vec3::ZERO, 500.0, 500.0));
        let sunk = Vec3::new(0.0, 80.0, 0.0);
        assert!(world.overlaps(sunk, capsule()));
        assert!(!world.overlaps(Vec3::new(0.0, 90.0, 0.0), capsule()));

        // Leaving an overlap is never blocked
        assert!(world.trace(sunk, sunk + Vec3::Y * 20.0, capsule()).is_none());
        let into = world.trace(sunk, sunk - Vec3::Y * 5.0, capsule()).expect("digging in");
        assert!(into.start_penetrating());
        assert!((into.penetration - 8.0).abs() < 1e-3);
    }

    #[test]
    fn test_nearest_hit_wins() {
        let world = StaticGeometry::new()
            .with_patch(SurfacePatch::floor(1, Vec3::ZERO, 500.0, 500.0))
            .with_patch(SurfacePatch::floor(2, Vec3::new(0.0, 50.0, 0.0), 500.0, 500.0));
        let hit = world
            .trace(Vec3::new(0.0, 100.0, 0.0), Vec3::new(0.0, -100.0, 0.0), ProbeShape::Line)
            .expect("two floors");
        assert_eq!(hit.surface, 2);
    }
}
