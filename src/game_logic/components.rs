use bevy::prelude::*;

/// Transform and velocity of the simulated capsule. Y is up, the capsule
/// faces -Z when its rotation is the identity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Kinematics {
    pub location: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
}

impl Default for Kinematics {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
        }
    }
}

impl Kinematics {
    pub fn at(location: Vec3) -> Self {
        Self {
            location,
            ..Default::default()
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn horizontal_speed(&self) -> f32 {
        horizontal(self.velocity).length()
    }

    /// Current heading around the up axis, in radians.
    pub fn yaw(&self) -> f32 {
        let forward = self.forward();
        f32::atan2(-forward.x, -forward.z)
    }

    /// Snap the heading to face `direction` projected onto the ground plane.
    /// A direction with no planar component leaves the rotation untouched.
    pub fn face(&mut self, direction: Vec3) {
        if let Some(yaw) = planar_yaw(direction) {
            self.rotation = Quat::from_rotation_y(yaw);
        }
    }
}

/// Opaque handle to the surface a grounded character stands on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MovementBase(pub u32);

pub fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

pub fn safe_normal_2d(v: Vec3) -> Vec3 {
    horizontal(v).normalize_or_zero()
}

pub fn planar_yaw(direction: Vec3) -> Option<f32> {
    let planar = safe_normal_2d(direction);
    if planar == Vec3::ZERO {
        return None;
    }
    Some(f32::atan2(-planar.x, -planar.z))
}

/// Wrap an angle into [-PI, PI].
pub fn wrap_angle(angle: f32) -> f32 {
    let tau = std::f32::consts::TAU;
    (angle + std::f32::consts::PI).rem_euclid(tau) - std::f32::consts::PI
}

/// Linear remap of `value` from `input` to `output`, clamped to the output range.
pub fn map_range_clamped(value: f32, input: (f32, f32), output: (f32, f32)) -> f32 {
    let span = input.1 - input.0;
    if span.abs() <= f32::EPSILON {
        return output.0;
    }
    let alpha = ((value - input.0) / span).clamp(0.0, 1.0);
    output.0 + (output.1 - output.0) * alpha
}
