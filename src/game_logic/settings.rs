use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read movement settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid movement settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// How the authoritative side treats a dash landing exactly on its cooldown.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CooldownBoundary {
    #[default]
    Inclusive,
    Exclusive,
}

impl CooldownBoundary {
    pub fn permits(self, elapsed: f64, cooldown: f64) -> bool {
        match self {
            CooldownBoundary::Inclusive => elapsed >= cooldown,
            CooldownBoundary::Exclusive => elapsed > cooldown,
        }
    }
}

/// Piecewise linear curve, clamped at both ends. Keys are (x, y) sorted by x.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GravityScaleCurve {
    pub keys: Vec<(f32, f32)>,
}

impl Default for GravityScaleCurve {
    fn default() -> Self {
        Self {
            keys: vec![(-1.0, 1.0), (0.0, 0.6), (1.0, 0.0)],
        }
    }
}

impl GravityScaleCurve {
    pub fn evaluate(&self, x: f32) -> f32 {
        let Some(&(first_x, first_y)) = self.keys.first() else {
            return 1.0;
        };
        if x <= first_x {
            return first_y;
        }
        for pair in self.keys.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if x <= b.0 {
                let span = b.0 - a.0;
                if span <= f32::EPSILON {
                    return b.1;
                }
                return a.1 + (b.1 - a.1) * (x - a.0) / span;
            }
        }
        self.keys.last().map_or(1.0, |key| key.1)
    }
}

/// Every tunable of the locomotion simulation. Client and server must run
/// with identical values. Distances are cm, times are seconds, angles degrees.
#[derive(Resource, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MovementSettings {
    // Capsule
    pub capsule_radius: f32,
    pub capsule_half_height: f32,
    pub crouched_half_height: f32,

    // Base walk / fall / fly
    pub max_walk_speed: f32,
    pub max_walk_speed_crouched: f32,
    pub max_fly_speed: f32,
    pub max_acceleration: f32,
    pub braking_deceleration_walking: f32,
    pub braking_deceleration_falling: f32,
    pub braking_deceleration_flying: f32,
    pub braking_friction_factor: f32,
    pub ground_friction: f32,
    pub air_control: f32,
    pub gravity_z: f32,
    pub jump_z_velocity: f32,
    pub max_step_height: f32,
    pub walkable_floor_z: f32,
    pub can_walk_off_ledges: bool,
    pub can_walk_off_ledges_when_crouching: bool,
    pub rotation_rate: f32,

    // Sprint
    pub max_sprint_speed: f32,

    // Slide
    pub can_slide_off_ledges: bool,
    pub min_slide_speed: f32,
    pub max_slide_speed: f32,
    pub slide_enter_impulse: f32,
    pub max_slide_impulse_speed: f32,
    pub slide_gravity_force: f32,
    pub slide_friction_factor: f32,
    pub braking_deceleration_sliding: f32,

    // Prone
    pub prone_enter_hold_duration: f32,
    pub prone_slide_enter_impulse: f32,
    pub max_prone_speed: f32,
    pub braking_deceleration_proning: f32,

    // Dash
    pub dash_cooldown_duration: f32,
    pub auth_dash_cooldown_duration: f32,
    pub dash_cooldown_boundary: CooldownBoundary,
    pub dash_impulse: f32,
    pub dash_burst_duration: f32,
    pub dash_retry_window: f32,

    // Mantle
    pub mantle_max_distance: f32,
    pub mantle_reach_height: f32,
    pub min_mantle_depth: f32,
    pub mantle_min_wall_steepness_angle: f32,
    pub mantle_max_surface_angle: f32,
    pub mantle_max_alignment_angle: f32,
    pub tall_mantle_duration: f32,
    pub short_mantle_duration: f32,

    // Wall run
    pub min_wall_run_speed: f32,
    pub max_wall_run_speed: f32,
    pub max_vertical_wall_run_speed: f32,
    pub wall_run_pull_away_angle: f32,
    pub wall_attraction_force: f32,
    pub min_wall_run_height: f32,
    pub wall_jump_off_force: f32,
    pub wall_run_gravity_scale_curve: GravityScaleCurve,

    // Climb and hang
    pub wall_jump_force: f32,
    pub max_climb_speed: f32,
    pub braking_deceleration_climbing: f32,
    pub climb_reach_distance: f32,
}

impl Default for MovementSettings {
    fn default() -> Self {
        Self {
            capsule_radius: 34.0,
            capsule_half_height: 88.0,
            crouched_half_height: 44.0,

            max_walk_speed: 600.0,
            max_walk_speed_crouched: 300.0,
            max_fly_speed: 600.0,
            max_acceleration: 2048.0,
            braking_deceleration_walking: 2048.0,
            braking_deceleration_falling: 0.0,
            braking_deceleration_flying: 0.0,
            braking_friction_factor: 2.0,
            ground_friction: 8.0,
            air_control: 0.35,
            gravity_z: -980.0,
            jump_z_velocity: 420.0,
            max_step_height: 45.0,
            walkable_floor_z: 0.71,
            can_walk_off_ledges: true,
            can_walk_off_ledges_when_crouching: false,
            rotation_rate: 720.0,

            max_sprint_speed: 750.0,

            can_slide_off_ledges: true,
            min_slide_speed: 400.0,
            max_slide_speed: 400.0,
            slide_enter_impulse: 400.0,
            max_slide_impulse_speed: 700.0,
            slide_gravity_force: 4000.0,
            slide_friction_factor: 0.06,
            braking_deceleration_sliding: 1000.0,

            prone_enter_hold_duration: 0.2,
            prone_slide_enter_impulse: 300.0,
            max_prone_speed: 300.0,
            braking_deceleration_proning: 2500.0,

            dash_cooldown_duration: 1.0,
            auth_dash_cooldown_duration: 0.9,
            dash_cooldown_boundary: CooldownBoundary::Inclusive,
            dash_impulse: 1000.0,
            dash_burst_duration: 0.25,
            dash_retry_window: 1.0,

            mantle_max_distance: 200.0,
            mantle_reach_height: 50.0,
            min_mantle_depth: 30.0,
            mantle_min_wall_steepness_angle: 75.0,
            mantle_max_surface_angle: 40.0,
            mantle_max_alignment_angle: 45.0,
            tall_mantle_duration: 1.0,
            short_mantle_duration: 0.6,

            min_wall_run_speed: 200.0,
            max_wall_run_speed: 800.0,
            max_vertical_wall_run_speed: 200.0,
            wall_run_pull_away_angle: 75.0,
            wall_attraction_force: 200.0,
            min_wall_run_height: 50.0,
            wall_jump_off_force: 300.0,
            wall_run_gravity_scale_curve: GravityScaleCurve::default(),

            wall_jump_force: 400.0,
            max_climb_speed: 300.0,
            braking_deceleration_climbing: 1000.0,
            climb_reach_distance: 200.0,
        }
    }
}

impl MovementSettings {
    /// Parse settings from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
