use bevy::prelude::*;

use crate::game_logic::{
    HitResult, KINDA_SMALL_NUMBER, MIN_TICK_TIME, ModeSignal, PhysicsFrame, VelocityParams,
    calc_velocity, horizontal, safe_move, safe_normal_2d,
};
use crate::movement::{CustomMode, MovementMode, set_mode};

fn climb_surface(frame: &PhysicsFrame<'_>) -> Option<HitResult> {
    let location = frame.state.kinematics.location;
    let forward = safe_normal_2d(frame.state.kinematics.forward());
    frame.line_trace(location, location + forward * frame.settings.climb_reach_distance)
}

/// Too steep to stand on and roughly in front of the character.
fn is_climbable(hit: &HitResult, forward: Vec3, frame: &PhysicsFrame<'_>) -> bool {
    let settings = frame.settings;
    let alignment = settings.mantle_max_alignment_angle.to_radians().cos();
    hit.normal.y.abs() < settings.walkable_floor_z && forward.dot(-hit.normal) >= alignment
}

pub fn try_climb(frame: &mut PhysicsFrame<'_>) -> bool {
    if frame.state.mode != MovementMode::Falling {
        return false;
    }
    let forward = safe_normal_2d(frame.state.kinematics.forward());
    let Some(wall) = climb_surface(frame) else {
        return false;
    };
    if !is_climbable(&wall, forward, frame) {
        return false;
    }
    frame.state.kinematics.face(-wall.normal);
    set_mode(frame, MovementMode::Custom(CustomMode::Climb));
    true
}

pub fn phys_climb(frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal {
    if delta_time < MIN_TICK_TIME {
        return ModeSignal::Stay;
    }
    let settings = frame.settings;
    let location = frame.state.kinematics.location;
    let floor_reach = frame.half_height() * 1.2;
    let surface = climb_surface(frame);
    let on_floor = frame.line_trace(location, location - Vec3::Y * floor_reach).is_some();

    let Some(surface) = surface.filter(|_| frame.intent.climb && !on_floor) else {
        return ModeSignal::Exit {
            to: MovementMode::Falling,
            remaining: delta_time,
        };
    };
    frame.iterations += 1;

    // Forward input climbs up, sideways input stays sideways
    let right = frame.state.kinematics.right();
    let forward = safe_normal_2d(frame.state.kinematics.forward());
    let input = horizontal(frame.acceleration);
    let acceleration = Vec3::Y * input.dot(forward) + right * input.dot(right);

    let params = VelocityParams {
        friction: 0.0,
        fluid: false,
        braking_deceleration: frame.max_braking_deceleration(),
        max_speed: frame.max_speed(),
    };
    let world = frame.world;
    let shape = frame.shape();
    let kinematics = &mut frame.state.kinematics;
    calc_velocity(&mut kinematics.velocity, acceleration, delta_time, params, settings);
    let normal = surface.normal;
    kinematics.velocity -= normal * kinematics.velocity.dot(normal);

    let delta = kinematics.velocity * delta_time;
    if delta.length_squared() > KINDA_SMALL_NUMBER {
        safe_move(world, &mut kinematics.location, delta, shape);
        let attraction = -normal * settings.wall_attraction_force * delta_time;
        safe_move(world, &mut kinematics.location, attraction, shape);
    }
    kinematics.velocity = (kinematics.location - location) / delta_time;
    kinematics.face(-normal);
    ModeSignal::Stay
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::{MovementSettings, StaticGeometry, SurfacePatch};
    use crate::movement::{CharacterState, MovementIntent, NetRole, SimEnv};

    fn climbing_wall() -> StaticGeometry {
        StaticGeometry::new()
            .with_patch(SurfacePatch::floor(1, Vec3::ZERO, 2000.0, 2000.0))
            .with_patch(SurfacePatch::wall(5, Vec3::new(0.0, 400.0, -100.0), Vec3::Z, 300.0, 400.0))
    }

    #[test]
    fn test_climb_up_the_wall() {
        let settings = MovementSettings::default();
        let world = climbing_wall();
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut state = CharacterState::new(Vec3::new(0.0, 200.0, -50.0), MovementMode::Falling);
        let climb = MovementIntent {
            climb: true,
            ..Default::default()
        };
        let mut events = Vec::new();

        let mut frame = env.frame(&mut state, climb, Vec3::ZERO, 0.0, &mut events);
        assert!(try_climb(&mut frame));
        assert!(!state.orient_rotation_to_movement);

        let up = Vec3::NEG_Z * settings.max_acceleration;
        for _ in 0..30 {
            let mut frame = env.frame(&mut state, climb, up, 0.0, &mut events);
            assert_eq!(phys_climb(&mut frame, 1.0 / 60.0), ModeSignal::Stay);
        }
        assert!(state.kinematics.location.y > 250.0);
        assert!(state.kinematics.velocity.y <= settings.max_climb_speed + 1e-2);
        assert!((state.kinematics.forward() - Vec3::NEG_Z).length() < 1e-4);
    }

    #[test]
    fn test_releasing_climb_falls() {
        let settings = MovementSettings::default();
        let world = climbing_wall();
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut state = CharacterState::new(Vec3::new(0.0, 200.0, -50.0), MovementMode::Custom(CustomMode::Climb));
        let mut events = Vec::new();
        let mut frame = env.frame(&mut state, MovementIntent::default(), Vec3::ZERO, 0.0, &mut events);
        assert!(matches!(
            phys_climb(&mut frame, 1.0 / 60.0),
            ModeSignal::Exit {
                to: MovementMode::Falling,
                ..
            }
        ));
    }

    #[test]
    fn test_floor_ends_climb() {
        let settings = MovementSettings::default();
        let world = climbing_wall();
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut state = CharacterState::new(Vec3::new(0.0, 95.0, -50.0), MovementMode::Custom(CustomMode::Climb));
        let climb = MovementIntent {
            climb: true,
            ..Default::default()
        };
        let mut events = Vec::new();
        let mut frame = env.frame(&mut state, climb, Vec3::ZERO, 0.0, &mut events);
        assert!(matches!(phys_climb(&mut frame, 1.0 / 60.0), ModeSignal::Exit { .. }));
    }
}
