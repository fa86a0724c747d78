use bevy::prelude::*;

use crate::game_logic::{
    HitResult, MIN_TICK_TIME, ModeSignal, MovementBase, PhysicsFrame, VelocityParams,
    adjust_floor_height, calc_velocity, horizontal, is_walkable, safe_move, safe_normal_2d,
    slide_along_surface, walk_floor_distance,
};
use crate::movement::{CustomMode, MovementMode, set_mode};

/// Walkable ground under the capsule, probed further down than the normal
/// floor check so small bumps do not end a slide.
pub fn slide_surface(frame: &PhysicsFrame<'_>) -> Option<HitResult> {
    let location = frame.state.kinematics.location;
    let reach = frame.half_height() * 2.5;
    frame
        .line_trace(location, location - Vec3::Y * reach)
        .filter(|hit| is_walkable(hit.normal, frame.settings))
}

pub fn try_slide(frame: &mut PhysicsFrame<'_>) -> bool {
    if !frame.intent.slide || frame.state.mode != MovementMode::Walking {
        return false;
    }
    if frame.state.kinematics.horizontal_speed() < frame.settings.min_slide_speed {
        return false;
    }
    if slide_surface(frame).is_none() {
        return false;
    }
    set_mode(frame, MovementMode::Custom(CustomMode::Slide));
    true
}

fn slide_exit(frame: &PhysicsFrame<'_>, has_surface: bool, remaining: f32) -> ModeSignal {
    let to = if !has_surface && frame.settings.can_slide_off_ledges {
        MovementMode::Falling
    } else {
        MovementMode::Walking
    };
    ModeSignal::Exit { to, remaining }
}

/// Ground ahead of the slide direction, used when sliding off ledges is disabled.
fn has_ground_ahead(frame: &PhysicsFrame<'_>) -> bool {
    let direction = safe_normal_2d(frame.state.kinematics.velocity);
    let ahead = frame.state.kinematics.location + direction * (frame.settings.capsule_radius + 1.0);
    let reach = frame.half_height() * 2.5;
    frame
        .line_trace(ahead, ahead - Vec3::Y * reach)
        .is_some_and(|hit| is_walkable(hit.normal, frame.settings))
}

pub fn phys_slide(frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal {
    if delta_time < MIN_TICK_TIME {
        return ModeSignal::Stay;
    }
    let settings = frame.settings;
    let Some(surface) = slide_surface(frame) else {
        return slide_exit(frame, false, delta_time);
    };
    if frame.state.kinematics.horizontal_speed() < settings.min_slide_speed {
        return slide_exit(frame, true, delta_time);
    }
    frame.iterations += 1;

    // Gravity along the slope
    let normal = surface.normal;
    let downhill = Vec3::NEG_Y - normal * normal.dot(Vec3::NEG_Y);
    frame.state.kinematics.velocity += downhill * settings.slide_gravity_force * delta_time;

    // Only strafing input steers a slide
    let right = frame.state.kinematics.right();
    let strafe = if frame.acceleration.normalize_or_zero().dot(right).abs() > 0.5 {
        right * frame.acceleration.dot(right)
    } else {
        Vec3::ZERO
    };
    let params = VelocityParams {
        friction: settings.ground_friction * settings.slide_friction_factor,
        fluid: true,
        braking_deceleration: frame.max_braking_deceleration(),
        max_speed: frame.max_speed(),
    };
    calc_velocity(&mut frame.state.kinematics.velocity, strafe, delta_time, params, settings);

    if !settings.can_slide_off_ledges && !has_ground_ahead(frame) {
        return ModeSignal::Exit {
            to: MovementMode::Walking,
            remaining: delta_time,
        };
    }

    let world = frame.world;
    let shape = frame.shape();
    let kinematics = &mut frame.state.kinematics;
    let old_location = kinematics.location;
    let velocity = kinematics.velocity;
    let delta = (velocity - normal * velocity.dot(normal)) * delta_time;
    if let Some(hit) = safe_move(world, &mut kinematics.location, delta, shape) {
        slide_along_surface(world, &mut kinematics.location, delta * (1.0 - hit.time), hit.normal, shape);
    }
    kinematics.velocity = (kinematics.location - old_location) / delta_time;

    if let Some(floor) = frame.find_floor(walk_floor_distance(settings)).filter(|floor| floor.walkable) {
        adjust_floor_height(world, &mut frame.state.kinematics.location, &floor, shape);
        frame.state.base = Some(MovementBase(floor.hit.surface));
    }

    let has_surface = slide_surface(frame).is_some();
    if !has_surface || horizontal(frame.state.kinematics.velocity).length() < settings.min_slide_speed {
        return slide_exit(frame, has_surface, 0.0);
    }
    ModeSignal::Stay
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::{MovementSettings, StaticGeometry, SurfacePatch};
    use crate::movement::{CharacterState, MoveStep, MovementIntent, NetRole, SimEnv, simulate_step};

    fn flat() -> StaticGeometry {
        StaticGeometry::new().with_patch(SurfacePatch::floor(1, Vec3::ZERO, 5000.0, 5000.0))
    }

    fn walking_at(speed: f32) -> CharacterState {
        let mut state = CharacterState::new(Vec3::new(0.0, 90.15, 0.0), MovementMode::Walking);
        state.kinematics.velocity = Vec3::NEG_Z * speed;
        state
    }

    fn slide_tick(state: &mut CharacterState, settings: &MovementSettings, world: &StaticGeometry) -> Vec<crate::movement::SimEvent> {
        let env = SimEnv::new(settings, world, NetRole::AutonomousProxy);
        let intent = MovementIntent {
            slide: true,
            ..Default::default()
        };
        let step = MoveStep {
            timestamp: 0.0,
            delta_time: 1.0 / 60.0,
            acceleration: Vec3::ZERO,
        };
        simulate_step(state, intent, step, &env)
    }

    #[test]
    fn test_slide_entry_adds_impulse_below_cap() {
        let settings = MovementSettings::default();
        let world = flat();
        let mut state = walking_at(450.0);
        let mut events = Vec::new();
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut frame = env.frame(&mut state, MovementIntent { slide: true, ..Default::default() }, Vec3::ZERO, 0.0, &mut events);

        assert!(try_slide(&mut frame));
        assert_eq!(state.mode, MovementMode::Custom(CustomMode::Slide));
        assert!(state.crouched);
        assert!((state.kinematics.horizontal_speed() - 850.0).abs() < 1e-3);
    }

    #[test]
    fn test_slide_entry_skips_impulse_above_cap() {
        let settings = MovementSettings::default();
        let world = flat();
        let mut state = walking_at(750.0);
        let mut events = Vec::new();
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut frame = env.frame(&mut state, MovementIntent { slide: true, ..Default::default() }, Vec3::ZERO, 0.0, &mut events);

        assert!(try_slide(&mut frame));
        assert!((state.kinematics.horizontal_speed() - 750.0).abs() < 1e-3);
    }

    #[test]
    fn test_slide_needs_speed() {
        let settings = MovementSettings::default();
        let world = flat();
        let mut state = walking_at(350.0);
        let mut events = Vec::new();
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut frame = env.frame(&mut state, MovementIntent { slide: true, ..Default::default() }, Vec3::ZERO, 0.0, &mut events);
        assert!(!try_slide(&mut frame));
        assert_eq!(state.mode, MovementMode::Walking);
    }

    #[test]
    fn test_slide_slows_and_returns_to_walking() {
        let settings = MovementSettings::default();
        let world = flat();
        let mut state = walking_at(450.0);

        let events = slide_tick(&mut state, &settings, &world);
        assert!(events.contains(&crate::movement::SimEvent::ModeChanged {
            from: MovementMode::Walking,
            to: MovementMode::Custom(CustomMode::Slide),
        }));

        let mut ticks = 0;
        while state.mode == MovementMode::Custom(CustomMode::Slide) && ticks < 600 {
            slide_tick(&mut state, &settings, &world);
            ticks += 1;
        }
        assert_eq!(state.mode, MovementMode::Walking);
        assert!(ticks > 5);
        // Still on the floor and moving the way it slid
        assert!((state.kinematics.location.y - 46.15).abs() < 1.0);
        assert!(state.kinematics.location.z < -100.0);
    }

    #[test]
    fn test_slide_off_ledge_falls() {
        let settings = MovementSettings::default();
        let world = StaticGeometry::new().with_patch(SurfacePatch::floor(1, Vec3::ZERO, 100.0, 100.0));
        let mut state = walking_at(700.0);
        for _ in 0..30 {
            slide_tick(&mut state, &settings, &world);
        }
        assert_eq!(state.mode, MovementMode::Falling);
        assert!(state.kinematics.location.z < -100.0);
    }
}
