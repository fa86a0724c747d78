use bevy::prelude::*;

use crate::game_logic::{
    HitResult, KINDA_SMALL_NUMBER, MAX_SIMULATION_ITERATIONS, MIN_TICK_TIME, ModeSignal,
    PhysicsFrame, VelocityParams, calc_velocity, horizontal, safe_move, simulation_time_step,
};
use crate::movement::{CustomMode, MovementMode, set_mode};

/// Probe sideways for the wall on the given side.
pub fn wall_run_probe(frame: &PhysicsFrame<'_>, right_side: bool) -> Option<HitResult> {
    let location = frame.state.kinematics.location;
    let cast = frame.state.kinematics.right() * frame.settings.capsule_radius * 2.0;
    let end = if right_side { location + cast } else { location - cast };
    frame.line_trace(location, end)
}

fn far_enough_above_floor(frame: &PhysicsFrame<'_>, min_height: f32) -> bool {
    let location = frame.state.kinematics.location;
    let reach = frame.half_height() + min_height;
    frame.line_trace(location, location - Vec3::Y * reach).is_none()
}

fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    v - normal * v.dot(normal)
}

pub fn try_wall_run(frame: &mut PhysicsFrame<'_>) -> bool {
    if frame.state.mode != MovementMode::Falling {
        return false;
    }
    let settings = frame.settings;
    let velocity = frame.state.kinematics.velocity;
    if horizontal(velocity).length() < settings.min_wall_run_speed
        || velocity.y < -settings.max_vertical_wall_run_speed
    {
        return false;
    }
    if !far_enough_above_floor(frame, settings.min_wall_run_height) {
        return false;
    }

    // Left first, then right; only walls we are moving into count
    let toward = |hit: &HitResult| velocity.dot(hit.normal) < 0.0;
    let (wall, right_side) = match wall_run_probe(frame, false).filter(toward) {
        Some(hit) => (hit, false),
        None => match wall_run_probe(frame, true).filter(toward) {
            Some(hit) => (hit, true),
            None => return false,
        },
    };

    let mut projected = project_on_plane(velocity, wall.normal);
    if horizontal(projected).length() < settings.min_wall_run_speed {
        return false;
    }
    projected.y = projected.y.clamp(0.0, settings.max_vertical_wall_run_speed);

    frame.state.kinematics.velocity = projected;
    frame.state.wall_run_right = right_side;
    set_mode(frame, MovementMode::Custom(CustomMode::WallRun));
    true
}

pub fn phys_wall_run(frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal {
    if delta_time < MIN_TICK_TIME {
        return ModeSignal::Stay;
    }
    let settings = frame.settings;
    let world = frame.world;
    let pull_away_sin = settings.wall_run_pull_away_angle.to_radians().sin();
    let falling = |remaining: f32| ModeSignal::Exit {
        to: MovementMode::Falling,
        remaining,
    };
    let mut remaining = delta_time;

    while remaining >= MIN_TICK_TIME && frame.iterations < MAX_SIMULATION_ITERATIONS {
        frame.iterations += 1;
        let tick = simulation_time_step(remaining, frame.iterations);
        remaining -= tick;

        let old_location = frame.state.kinematics.location;
        let Some(wall) = wall_run_probe(frame, frame.state.wall_run_right) else {
            return falling(remaining + tick);
        };
        let input = frame.acceleration;
        let pulling_away = input.length_squared() > KINDA_SMALL_NUMBER
            && input.normalize().dot(wall.normal) > pull_away_sin;
        if pulling_away {
            return falling(remaining + tick);
        }

        let mut acceleration = project_on_plane(input, wall.normal);
        acceleration.y = 0.0;
        let params = VelocityParams {
            friction: 0.0,
            fluid: false,
            braking_deceleration: frame.max_braking_deceleration(),
            max_speed: frame.max_speed(),
        };
        let kinematics = &mut frame.state.kinematics;
        calc_velocity(&mut kinematics.velocity, acceleration, tick, params, settings);
        kinematics.velocity = project_on_plane(kinematics.velocity, wall.normal);

        // Less gravity while pushing along the wall, none while still rising
        let tangent_input = acceleration.normalize_or_zero().dot(horizontal(kinematics.velocity).normalize_or_zero());
        let rising = kinematics.velocity.y > 0.0;
        let scale = settings
            .wall_run_gravity_scale_curve
            .evaluate(if rising { 0.0 } else { tangent_input });
        kinematics.velocity.y += settings.gravity_z * scale * tick;
        kinematics.velocity.y = kinematics.velocity.y.min(settings.max_vertical_wall_run_speed);

        if horizontal(kinematics.velocity).length() < settings.min_wall_run_speed
            || kinematics.velocity.y < -settings.max_vertical_wall_run_speed
        {
            return falling(remaining + tick);
        }

        let delta = kinematics.velocity * tick;
        if delta.length_squared() <= KINDA_SMALL_NUMBER {
            remaining = 0.0;
        } else {
            let shape = frame.shape();
            let kinematics = &mut frame.state.kinematics;
            safe_move(world, &mut kinematics.location, delta, shape);
            let attraction = -wall.normal * settings.wall_attraction_force * tick;
            safe_move(world, &mut kinematics.location, attraction, shape);
        }

        let kinematics = &mut frame.state.kinematics;
        if kinematics.location == old_location {
            break;
        }
        kinematics.velocity = (kinematics.location - old_location) / tick;
    }

    let lost_wall = wall_run_probe(frame, frame.state.wall_run_right).is_none();
    let near_floor = !far_enough_above_floor(frame, settings.min_wall_run_height * 0.5);
    let too_slow = frame.state.kinematics.horizontal_speed() < settings.min_wall_run_speed;
    if near_floor || lost_wall || too_slow {
        return falling(0.0);
    }
    ModeSignal::Stay
}
