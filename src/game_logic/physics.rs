use bevy::prelude::*;

use crate::game_logic::{
    BRAKE_TO_STOP_VELOCITY, BRAKING_SUBSTEP_TIME, FLYING_FRICTION, HitResult, KINDA_SMALL_NUMBER,
    MAX_FLOOR_DIST, MAX_SIMULATION_ITERATIONS, MAX_SIMULATION_TIME_STEP, MIN_FLOOR_DIST,
    MIN_TICK_TIME, MovementBase, MovementSettings, OVER_VELOCITY_PERCENT, PULLBACK_DISTANCE,
    ProbeShape, WorldProbe, horizontal, planar_yaw, safe_normal_2d, wrap_angle,
};
use crate::movement::{CharacterState, CustomMode, MovementIntent, MovementMode, NetRole, SimEvent};

/// Everything one simulated step reads and writes.
///
/// The same frame type drives the mode state machine, the base integrator
/// and every custom integrator, so a step is a pure function of
/// (state, intent, step, world answers).
pub struct PhysicsFrame<'a> {
    pub state: &'a mut CharacterState,
    pub intent: MovementIntent,
    /// Input acceleration for this step, zeroed while a transition runs
    pub acceleration: Vec3,
    pub settings: &'a MovementSettings,
    pub world: &'a dyn WorldProbe,
    pub role: NetRole,
    /// Client timestamp of the step being simulated
    pub now: f64,
    /// Velocity imposed by an active force source, if any
    pub root_motion_velocity: Option<Vec3>,
    pub iterations: u32,
    pub events: &'a mut Vec<SimEvent>,
}

impl PhysicsFrame<'_> {
    pub fn shape(&self) -> ProbeShape {
        self.state.capsule(self.settings)
    }

    pub fn half_height(&self) -> f32 {
        self.state.half_height(self.settings)
    }

    pub fn max_speed(&self) -> f32 {
        self.state
            .mode
            .max_speed(self.state.crouched, self.intent.sprint, self.settings)
    }

    pub fn max_braking_deceleration(&self) -> f32 {
        self.state.mode.max_braking_deceleration(self.settings)
    }

    pub fn line_trace(&self, from: Vec3, to: Vec3) -> Option<HitResult> {
        self.world.trace(from, to, ProbeShape::Line)
    }

    pub fn find_floor(&self, sweep_distance: f32) -> Option<FloorResult> {
        find_floor(
            self.world,
            self.state.kinematics.location,
            self.shape(),
            self.settings,
            sweep_distance,
        )
    }
}

/// What an integrator asks the dispatcher to do once it returns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ModeSignal {
    Stay,
    Exit { to: MovementMode, remaining: f32 },
}

/// The generic walk / fall / fly integrator the custom modes are layered on.
pub trait BaseMovement {
    fn phys_walking(&self, frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal;
    fn phys_falling(&self, frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal;
    fn phys_flying(&self, frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WalkFallIntegrator;

impl BaseMovement for WalkFallIntegrator {
    fn phys_walking(&self, frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal {
        phys_walking(frame, delta_time)
    }

    fn phys_falling(&self, frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal {
        phys_falling(frame, delta_time)
    }

    fn phys_flying(&self, frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal {
        phys_flying(frame, delta_time)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VelocityParams {
    pub friction: f32,
    pub fluid: bool,
    pub braking_deceleration: f32,
    pub max_speed: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FloorResult {
    pub hit: HitResult,
    /// Gap between the capsule and the floor, negative when overlapping
    pub distance: f32,
    pub walkable: bool,
}

pub fn is_walkable(normal: Vec3, settings: &MovementSettings) -> bool {
    normal.y >= settings.walkable_floor_z
}

pub fn is_exceeding_max_speed(velocity: Vec3, max_speed: f32) -> bool {
    let max_speed = max_speed.max(0.0);
    velocity.length_squared() > max_speed * max_speed * OVER_VELOCITY_PERCENT
}

/// Split a long remaining time so no single iteration integrates too far.
pub fn simulation_time_step(remaining: f32, iterations: u32) -> f32 {
    let mut step = remaining;
    if step > MAX_SIMULATION_TIME_STEP && iterations < MAX_SIMULATION_ITERATIONS {
        step = MAX_SIMULATION_TIME_STEP.min(step * 0.5);
    }
    step.max(MIN_TICK_TIME)
}

/// Update `velocity` from input acceleration, friction and braking.
///
/// Braking only applies with no input or when above `max_speed`; in the
/// latter case it never drops the speed below the cap while the input still
/// pushes forward.
pub fn calc_velocity(
    velocity: &mut Vec3,
    acceleration: Vec3,
    delta_time: f32,
    params: VelocityParams,
    settings: &MovementSettings,
) {
    if delta_time < MIN_TICK_TIME {
        return;
    }

    let friction = params.friction.max(0.0);
    let max_speed = params.max_speed.max(0.0);
    let zero_acceleration = acceleration == Vec3::ZERO;
    let over_max = is_exceeding_max_speed(*velocity, max_speed);

    if zero_acceleration || over_max {
        let old_velocity = *velocity;
        apply_velocity_braking(
            velocity,
            delta_time,
            friction,
            params.braking_deceleration,
            settings.braking_friction_factor,
        );
        if over_max
            && velocity.length_squared() < max_speed * max_speed
            && acceleration.dot(old_velocity) > 0.0
        {
            *velocity = old_velocity.normalize_or_zero() * max_speed;
        }
    } else {
        // Friction limits how fast the velocity can swing toward the input
        let accel_dir = acceleration.normalize_or_zero();
        let speed = velocity.length();
        *velocity -= (*velocity - accel_dir * speed) * (delta_time * friction).min(1.0);
    }

    if params.fluid {
        *velocity *= 1.0 - (friction * delta_time).min(1.0);
    }

    if !zero_acceleration {
        let new_max = if is_exceeding_max_speed(*velocity, max_speed) {
            velocity.length()
        } else {
            max_speed
        };
        *velocity += acceleration * delta_time;
        *velocity = velocity.clamp_length_max(new_max);
    }
}

/// Friction plus constant deceleration, sub-stepped so results hold at low tick rates.
pub fn apply_velocity_braking(
    velocity: &mut Vec3,
    delta_time: f32,
    friction: f32,
    braking_deceleration: f32,
    braking_friction_factor: f32,
) {
    if *velocity == Vec3::ZERO || delta_time < MIN_TICK_TIME {
        return;
    }

    let friction = (friction * braking_friction_factor.max(0.0)).max(0.0);
    let braking = braking_deceleration.max(0.0);
    let zero_friction = friction == 0.0;
    let zero_braking = braking == 0.0;
    if zero_friction && zero_braking {
        return;
    }

    let old_velocity = *velocity;
    let max_step = BRAKING_SUBSTEP_TIME.clamp(1.0 / 75.0, 1.0 / 20.0);
    let reverse_accel = if zero_braking {
        Vec3::ZERO
    } else {
        -braking * velocity.normalize_or_zero()
    };

    let mut remaining = delta_time;
    while remaining >= MIN_TICK_TIME {
        let dt = if remaining > max_step && !zero_friction {
            max_step.min(remaining * 0.5)
        } else {
            remaining
        };
        remaining -= dt;

        *velocity += (-friction * *velocity + reverse_accel) * dt;

        // Braking never reverses direction
        if velocity.dot(old_velocity) <= 0.0 {
            *velocity = Vec3::ZERO;
            return;
        }
    }

    let speed_sq = velocity.length_squared();
    if speed_sq <= KINDA_SMALL_NUMBER
        || (!zero_braking && speed_sq <= BRAKE_TO_STOP_VELOCITY * BRAKE_TO_STOP_VELOCITY)
    {
        *velocity = Vec3::ZERO;
    }
}

/// Sweep `shape` from `location` by `delta`, stopping just short of the first blocking hit.
/// An initial overlap is pushed out along the hit normal before retrying once.
pub fn safe_move(
    world: &dyn WorldProbe,
    location: &mut Vec3,
    delta: Vec3,
    shape: ProbeShape,
) -> Option<HitResult> {
    let length = delta.length();
    if length <= KINDA_SMALL_NUMBER {
        return None;
    }

    let start = *location;
    match world.trace(start, start + delta, shape) {
        None => {
            *location = start + delta;
            None
        }
        Some(hit) if hit.start_penetrating() => {
            let adjusted = start + hit.normal * (hit.penetration + PULLBACK_DISTANCE);
            *location = adjusted;
            match world.trace(adjusted, adjusted + delta, shape) {
                None => {
                    *location = adjusted + delta;
                    None
                }
                Some(second) if second.start_penetrating() => Some(second),
                Some(second) => {
                    *location = pulled_back(adjusted, delta, length, second.time);
                    Some(second)
                }
            }
        }
        Some(hit) => {
            *location = pulled_back(start, delta, length, hit.time);
            Some(hit)
        }
    }
}

fn pulled_back(start: Vec3, delta: Vec3, length: f32, time: f32) -> Vec3 {
    let travel = (length * time - PULLBACK_DISTANCE).max(0.0);
    start + delta * (travel / length)
}

/// Move the remainder of a blocked `delta` along the surface with `normal`.
/// A second hit redirects the move along the crease between both surfaces.
pub fn slide_along_surface(
    world: &dyn WorldProbe,
    location: &mut Vec3,
    delta: Vec3,
    normal: Vec3,
    shape: ProbeShape,
) -> Option<HitResult> {
    let slide = delta - normal * delta.dot(normal);
    if slide.dot(delta) <= 0.0 {
        return None;
    }

    let hit = safe_move(world, location, slide, shape)?;
    let crease = normal.cross(hit.normal);
    if crease.length_squared() > KINDA_SMALL_NUMBER {
        let direction = crease.normalize();
        let creased = direction * slide.dot(direction) * (1.0 - hit.time);
        if creased.dot(delta) > 0.0 {
            safe_move(world, location, creased, shape);
        }
    }
    Some(hit)
}

pub fn find_floor(
    world: &dyn WorldProbe,
    location: Vec3,
    shape: ProbeShape,
    settings: &MovementSettings,
    sweep_distance: f32,
) -> Option<FloorResult> {
    let hit = world.trace(location, location - Vec3::Y * sweep_distance, shape)?;
    let distance = if hit.start_penetrating() {
        -hit.penetration
    } else {
        hit.distance
    };
    Some(FloorResult {
        hit,
        distance,
        walkable: is_walkable(hit.normal, settings),
    })
}

/// Keep the capsule hovering inside the floor tolerance band.
pub fn adjust_floor_height(
    world: &dyn WorldProbe,
    location: &mut Vec3,
    floor: &FloorResult,
    shape: ProbeShape,
) {
    if (MIN_FLOOR_DIST..=MAX_FLOOR_DIST).contains(&floor.distance) {
        return;
    }
    let target = 0.5 * (MIN_FLOOR_DIST + MAX_FLOOR_DIST);
    let delta = Vec3::Y * (target - floor.distance);
    if delta.y > 0.0 {
        safe_move(world, location, delta, shape);
    } else {
        *location += delta;
    }
}

/// Tilt a horizontal move so it follows the floor ramp without changing its planar length.
pub fn ground_movement_delta(delta: Vec3, floor_normal: Option<Vec3>) -> Vec3 {
    match floor_normal {
        Some(n) if n.y > KINDA_SMALL_NUMBER && n.y < 1.0 - KINDA_SMALL_NUMBER => Vec3::new(
            delta.x,
            -(n.x * delta.x + n.z * delta.z) / n.y,
            delta.z,
        ),
        _ => delta,
    }
}

pub fn can_walk_off_ledges(state: &CharacterState, settings: &MovementSettings) -> bool {
    match state.mode {
        MovementMode::Custom(CustomMode::Slide) => settings.can_slide_off_ledges,
        _ if state.crouched => settings.can_walk_off_ledges_when_crouching,
        _ => settings.can_walk_off_ledges,
    }
}

pub fn walk_floor_distance(settings: &MovementSettings) -> f32 {
    MAX_FLOOR_DIST + settings.max_step_height
}

/// Shrink the capsule, keeping the feet planted when on the ground.
pub fn crouch(state: &mut CharacterState, settings: &MovementSettings) {
    if state.crouched {
        return;
    }
    if state.is_moving_on_ground() {
        let shrink = settings.capsule_half_height - settings.crouched_half_height;
        state.kinematics.location.y -= shrink;
    }
    state.crouched = true;
}

/// Restore the standing capsule if there is room for it. Returns false when blocked.
pub fn uncrouch(state: &mut CharacterState, settings: &MovementSettings, world: &dyn WorldProbe) -> bool {
    if !state.crouched {
        return true;
    }
    let grow = settings.capsule_half_height - settings.crouched_half_height;
    let standing = if state.is_moving_on_ground() {
        state.kinematics.location + Vec3::Y * grow
    } else {
        state.kinematics.location
    };
    let shape = ProbeShape::Capsule {
        radius: settings.capsule_radius,
        half_height: settings.capsule_half_height,
    };
    if world.overlaps(standing, shape) {
        return false;
    }
    state.kinematics.location = standing;
    state.crouched = false;
    true
}

pub fn phys_walking(frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal {
    if delta_time < MIN_TICK_TIME {
        return ModeSignal::Stay;
    }

    let settings = frame.settings;
    let world = frame.world;
    let mut remaining = delta_time;

    while remaining >= MIN_TICK_TIME && frame.iterations < MAX_SIMULATION_ITERATIONS {
        frame.iterations += 1;
        let tick = simulation_time_step(remaining, frame.iterations);
        remaining -= tick;

        let shape = frame.shape();
        let old_location = frame.state.kinematics.location;
        let floor_normal = frame
            .find_floor(walk_floor_distance(settings))
            .filter(|floor| floor.walkable)
            .map(|floor| floor.hit.normal);

        let params = VelocityParams {
            friction: settings.ground_friction,
            fluid: false,
            braking_deceleration: frame.max_braking_deceleration(),
            max_speed: frame.max_speed(),
        };
        let acceleration = horizontal(frame.acceleration);
        let kinematics = &mut frame.state.kinematics;
        kinematics.velocity.y = 0.0;
        match frame.root_motion_velocity {
            Some(velocity) => kinematics.velocity = horizontal(velocity),
            None => calc_velocity(&mut kinematics.velocity, acceleration, tick, params, settings),
        }

        let delta = kinematics.velocity * tick;
        if delta.length_squared() > KINDA_SMALL_NUMBER {
            move_along_floor(world, &mut kinematics.location, delta, floor_normal, shape, settings);
        } else {
            remaining = 0.0;
        }

        match frame.find_floor(walk_floor_distance(settings)) {
            Some(floor) if floor.walkable => {
                adjust_floor_height(world, &mut frame.state.kinematics.location, &floor, shape);
                frame.state.base = Some(MovementBase(floor.hit.surface));
            }
            _ => {
                if !can_walk_off_ledges(frame.state, settings) {
                    frame.state.kinematics.location = old_location;
                    frame.state.kinematics.velocity = Vec3::ZERO;
                    return ModeSignal::Stay;
                }
                frame.state.base = None;
                return ModeSignal::Exit {
                    to: MovementMode::Falling,
                    remaining,
                };
            }
        }

        let kinematics = &mut frame.state.kinematics;
        if frame.root_motion_velocity.is_none() {
            kinematics.velocity = horizontal((kinematics.location - old_location) / tick);
        }
        if kinematics.location == old_location {
            break;
        }
    }

    ModeSignal::Stay
}

fn move_along_floor(
    world: &dyn WorldProbe,
    location: &mut Vec3,
    delta: Vec3,
    floor_normal: Option<Vec3>,
    shape: ProbeShape,
    settings: &MovementSettings,
) {
    let ramp = ground_movement_delta(delta, floor_normal);
    let Some(hit) = safe_move(world, location, ramp, shape) else {
        return;
    };
    let rest = delta * (1.0 - hit.time);

    if is_walkable(hit.normal, settings) {
        // Walked onto a steeper but still walkable ramp
        safe_move(world, location, ground_movement_delta(rest, Some(hit.normal)), shape);
    } else if !step_up(world, location, rest, shape, settings) {
        let wall = safe_normal_2d(hit.normal);
        let normal = if wall == Vec3::ZERO { hit.normal } else { wall };
        slide_along_surface(world, location, rest, normal, shape);
    }
}

fn step_up(
    world: &dyn WorldProbe,
    location: &mut Vec3,
    delta: Vec3,
    shape: ProbeShape,
    settings: &MovementSettings,
) -> bool {
    let forward = horizontal(delta);
    if forward.length_squared() <= KINDA_SMALL_NUMBER {
        return false;
    }

    let start = *location;
    let mut probe = start;
    safe_move(world, &mut probe, Vec3::Y * settings.max_step_height, shape);
    let raised = probe;
    // Still blocked at step height means the obstacle is a wall, not a step
    if safe_move(world, &mut probe, forward, shape).is_some()
        || horizontal(probe - raised).length_squared() <= KINDA_SMALL_NUMBER
    {
        return false;
    }

    let drop = probe.y - start.y + MAX_FLOOR_DIST;
    match safe_move(world, &mut probe, Vec3::NEG_Y * drop, shape) {
        Some(hit) if is_walkable(hit.normal, settings) => {
            *location = probe;
            true
        }
        _ => false,
    }
}

pub fn phys_falling(frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal {
    if delta_time < MIN_TICK_TIME {
        return ModeSignal::Stay;
    }

    let settings = frame.settings;
    let world = frame.world;
    let mut remaining = delta_time;

    while remaining >= MIN_TICK_TIME && frame.iterations < MAX_SIMULATION_ITERATIONS {
        frame.iterations += 1;
        let tick = simulation_time_step(remaining, frame.iterations);
        remaining -= tick;

        let shape = frame.shape();
        let params = VelocityParams {
            friction: 0.0,
            fluid: false,
            braking_deceleration: frame.max_braking_deceleration(),
            max_speed: frame.max_speed(),
        };
        let air_acceleration = horizontal(frame.acceleration) * settings.air_control;
        let root_motion = frame.root_motion_velocity;
        let kinematics = &mut frame.state.kinematics;
        let old_velocity = kinematics.velocity;

        let delta = match root_motion {
            Some(velocity) => {
                kinematics.velocity = velocity;
                velocity * tick
            }
            None => {
                let mut lateral = horizontal(old_velocity);
                calc_velocity(&mut lateral, air_acceleration, tick, params, settings);
                kinematics.velocity = Vec3::new(
                    lateral.x,
                    old_velocity.y + settings.gravity_z * tick,
                    lateral.z,
                );
                (old_velocity + kinematics.velocity) * 0.5 * tick
            }
        };

        let Some(hit) = safe_move(world, &mut kinematics.location, delta, shape) else {
            continue;
        };

        if is_walkable(hit.normal, settings) {
            remaining += tick * (1.0 - hit.time);
            return land(frame, hit, remaining);
        }

        let into = kinematics.velocity.dot(hit.normal).min(0.0);
        kinematics.velocity -= hit.normal * into;
        let rest = delta * (1.0 - hit.time);
        if let Some(second) = slide_along_surface(world, &mut kinematics.location, rest, hit.normal, shape) {
            if is_walkable(second.normal, settings) {
                return land(frame, second, remaining);
            }
        }
    }

    ModeSignal::Stay
}

fn land(frame: &mut PhysicsFrame<'_>, floor: HitResult, remaining: f32) -> ModeSignal {
    frame.state.kinematics.velocity.y = 0.0;
    frame.state.base = Some(MovementBase(floor.surface));
    frame.events.push(SimEvent::Landed);
    ModeSignal::Exit {
        to: MovementMode::Walking,
        remaining,
    }
}

pub fn phys_flying(frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal {
    if delta_time < MIN_TICK_TIME {
        return ModeSignal::Stay;
    }
    frame.iterations += 1;

    let settings = frame.settings;
    let world = frame.world;
    let shape = frame.shape();
    let params = VelocityParams {
        friction: FLYING_FRICTION,
        fluid: true,
        braking_deceleration: frame.max_braking_deceleration(),
        max_speed: frame.max_speed(),
    };
    let acceleration = frame.acceleration;
    let root_motion = frame.root_motion_velocity;
    let kinematics = &mut frame.state.kinematics;

    match root_motion {
        Some(velocity) => kinematics.velocity = velocity,
        None => calc_velocity(&mut kinematics.velocity, acceleration, delta_time, params, settings),
    }

    let old_location = kinematics.location;
    let delta = kinematics.velocity * delta_time;
    if let Some(hit) = safe_move(world, &mut kinematics.location, delta, shape) {
        slide_along_surface(world, &mut kinematics.location, delta * (1.0 - hit.time), hit.normal, shape);
    }

    if root_motion.is_none() {
        kinematics.velocity = (kinematics.location - old_location) / delta_time;
    }
    ModeSignal::Stay
}

/// Turn toward the input (walk, fall, prone) at the configured rate, or
/// snap to the velocity heading while sliding and wall running.
pub fn physics_rotation(frame: &mut PhysicsFrame<'_>, delta_time: f32) {
    let kinematics = &mut frame.state.kinematics;
    match frame.state.mode {
        MovementMode::Custom(CustomMode::Slide) | MovementMode::Custom(CustomMode::WallRun) => {
            let velocity = kinematics.velocity;
            kinematics.face(velocity);
        }
        MovementMode::Walking | MovementMode::Falling | MovementMode::Custom(CustomMode::Prone)
            if frame.state.orient_rotation_to_movement =>
        {
            let Some(target) = planar_yaw(frame.acceleration) else {
                return;
            };
            let current = kinematics.yaw();
            let max_turn = frame.settings.rotation_rate.to_radians() * delta_time;
            let turn = wrap_angle(target - current).clamp(-max_turn, max_turn);
            kinematics.rotation = Quat::from_rotation_y(current + turn);
        }
        _ => {}
    }
}
