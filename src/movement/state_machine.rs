use bevy::prelude::*;

use crate::game_logic::{
    BaseMovement, MAX_SIMULATION_ITERATIONS, MIN_TICK_TIME, ModeSignal, MovementSettings,
    PhysicsFrame, WalkFallIntegrator, WorldProbe, crouch, physics_rotation, safe_normal_2d,
    uncrouch,
};
use crate::movement::{
    CharacterState, CustomMode, ForceApplication, Montage, MoveStep, MovementIntent,
    MovementMode, NetRole, SimEvent, complete_transition, custom_physics, try_climb, try_hang,
    try_mantle, try_prone, try_slide, try_wall_run, wall_run_probe,
};

/// Everything outside the character a step depends on.
#[derive(Clone, Copy)]
pub struct SimEnv<'a> {
    pub settings: &'a MovementSettings,
    pub world: &'a dyn WorldProbe,
    pub role: NetRole,
    pub base: &'a dyn BaseMovement,
}

impl<'a> SimEnv<'a> {
    pub fn new(settings: &'a MovementSettings, world: &'a dyn WorldProbe, role: NetRole) -> Self {
        Self {
            settings,
            world,
            role,
            base: &WalkFallIntegrator,
        }
    }

    pub fn frame<'f>(
        &self,
        state: &'f mut CharacterState,
        intent: MovementIntent,
        acceleration: Vec3,
        now: f64,
        events: &'f mut Vec<SimEvent>,
    ) -> PhysicsFrame<'f>
    where
        'a: 'f,
    {
        PhysicsFrame {
            state,
            intent,
            acceleration,
            settings: self.settings,
            world: self.world,
            role: self.role,
            now,
            root_motion_velocity: None,
            iterations: 0,
            events,
        }
    }
}

/// Advance one character by one tick.
///
/// Order: finish or hold transitions, resolve mode candidates, dash and
/// jump, integrate the active mode, rotate, then post-movement bookkeeping.
pub fn simulate_step(
    state: &mut CharacterState,
    intent: MovementIntent,
    step: MoveStep,
    env: &SimEnv<'_>,
) -> Vec<SimEvent> {
    let mut events = Vec::new();
    if state.mode == MovementMode::None || step.delta_time < MIN_TICK_TIME {
        return events;
    }

    let delta_time = step.delta_time;
    let mut frame = env.frame(state, intent, step.acceleration, step.timestamp, &mut events);

    update_before_movement(&mut frame);
    if frame.state.transition.is_active() {
        frame.acceleration = Vec3::ZERO;
    }
    frame.root_motion_velocity = frame
        .state
        .forces
        .override_velocity(frame.state.kinematics.location, delta_time);

    start_new_physics(&mut frame, env.base, delta_time);
    frame.state.forces.advance(delta_time);
    physics_rotation(&mut frame, delta_time);
    update_after_movement(&mut frame);

    events
}

/// Switch modes, running exit and enter hooks. Leaving the mode a transition
/// started in cancels the transition and its force source.
pub fn set_mode(frame: &mut PhysicsFrame<'_>, mode: MovementMode) {
    let from = frame.state.mode;
    if from == mode {
        return;
    }

    let state = &mut *frame.state;
    if let Some(cancelled) = state.transition.discard(&mut state.forces) {
        debug!("transition {:?} cancelled by mode change", cancelled.kind);
    }

    on_exit(frame, from);
    frame.state.mode = mode;
    on_enter(frame, from, mode);

    debug!("movement mode {:?} -> {:?}", from, mode);
    frame.events.push(SimEvent::ModeChanged { from, to: mode });
}

fn on_exit(frame: &mut PhysicsFrame<'_>, from: MovementMode) {
    match from {
        MovementMode::Custom(CustomMode::Slide | CustomMode::Climb | CustomMode::Hang) => {
            frame.state.orient_rotation_to_movement = true;
        }
        MovementMode::Custom(CustomMode::Prone) => {
            frame.state.prone_latched = false;
        }
        _ => {}
    }
}

fn on_enter(frame: &mut PhysicsFrame<'_>, from: MovementMode, to: MovementMode) {
    let settings = frame.settings;
    let state = &mut *frame.state;
    match to {
        MovementMode::Walking => {
            state.kinematics.velocity.y = 0.0;
        }
        MovementMode::Falling => {
            state.base = None;
        }
        MovementMode::Custom(CustomMode::Slide) => {
            let entry_speed = state.kinematics.horizontal_speed();
            crouch(state, settings);
            state.orient_rotation_to_movement = false;
            if entry_speed <= settings.max_slide_impulse_speed {
                state.kinematics.velocity += safe_normal_2d(state.kinematics.velocity) * settings.slide_enter_impulse;
            }
        }
        MovementMode::Custom(CustomMode::Prone) => {
            crouch(state, settings);
            state.prone_latched = true;
            if from == MovementMode::Custom(CustomMode::Slide) {
                state.kinematics.velocity +=
                    safe_normal_2d(state.kinematics.velocity) * settings.prone_slide_enter_impulse;
            }
        }
        MovementMode::Custom(CustomMode::Hang) => {
            state.kinematics.velocity = Vec3::ZERO;
            state.orient_rotation_to_movement = false;
        }
        MovementMode::Custom(CustomMode::Climb) => {
            state.orient_rotation_to_movement = false;
        }
        _ => {}
    }
}

fn wants_to_crouch(frame: &PhysicsFrame<'_>) -> bool {
    frame.intent.crouch
        || matches!(
            frame.state.mode,
            MovementMode::Custom(CustomMode::Slide | CustomMode::Prone)
        )
}

pub fn can_crouch_in_current_state(state: &CharacterState) -> bool {
    state.is_moving_on_ground()
}

fn update_crouch(frame: &mut PhysicsFrame<'_>) {
    let wants = wants_to_crouch(frame);
    let state = &mut *frame.state;
    if wants && !state.crouched && can_crouch_in_current_state(state) {
        crouch(state, frame.settings);
    } else if !wants && state.crouched {
        // Stays crouched until there is room to stand
        uncrouch(state, frame.settings, frame.world);
    }
}

fn update_before_movement(frame: &mut PhysicsFrame<'_>) {
    if frame.state.transition_finished {
        complete_transition(frame);
    }
    if frame.state.transition.is_active() {
        return;
    }

    update_crouch(frame);
    match frame.state.mode {
        MovementMode::Custom(CustomMode::Slide) if !frame.intent.slide => {
            set_mode(frame, MovementMode::Walking);
        }
        MovementMode::Custom(CustomMode::Prone) => {
            let released = frame.state.prev_crouch && !frame.intent.crouch;
            if released || frame.intent.prone {
                frame.state.prone_latched = false;
            }
        }
        _ => {}
    }

    if try_special_moves(frame) && frame.state.transition.is_active() {
        return;
    }

    if frame.intent.dash && can_dash(frame) {
        if dash_permitted(frame) {
            perform_dash(frame);
        } else {
            warn!(
                "rejected dash at {:.3}, last dash at {:?}",
                frame.now, frame.state.last_dash_time
            );
            frame.events.push(SimEvent::DashRejected);
        }
    }

    if frame.intent.jump && can_attempt_jump(frame) {
        do_jump(frame);
    }
}

/// First successful candidate wins.
fn try_special_moves(frame: &mut PhysicsFrame<'_>) -> bool {
    if try_hang_or_climb(frame) {
        return true;
    }
    if frame.intent.jump && try_mantle(frame) {
        return true;
    }
    if try_wall_run(frame) {
        return true;
    }
    if try_slide(frame) {
        return true;
    }
    try_prone(frame)
}

fn try_hang_or_climb(frame: &mut PhysicsFrame<'_>) -> bool {
    if !frame.intent.climb || frame.state.mode != MovementMode::Falling {
        return false;
    }
    let location = frame.state.kinematics.location;
    let floor_reach = frame.half_height() * 1.2;
    if frame.line_trace(location, location - Vec3::Y * floor_reach).is_some() {
        return false;
    }
    try_hang(frame) || try_climb(frame)
}

pub fn can_dash(frame: &PhysicsFrame<'_>) -> bool {
    let state = &*frame.state;
    let grounded_upright = state.mode == MovementMode::Walking && !state.crouched;
    (grounded_upright || state.mode == MovementMode::Falling)
        && state.kinematics.horizontal_speed() < frame.settings.dash_impulse
}

/// The authority enforces its own, shorter cooldown on remote dashes.
pub fn dash_permitted(frame: &PhysicsFrame<'_>) -> bool {
    if frame.role != NetRole::Authority {
        return true;
    }
    let settings = frame.settings;
    frame.state.last_dash_time.is_none_or(|last| {
        settings
            .dash_cooldown_boundary
            .permits(frame.now - last, settings.auth_dash_cooldown_duration as f64)
    })
}

fn perform_dash(frame: &mut PhysicsFrame<'_>) {
    let settings = frame.settings;
    let planar_input = safe_normal_2d(frame.acceleration);
    let state = &mut *frame.state;
    let direction = if planar_input == Vec3::ZERO {
        safe_normal_2d(state.kinematics.forward())
    } else {
        planar_input
    };
    let velocity = (direction + Vec3::Y * 0.1) * settings.dash_impulse;

    state.last_dash_time = Some(frame.now);
    state.kinematics.velocity = velocity;
    state.kinematics.face(direction);
    set_mode(frame, MovementMode::Flying);

    let state = &mut *frame.state;
    if let Some(previous) = state.root_motion.take() {
        state.forces.remove(previous);
    }
    state.root_motion = Some(state.forces.apply_burst(velocity, settings.dash_burst_duration));
    if frame.role == NetRole::Authority {
        state.proxy.dash = !state.proxy.dash;
    }

    frame.events.push(SimEvent::DashStarted);
    frame.events.push(SimEvent::PlayMontage {
        montage: Montage::Dash,
        speed: 1.0,
    });
}

pub fn can_attempt_jump(frame: &PhysicsFrame<'_>) -> bool {
    !wants_to_crouch(frame)
        && matches!(
            frame.state.mode,
            MovementMode::Walking
                | MovementMode::Custom(CustomMode::WallRun | CustomMode::Hang | CustomMode::Climb)
        )
}

fn do_jump(frame: &mut PhysicsFrame<'_>) {
    let settings = frame.settings;
    let from = frame.state.mode;
    let wall_normal = match from {
        MovementMode::Custom(CustomMode::WallRun) => {
            wall_run_probe(frame, frame.state.wall_run_right).map(|hit| hit.normal)
        }
        _ => None,
    };

    let velocity = &mut frame.state.kinematics.velocity;
    velocity.y = velocity.y.max(settings.jump_z_velocity);
    set_mode(frame, MovementMode::Falling);

    match from {
        MovementMode::Custom(CustomMode::WallRun) => {
            if let Some(normal) = wall_normal {
                frame.state.kinematics.velocity += normal * settings.wall_jump_off_force;
            }
        }
        MovementMode::Custom(CustomMode::Hang | CustomMode::Climb) => {
            let push = Vec3::Y + safe_normal_2d(frame.acceleration);
            frame.state.kinematics.velocity += push * settings.wall_jump_force * 0.5;
            frame.events.push(SimEvent::PlayMontage {
                montage: Montage::WallJump,
                speed: 1.0,
            });
        }
        _ => {}
    }
    frame.events.push(SimEvent::Jumped);
}

/// Run the active mode's integrator, following exits into the next mode
/// with whatever time is left.
fn start_new_physics(frame: &mut PhysicsFrame<'_>, base: &dyn BaseMovement, delta_time: f32) {
    let mut remaining = delta_time;
    let mut switches = 0;
    while remaining >= MIN_TICK_TIME
        && frame.iterations < MAX_SIMULATION_ITERATIONS
        && switches <= MAX_SIMULATION_ITERATIONS
    {
        let signal = match frame.state.mode {
            MovementMode::None => return,
            MovementMode::Walking => base.phys_walking(frame, remaining),
            MovementMode::Falling => base.phys_falling(frame, remaining),
            MovementMode::Flying | MovementMode::Swimming => base.phys_flying(frame, remaining),
            MovementMode::Custom(custom) => custom_physics(custom)(frame, remaining),
        };
        match signal {
            ModeSignal::Stay => return,
            ModeSignal::Exit { to, remaining: left } => {
                set_mode(frame, to);
                remaining = left;
                switches += 1;
            }
        }
    }
}

fn update_after_movement(frame: &mut PhysicsFrame<'_>) {
    let state = &mut *frame.state;
    if let Some(handle) = state.root_motion {
        if state.forces.is_finished(handle) {
            state.forces.remove(handle);
            state.root_motion = None;
        }
    }

    let has_root_motion = state.has_root_motion();
    if !has_root_motion && state.had_root_motion && state.mode == MovementMode::Flying {
        set_mode(frame, MovementMode::Walking);
    }

    let state = &mut *frame.state;
    if let Some(context) = state.transition.context().copied() {
        if state.forces.is_finished(context.force) {
            if !state.forces.contains(context.force) {
                warn!("transition {:?} lost its force source", context.kind);
            }
            state.forces.remove(context.force);
            state.transition_finished = true;
        }
    }

    state.had_root_motion = has_root_motion;
    state.prev_crouch = frame.intent.crouch;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::{StaticGeometry, SurfacePatch};

    fn flat() -> StaticGeometry {
        StaticGeometry::new().with_patch(SurfacePatch::floor(1, Vec3::ZERO, 5000.0, 5000.0))
    }

    fn step(timestamp: f64, acceleration: Vec3) -> MoveStep {
        MoveStep {
            timestamp,
            delta_time: 1.0 / 60.0,
            acceleration,
        }
    }

    fn standing() -> CharacterState {
        CharacterState::new(Vec3::new(0.0, 90.15, 0.0), MovementMode::Walking)
    }

    #[test]
    fn test_walk_accelerates_to_max_speed() {
        let settings = MovementSettings::default();
        let world = flat();
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut state = standing();
        for tick in 0..120 {
            simulate_step(
                &mut state,
                MovementIntent::default(),
                step(tick as f64 / 60.0, Vec3::NEG_Z * settings.max_acceleration),
                &env,
            );
        }
        assert_eq!(state.mode, MovementMode::Walking);
        assert!((state.kinematics.horizontal_speed() - 600.0).abs() < 0.5);
        assert!((state.kinematics.location.y - 90.15).abs() < 0.5);
    }

    #[test]
    fn test_jump_and_land() {
        let settings = MovementSettings::default();
        let world = flat();
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut state = standing();
        let jump = MovementIntent {
            jump: true,
            ..Default::default()
        };

        let events = simulate_step(&mut state, jump, step(0.0, Vec3::ZERO), &env);
        assert!(events.contains(&SimEvent::Jumped));
        assert_eq!(state.mode, MovementMode::Falling);
        assert!(state.kinematics.location.y > 90.15);

        let mut landed = false;
        for tick in 1..120 {
            let events = simulate_step(&mut state, MovementIntent::default(), step(tick as f64 / 60.0, Vec3::ZERO), &env);
            landed |= events.contains(&SimEvent::Landed);
        }
        assert!(landed);
        assert_eq!(state.mode, MovementMode::Walking);
        assert!((state.kinematics.location.y - 90.15).abs() < 0.5);
    }

    #[test]
    fn test_no_jump_while_crouching() {
        let settings = MovementSettings::default();
        let world = flat();
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut state = standing();
        let crouch_jump = MovementIntent {
            jump: true,
            crouch: true,
            ..Default::default()
        };
        let events = simulate_step(&mut state, crouch_jump, step(0.0, Vec3::ZERO), &env);
        assert!(!events.contains(&SimEvent::Jumped));
        assert!(state.crouched);
        assert_eq!(state.mode, MovementMode::Walking);
    }

    #[test]
    fn test_dash_bursts_then_walks() {
        let settings = MovementSettings::default();
        let world = flat();
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut state = standing();
        let dash = MovementIntent {
            dash: true,
            ..Default::default()
        };

        let events = simulate_step(&mut state, dash, step(0.0, Vec3::X * settings.max_acceleration), &env);
        assert!(events.contains(&SimEvent::DashStarted));
        assert_eq!(state.mode, MovementMode::Flying);
        assert_eq!(state.last_dash_time, Some(0.0));
        assert!((state.kinematics.forward() - Vec3::X).length() < 1e-4);

        for tick in 1..40 {
            simulate_step(&mut state, MovementIntent::default(), step(tick as f64 / 60.0, Vec3::ZERO), &env);
        }
        assert_eq!(state.mode, MovementMode::Walking);
        assert!(state.root_motion.is_none());
        assert!(state.kinematics.location.x > 200.0);
    }

    #[test]
    fn test_authority_dash_cooldown() {
        let settings = MovementSettings::default();
        let world = flat();
        let env = SimEnv::new(&settings, &world, NetRole::Authority);
        let mut events = Vec::new();
        let dash = MovementIntent {
            dash: true,
            ..Default::default()
        };

        let mut state = standing();
        state.last_dash_time = Some(0.0);
        assert!(dash_permitted(&env.frame(&mut state, dash, Vec3::ZERO, 0.95, &mut events)));
        assert!(!dash_permitted(&env.frame(&mut state, dash, Vec3::ZERO, 0.5, &mut events)));

        let events = simulate_step(&mut state, dash, step(0.5, Vec3::ZERO), &env);
        assert!(events.contains(&SimEvent::DashRejected));
        assert_eq!(state.mode, MovementMode::Walking);

        let events = simulate_step(&mut state, dash, step(0.95, Vec3::ZERO), &env);
        assert!(events.contains(&SimEvent::DashStarted));
        assert_eq!(state.last_dash_time, Some(0.95));
    }

    #[test]
    fn test_exactly_one_mode_after_every_step() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let settings = MovementSettings::default();
        let world = StaticGeometry::proving_ground();
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut state = standing();
        let mut rng = StdRng::seed_from_u64(42);

        for tick in 0..600 {
            let intent = MovementIntent {
                jump: rng.random_bool(0.05),
                crouch: rng.random_bool(0.1),
                sprint: rng.random_bool(0.5),
                slide: rng.random_bool(0.2),
                dash: rng.random_bool(0.02),
                prone: rng.random_bool(0.02),
                climb: rng.random_bool(0.3),
                ..Default::default()
            };
            let direction = Vec3::new(rng.random_range(-1.0..=1.0), 0.0, rng.random_range(-1.0..=1.0));
            let acceleration = direction.clamp_length_max(1.0) * settings.max_acceleration;
            let events = simulate_step(&mut state, intent, step(tick as f64 / 60.0, acceleration), &env);

            // Every reported change leaves the state in the announced mode
            if let Some(SimEvent::ModeChanged { to, .. }) = events
                .iter()
                .rev()
                .find(|event| matches!(event, SimEvent::ModeChanged { .. }))
            {
                assert_eq!(*to, state.mode);
            }
            assert_ne!(state.mode, MovementMode::None);
            assert!(state.kinematics.location.is_finite());
            if state.transition.is_active() {
                assert_eq!(state.mode, MovementMode::Flying);
            }
        }
    }
}
