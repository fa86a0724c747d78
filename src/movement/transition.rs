use bevy::prelude::*;

use crate::game_logic::{
    HitResult, KINDA_SMALL_NUMBER, MovementSettings, PhysicsFrame, ProbeShape, WorldProbe,
    map_range_clamped, safe_normal_2d,
};
use crate::movement::{
    CharacterState, CustomMode, ForceApplication, ForceArena, ForceHandle, Montage, MovementMode,
    NetRole, SimEvent, set_mode,
};

/// Speed of the force-driven move onto the transition start, in cm/s
const TRANSITION_SPEED: f32 = 500.0;
const MIN_TRANSITION_DURATION: f32 = 0.1;
const MAX_TRANSITION_DURATION: f32 = 0.25;
/// Front probes are spread from step height up to the top of the capsule
const MANTLE_FRONT_PROBES: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    TallMantle,
    ShortMantle,
    Hang,
}

impl TransitionKind {
    pub fn is_mantle(self) -> bool {
        matches!(self, TransitionKind::TallMantle | TransitionKind::ShortMantle)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransitionContext {
    pub kind: TransitionKind,
    /// Where the character ends up once the follow-up montage has played
    pub target: Vec3,
    pub force: ForceHandle,
    pub queued_montage: Option<Montage>,
    pub queued_speed: f32,
}

/// Owns the in-flight transition, if any.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransitionController {
    context: Option<TransitionContext>,
}

impl TransitionController {
    pub fn is_active(&self) -> bool {
        self.context.is_some()
    }

    pub fn context(&self) -> Option<&TransitionContext> {
        self.context.as_ref()
    }

    pub fn begin(&mut self, context: TransitionContext) {
        self.context = Some(context);
    }

    pub fn take(&mut self) -> Option<TransitionContext> {
        self.context.take()
    }

    /// Drop the transition and the force source driving it.
    pub fn discard(&mut self, forces: &mut ForceArena) -> Option<TransitionContext> {
        let context = self.context.take()?;
        forces.remove(context.force);
        Some(context)
    }
}

/// Result of the mantle geometry probes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MantleProbe {
    pub front: HitResult,
    pub surface: HitResult,
    /// Height of the ledge above the character's feet
    pub height: f32,
    /// Capsule location standing on the ledge
    pub ledge_target: Vec3,
}

fn wall_up(normal: Vec3) -> Vec3 {
    (Vec3::Y - normal * normal.y).normalize_or_zero()
}

fn cos_degrees(angle: f32) -> f32 {
    angle.to_radians().cos()
}

/// Steep enough to climb over and facing the character closely enough.
pub fn is_mantle_wall(normal: Vec3, forward: Vec3, settings: &MovementSettings) -> bool {
    normal.y.abs() <= cos_degrees(settings.mantle_min_wall_steepness_angle)
        && forward.dot(-normal) >= cos_degrees(settings.mantle_max_alignment_angle)
}

pub fn is_mantle_surface(normal: Vec3, settings: &MovementSettings) -> bool {
    normal.y >= cos_degrees(settings.mantle_max_surface_angle)
}

pub fn probe_mantle(
    world: &dyn WorldProbe,
    state: &CharacterState,
    settings: &MovementSettings,
) -> Option<MantleProbe> {
    let location = state.kinematics.location;
    let half_height = state.half_height(settings);
    let radius = settings.capsule_radius;
    let forward = safe_normal_2d(state.kinematics.forward());
    let feet = location - Vec3::Y * half_height;
    let step = settings.max_step_height - 1.0;
    let max_height = half_height * 2.0 + settings.mantle_reach_height;

    // Front: stacked horizontal probes, lowest blocking one wins
    let check_distance = state
        .kinematics
        .velocity
        .dot(forward)
        .clamp(radius + 30.0, settings.mantle_max_distance);
    let probe_spacing = (half_height * 2.0 - step) / (MANTLE_FRONT_PROBES - 1) as f32;
    let front = (0..MANTLE_FRONT_PROBES).find_map(|i| {
        let start = feet + Vec3::Y * (step + probe_spacing * i as f32);
        world.trace(start, start + forward * check_distance, ProbeShape::Line)
    })?;
    if !is_mantle_wall(front.normal, forward, settings) {
        return None;
    }

    // Surface: trace back down along the wall face from above the reach
    let up = wall_up(front.normal);
    let wall_sin = (1.0 - front.normal.y * front.normal.y).max(0.0).sqrt();
    if wall_sin <= KINDA_SMALL_NUMBER {
        return None;
    }
    let surface_end = front.impact_point + forward;
    let surface_start = surface_end + up * (max_height - step) / wall_sin;
    let surface = world.trace(surface_start, surface_end, ProbeShape::Line)?;
    if !is_mantle_surface(surface.normal, settings) {
        return None;
    }
    let height = surface.impact_point.y - feet.y;
    if height > max_height {
        return None;
    }

    // Depth: there must still be acceptable ground this far past the edge
    let depth_point = surface.impact_point + forward * settings.min_mantle_depth;
    let depth_span = Vec3::Y * settings.max_step_height;
    let depth = world.trace(depth_point + depth_span, depth_point - depth_span, ProbeShape::Line)?;
    if !is_mantle_surface(depth.normal, settings) {
        return None;
    }

    // Clearance: the standing capsule has to fit on top
    let surface_sin = (1.0 - surface.normal.y * surface.normal.y).max(0.0).sqrt();
    let ledge_target = surface.impact_point
        + forward * radius
        + Vec3::Y * (half_height + 1.0 + radius * 2.0 * surface_sin);
    if world.overlaps(ledge_target, state.capsule(settings)) {
        return None;
    }

    Some(MantleProbe {
        front,
        surface,
        height,
        ledge_target,
    })
}

/// Where the character is pulled to before the climb-up montage. Tall
/// mantles start a full capsule height below the ledge.
pub fn mantle_start_location(
    probe: &MantleProbe,
    state: &CharacterState,
    settings: &MovementSettings,
    tall: bool,
) -> Vec3 {
    let half_height = state.half_height(settings);
    let radius = settings.capsule_radius;
    let wall_cos = probe.front.normal.y;
    let down = if tall {
        half_height * 2.0
    } else {
        settings.max_step_height - 1.0
    };
    let out = safe_normal_2d(probe.front.normal);
    let edge_tangent = probe.surface.normal.cross(probe.front.normal).normalize_or_zero();
    let forward = safe_normal_2d(state.kinematics.forward());

    probe.surface.impact_point
        + out * (2.0 + radius)
        + edge_tangent * forward.dot(edge_tangent) * radius * 0.3
        + Vec3::Y * half_height
        - out * wall_cos * down
        - Vec3::Y * down
}

fn transition_duration(from: Vec3, to: Vec3) -> f32 {
    (from.distance(to) / TRANSITION_SPEED).clamp(MIN_TRANSITION_DURATION, MAX_TRANSITION_DURATION)
}

fn begin_transition(frame: &mut PhysicsFrame<'_>, kind: TransitionKind, start: Vec3, target: Vec3) -> f32 {
    let location = frame.state.kinematics.location;
    let duration = transition_duration(location, start);
    let queued_speed = map_range_clamped(frame.state.kinematics.velocity.y, (-500.0, 750.0), (0.9, 1.2));

    frame.state.kinematics.velocity = Vec3::ZERO;
    set_mode(frame, MovementMode::Flying);

    let force = frame.state.forces.apply_force_move(location, start, duration);
    let queued_montage = match kind {
        TransitionKind::TallMantle => Some(Montage::TallMantle),
        TransitionKind::ShortMantle => Some(Montage::ShortMantle),
        TransitionKind::Hang => None,
    };
    frame.state.transition.begin(TransitionContext {
        kind,
        target,
        force,
        queued_montage,
        queued_speed,
    });
    frame.events.push(SimEvent::TransitionStarted(kind));
    debug!("transition {:?} to {:?} over {:.3}s", kind, start, duration);
    duration
}

pub fn try_mantle(frame: &mut PhysicsFrame<'_>) -> bool {
    let mode = frame.state.mode;
    let eligible = (mode == MovementMode::Walking && !frame.state.crouched) || mode == MovementMode::Falling;
    if !eligible {
        return false;
    }
    let Some(probe) = probe_mantle(frame.world, frame.state, frame.settings) else {
        return false;
    };

    let tall = match mode {
        MovementMode::Walking => probe.height > frame.half_height() * 2.0,
        _ => {
            frame.state.kinematics.velocity.y < 0.0
                && !frame.world.overlaps(
                    mantle_start_location(&probe, frame.state, frame.settings, true),
                    frame.shape(),
                )
        }
    };
    let start = mantle_start_location(&probe, frame.state, frame.settings, tall);

    let (kind, montage) = if tall {
        (TransitionKind::TallMantle, Montage::TransitionTallMantle)
    } else {
        (TransitionKind::ShortMantle, Montage::TransitionShortMantle)
    };
    let duration = begin_transition(frame, kind, start, probe.ledge_target);
    frame.events.push(SimEvent::PlayMontage {
        montage,
        speed: 1.0 / duration,
    });

    if frame.role == NetRole::Authority {
        let proxy = &mut frame.state.proxy;
        if tall {
            proxy.tall_mantle = !proxy.tall_mantle;
        } else {
            proxy.short_mantle = !proxy.short_mantle;
        }
    }
    true
}

pub fn try_hang(frame: &mut PhysicsFrame<'_>) -> bool {
    if frame.state.mode != MovementMode::Falling {
        return false;
    }
    let settings = frame.settings;
    let location = frame.state.kinematics.location;
    let forward = safe_normal_2d(frame.state.kinematics.forward());

    let Some(wall) = frame.line_trace(location, location + forward * settings.climb_reach_distance) else {
        return false;
    };
    if !is_mantle_wall(wall.normal, forward, settings) {
        return false;
    }

    let reach = frame.half_height() + settings.mantle_reach_height;
    let ledge_end = wall.impact_point + forward;
    let Some(ledge) = frame.line_trace(ledge_end + wall_up(wall.normal) * reach, ledge_end) else {
        return false;
    };
    if !is_mantle_surface(ledge.normal, settings) {
        return false;
    }

    let target = ledge.impact_point + safe_normal_2d(wall.normal) * (settings.capsule_radius + 2.0)
        - Vec3::Y * frame.half_height() * 0.5;
    if frame.world.overlaps(target, frame.shape()) {
        return false;
    }

    frame.state.kinematics.face(-wall.normal);
    let duration = begin_transition(frame, TransitionKind::Hang, target, target);
    frame.events.push(SimEvent::PlayMontage {
        montage: Montage::TransitionHang,
        speed: 1.0 / duration,
    });
    true
}

/// Runs on the step after the transition's force move finished.
pub fn complete_transition(frame: &mut PhysicsFrame<'_>) {
    frame.state.transition_finished = false;
    let Some(context) = frame.state.transition.take() else {
        return;
    };
    frame.events.push(SimEvent::TransitionFinished(context.kind));

    match (context.kind, context.queued_montage) {
        (TransitionKind::Hang, _) => {
            set_mode(frame, MovementMode::Custom(CustomMode::Hang));
            frame.state.kinematics.velocity = Vec3::ZERO;
        }
        (kind, Some(montage)) => {
            set_mode(frame, MovementMode::Flying);
            let speed = context.queued_speed.max(KINDA_SMALL_NUMBER);
            let length = if kind == TransitionKind::TallMantle {
                frame.settings.tall_mantle_duration
            } else {
                frame.settings.short_mantle_duration
            };

            // Up the wall first, then over the edge onto the ledge
            let location = frame.state.kinematics.location;
            let via = Vec3::new(location.x, context.target.y, location.z);
            let state = &mut *frame.state;
            if let Some(previous) = state.root_motion.take() {
                state.forces.remove(previous);
            }
            state.root_motion = Some(state.forces.apply_path(location, via, context.target, length / speed));
            frame.events.push(SimEvent::PlayMontage { montage, speed });
        }
        (_, None) => set_mode(frame, MovementMode::Walking),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::{NoWorld, StaticGeometry, SurfacePatch};
    use crate::movement::{MoveStep, MovementIntent, SimEnv, simulate_step};

    fn tick(state: &mut CharacterState, intent: MovementIntent, env: &SimEnv<'_>) -> Vec<SimEvent> {
        let step = MoveStep {
            timestamp: 0.0,
            delta_time: 1.0 / 60.0,
            acceleration: Vec3::ZERO,
        };
        simulate_step(state, intent, step, env)
    }

    fn frame_for<'a>(
        state: &'a mut CharacterState,
        settings: &'a MovementSettings,
        world: &'a dyn WorldProbe,
        events: &'a mut Vec<SimEvent>,
    ) -> PhysicsFrame<'a> {
        PhysicsFrame {
            state,
            intent: MovementIntent::default(),
            acceleration: Vec3::ZERO,
            settings,
            world,
            role: NetRole::AutonomousProxy,
            now: 0.0,
            root_motion_velocity: None,
            iterations: 0,
            events,
        }
    }

    /// A wall leaning back 10 degrees with its top edge at 100cm, topped by a
    /// ledge rising 20 degrees away from the character.
    fn leaning_ledge(depth: f32) -> StaticGeometry {
        let wall_normal = Vec3::new(0.0, 80f32.to_radians().cos(), 80f32.to_radians().sin());
        let wall = SurfacePatch::wall(1, Vec3::new(0.0, 50.0, -58.78), wall_normal, 200.0, 50.77);

        let top_normal = Vec3::new(0.0, 20f32.to_radians().cos(), 20f32.to_radians().sin());
        let along = top_normal.cross(Vec3::X);
        let edge = Vec3::new(0.0, 100.0, -67.6);
        let top = SurfacePatch::new(2, edge + along * depth * 0.5, top_normal, Vec3::X, 200.0, depth * 0.5);

        StaticGeometry::new().with_patch(wall).with_patch(top)
    }

    fn falling_at_wall() -> CharacterState {
        CharacterState::new(Vec3::new(0.0, 88.0, 0.0), MovementMode::Falling)
    }

    #[test]
    fn test_mantle_over_deep_enough_ledge() {
        let settings = MovementSettings::default();
        let world = leaning_ledge(35.0);
        let mut state = falling_at_wall();
        let mut events = Vec::new();
        let mut frame = frame_for(&mut state, &settings, &world, &mut events);

        assert!(try_mantle(&mut frame));
        assert_eq!(state.mode, MovementMode::Flying);
        assert_eq!(state.kinematics.velocity, Vec3::ZERO);
        let context = state.transition.context().copied().expect("transition started");
        assert_eq!(context.kind, TransitionKind::ShortMantle);
        assert_eq!(context.queued_montage, Some(Montage::ShortMantle));
        assert!(state.forces.contains(context.force));
        assert!(events.contains(&SimEvent::TransitionStarted(TransitionKind::ShortMantle)));
    }

    #[test]
    fn test_mantle_rejects_shallow_ledge_without_side_effects() {
        let settings = MovementSettings::default();
        let world = leaning_ledge(25.0);
        let mut state = falling_at_wall();
        let before = state.clone();
        let mut events = Vec::new();
        let mut frame = frame_for(&mut state, &settings, &world, &mut events);

        assert!(!try_mantle(&mut frame));
        assert_eq!(state, before);
        assert!(events.is_empty());
    }

    #[test]
    fn test_mantle_probe_measures_ledge() {
        let settings = MovementSettings::default();
        let probe = probe_mantle(&leaning_ledge(35.0), &falling_at_wall(), &settings).expect("ledge");
        assert!((probe.height - 100.4).abs() < 1.0);
        assert!(probe.ledge_target.y > probe.surface.impact_point.y + 88.0);
        assert!(probe.ledge_target.z < probe.surface.impact_point.z);
    }

    #[test]
    fn test_no_mantle_in_empty_world_or_when_crouched() {
        let settings = MovementSettings::default();
        let mut state = falling_at_wall();
        let mut events = Vec::new();
        assert!(!try_mantle(&mut frame_for(&mut state, &settings, &NoWorld, &mut events)));

        let world = leaning_ledge(35.0);
        let mut crouched = CharacterState::new(Vec3::new(0.0, 88.0, 0.0), MovementMode::Walking);
        crouched.crouched = true;
        assert!(!try_mantle(&mut frame_for(&mut crouched, &settings, &world, &mut events)));
    }

    #[test]
    fn test_discard_removes_force() {
        let mut forces = ForceArena::default();
        let force = forces.apply_force_move(Vec3::ZERO, Vec3::Y, 0.2);
        let mut controller = TransitionController::default();
        controller.begin(TransitionContext {
            kind: TransitionKind::Hang,
            target: Vec3::Y,
            force,
            queued_montage: None,
            queued_speed: 1.0,
        });
        assert!(controller.discard(&mut forces).is_some());
        assert!(!controller.is_active());
        assert!(!forces.contains(force));
    }

    #[test]
    fn test_mantle_runs_to_completion_onto_ledge() {
        let settings = MovementSettings::default();
        let world = StaticGeometry::proving_ground();
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);

        // Standing just in front of the 120cm ledge, facing it
        let mut state = CharacterState::new(Vec3::new(0.0, 90.15, -740.0), MovementMode::Walking);
        let dt = 1.0 / 60.0;
        let mut now = 0.0;
        let mut all_events = Vec::new();
        let jump = MovementIntent {
            jump: true,
            ..Default::default()
        };
        for tick in 0..180 {
            let intent = if tick == 0 { jump } else { MovementIntent::default() };
            let step = MoveStep {
                timestamp: now,
                delta_time: dt,
                acceleration: Vec3::ZERO,
            };
            all_events.extend(simulate_step(&mut state, intent, step, &env));
            now += dt as f64;
        }

        assert!(all_events.contains(&SimEvent::TransitionFinished(TransitionKind::ShortMantle)));
        assert!(all_events.contains(&SimEvent::PlayMontage {
            montage: Montage::ShortMantle,
            speed: map_range_clamped(0.0, (-500.0, 750.0), (0.9, 1.2)),
        }));
        assert_eq!(state.mode, MovementMode::Walking);
        assert!(!state.transition.is_active());
        assert!(state.kinematics.location.z < -800.0);
        assert!(state.kinematics.location.y > 120.0 + 80.0);
    }

    #[test]
    fn test_mode_change_cancels_transition() {
        let settings = MovementSettings::default();
        let world = leaning_ledge(35.0);
        let mut state = falling_at_wall();
        let mut events = Vec::new();
        let mut frame = frame_for(&mut state, &settings, &world, &mut events);

        assert!(try_mantle(&mut frame));
        let force = frame.state.transition.context().expect("transition started").force;
        set_mode(&mut frame, MovementMode::Walking);

        assert_eq!(state.mode, MovementMode::Walking);
        assert!(!state.transition.is_active());
        assert!(!state.forces.contains(force));
        assert!(events.contains(&SimEvent::ModeChanged {
            from: MovementMode::Flying,
            to: MovementMode::Walking,
        }));
    }

    #[test]
    fn test_lost_force_source_finishes_transition() {
        let settings = MovementSettings::default();
        let world = leaning_ledge(35.0);
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut state = falling_at_wall();
        let mut events = Vec::new();
        assert!(try_mantle(&mut frame_for(&mut state, &settings, &world, &mut events)));
        let force = state.transition.context().expect("transition started").force;
        assert!(state.forces.remove(force));

        let events = tick(&mut state, MovementIntent::default(), &env);
        assert!(state.transition_finished);
        assert!(state.transition.is_active());
        assert!(!events.contains(&SimEvent::TransitionFinished(TransitionKind::ShortMantle)));

        let events = tick(&mut state, MovementIntent::default(), &env);
        assert!(events.contains(&SimEvent::TransitionFinished(TransitionKind::ShortMantle)));
        assert!(!state.transition.is_active());
        assert!(!state.transition_finished);
        assert!(state.has_root_motion());
    }

    #[test]
    fn test_tall_ledge_from_walking() {
        let settings = MovementSettings::default();
        // 200cm ledge, taller than the standing capsule
        let world = StaticGeometry::new()
            .with_patch(SurfacePatch::floor(1, Vec3::ZERO, 5000.0, 5000.0))
            .with_patch(SurfacePatch::wall(2, Vec3::new(0.0, 100.0, -800.0), Vec3::Z, 300.0, 100.0))
            .with_patch(SurfacePatch::floor(3, Vec3::new(0.0, 200.0, -1000.0), 300.0, 200.0));
        let mut state = CharacterState::new(Vec3::new(0.0, 90.15, -740.0), MovementMode::Walking);
        let mut events = Vec::new();
        let mut frame = frame_for(&mut state, &settings, &world, &mut events);
        frame.role = NetRole::Authority;

        assert!(try_mantle(&mut frame));
        let context = state.transition.context().copied().expect("transition started");
        assert_eq!(context.kind, TransitionKind::TallMantle);
        assert_eq!(context.queued_montage, Some(Montage::TallMantle));
        assert!(state.proxy.tall_mantle);
        assert!(!state.proxy.short_mantle);
        assert!(events.contains(&SimEvent::TransitionStarted(TransitionKind::TallMantle)));
        assert!(events.iter().any(|event| matches!(
            event,
            SimEvent::PlayMontage {
                montage: Montage::TransitionTallMantle,
                ..
            }
        )));
    }

    #[test]
    fn test_hang_runs_to_completion() {
        let settings = MovementSettings::default();
        // 300cm wall topped by a ledge, nothing underneath
        let world = StaticGeometry::new()
            .with_patch(SurfacePatch::wall(1, Vec3::new(0.0, 150.0, -100.0), Vec3::Z, 300.0, 150.0))
            .with_patch(SurfacePatch::floor(2, Vec3::new(0.0, 300.0, -175.0), 300.0, 75.0));
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut state = CharacterState::new(Vec3::new(0.0, 250.0, -30.0), MovementMode::Falling);
        let climb = MovementIntent {
            climb: true,
            ..Default::default()
        };

        let mut all_events = Vec::new();
        for _ in 0..30 {
            all_events.extend(tick(&mut state, climb, &env));
        }

        assert!(all_events.contains(&SimEvent::TransitionStarted(TransitionKind::Hang)));
        assert!(all_events.iter().any(|event| matches!(
            event,
            SimEvent::PlayMontage {
                montage: Montage::TransitionHang,
                ..
            }
        )));
        assert!(all_events.contains(&SimEvent::TransitionFinished(TransitionKind::Hang)));
        assert_eq!(state.mode, MovementMode::Custom(CustomMode::Hang));
        assert!(!state.transition.is_active());
        assert_eq!(state.kinematics.velocity, Vec3::ZERO);
        assert!(state.kinematics.location.distance(Vec3::new(0.0, 256.0, -65.0)) < 0.5);
    }
}
