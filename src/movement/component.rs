use bevy::prelude::*;

use crate::game_logic::{MovementSettings, WorldProbe};
use crate::movement::{
    AnimationLog, AnimationSink, CharacterState, CustomMode, DashController, DashPhase, DashRequest,
    EventSink, MovementIntent, MovementListeners, MovementMode, MoveStep, NetRole, PlayerInput,
    SavedMove, ScheduleToken, ScheduledAction, Scheduler, ServerMove, SimEnv, SimEvent,
    TimerQueue, apply_intent, simulate_step,
};

/// One simulated character plus the input-side machinery around it: button
/// edges, the prone-hold timer, dash retries and event observers.
///
/// Only `state` is replayed. Everything else shapes the intent of future
/// ticks and is never part of a correction.
pub struct MovementComponent {
    pub state: CharacterState,
    settings: MovementSettings,
    role: NetRole,
    timers: TimerQueue,
    dash: DashController,
    prone_hold: Option<ScheduleToken>,
    pending_dash: bool,
    pending_prone: bool,
    prev_input: PlayerInput,
    listeners: MovementListeners,
    animation: AnimationLog,
    time: f64,
}

impl MovementComponent {
    pub fn new(state: CharacterState, settings: MovementSettings, role: NetRole) -> Self {
        Self {
            state,
            dash: DashController::new(&settings),
            settings,
            role,
            timers: TimerQueue::default(),
            prone_hold: None,
            pending_dash: false,
            pending_prone: false,
            prev_input: PlayerInput::default(),
            listeners: MovementListeners::default(),
            animation: AnimationLog::default(),
            time: 0.0,
        }
    }

    pub fn settings(&self) -> &MovementSettings {
        &self.settings
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    /// Simulation clock: the timestamp the next tick will carry.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn current_mode(&self) -> MovementMode {
        self.state.mode
    }

    pub fn is_in_mode(&self, mode: MovementMode) -> bool {
        self.state.mode == mode
    }

    pub fn dash_phase(&self) -> DashPhase {
        self.dash.phase(self.time, self.state.last_dash_time)
    }

    pub fn animation(&self) -> &AnimationLog {
        &self.animation
    }

    pub fn add_listener(&mut self, sink: impl EventSink + Send + Sync + 'static) {
        self.listeners.add(sink);
    }

    /// Fold the raw input and any timers due by now into this tick's intent.
    pub fn build_intent(&mut self, input: &PlayerInput) -> MovementIntent {
        let now = self.time;
        for (token, action) in self.timers.advance(now) {
            match action {
                ScheduledAction::EnterProne => {
                    if self.prone_hold == Some(token) {
                        self.prone_hold = None;
                        self.pending_prone = true;
                    }
                }
                ScheduledAction::DashRetry => {
                    if self.dash.retry_fired(token) {
                        self.pending_dash = true;
                    }
                }
            }
        }

        let prev = self.prev_input;
        if input.dash && !prev.dash {
            let request = self.dash.start_dash(now, self.state.last_dash_time, &mut self.timers);
            if request == DashRequest::Execute {
                self.pending_dash = true;
            }
        } else if !input.dash && prev.dash {
            self.dash.stop_dash(&mut self.timers);
            self.pending_dash = false;
        }

        if input.crouch && !prev.crouch && self.state.mode == MovementMode::Walking {
            let hold = self.settings.prone_enter_hold_duration as f64;
            self.prone_hold = Some(self.timers.schedule(hold, ScheduledAction::EnterProne));
        } else if !input.crouch && prev.crouch {
            self.cancel_prone_hold();
        }
        if input.prone && !prev.prone {
            self.pending_prone = true;
        }
        self.prev_input = *input;

        MovementIntent {
            jump: input.jump && !prev.jump,
            crouch: input.crouch,
            sprint: input.sprint,
            slide: input.slide,
            dash: self.pending_dash,
            prone: self.pending_prone,
            climb: input.climb,
            ..Default::default()
        }
    }

    /// Run one locally controlled tick and return the move that records it.
    pub fn advance_tick(&mut self, input: &PlayerInput, delta_time: f32, world: &dyn WorldProbe) -> SavedMove {
        let intent = self.build_intent(input);
        let step = MoveStep {
            timestamp: self.time,
            delta_time,
            acceleration: input.move_direction.clamp_length_max(1.0) * self.settings.max_acceleration,
        };

        let pre = self.state.clone();
        let events = self.simulate(intent, step, world);
        self.after_tick(&events);
        self.time += delta_time as f64;

        SavedMove::capture(&pre, intent, step, &self.state)
    }

    /// Authority side: run a received move from the current state.
    pub fn perform_server_move(&mut self, server_move: &ServerMove, world: &dyn WorldProbe) -> Vec<SimEvent> {
        let intent = apply_intent(server_move.intent, &mut self.state);
        let mut events = Vec::new();
        for step in &server_move.steps {
            events.extend(self.simulate(intent, *step, world));
            self.time = step.timestamp + step.delta_time as f64;
        }
        events
    }

    /// Re-simulate a recorded move without firing observers or moving the
    /// clock.
    pub fn replay(&mut self, saved: &SavedMove, world: &dyn WorldProbe) {
        let intent = saved.apply_flags(&mut self.state);
        for step in &saved.steps {
            self.replay_step(intent, *step, world);
        }
    }

    pub fn replay_step(&mut self, intent: MovementIntent, step: MoveStep, world: &dyn WorldProbe) -> Vec<SimEvent> {
        let env = SimEnv::new(&self.settings, world, self.role);
        simulate_step(&mut self.state, intent, step, &env)
    }

    /// Tear down anything that could fire or move the character later.
    pub fn shutdown(&mut self) {
        self.dash.stop_dash(&mut self.timers);
        self.timers.cancel_all();
        self.prone_hold = None;
        self.pending_dash = false;
        self.pending_prone = false;

        let state = &mut self.state;
        state.transition.discard(&mut state.forces);
        state.forces.clear();
        state.root_motion = None;
        state.transition_finished = false;
        debug!("movement component shut down at {:.3}", self.time);
    }

    fn simulate(&mut self, intent: MovementIntent, step: MoveStep, world: &dyn WorldProbe) -> Vec<SimEvent> {
        let env = SimEnv::new(&self.settings, world, self.role);
        let events = simulate_step(&mut self.state, intent, step, &env);
        self.listeners.dispatch(&events);
        for event in &events {
            if let SimEvent::PlayMontage { montage, speed } = *event {
                self.animation.play(montage, speed);
            }
        }
        events
    }

    fn after_tick(&mut self, events: &[SimEvent]) {
        if events
            .iter()
            .any(|event| matches!(event, SimEvent::DashStarted | SimEvent::DashRejected))
        {
            self.pending_dash = false;
        }
        self.pending_prone = false;

        let can_still_go_prone = matches!(
            self.state.mode,
            MovementMode::Walking | MovementMode::Custom(CustomMode::Slide)
        );
        if !can_still_go_prone {
            self.cancel_prone_hold();
        }
    }

    fn cancel_prone_hold(&mut self) {
        if let Some(token) = self.prone_hold.take() {
            self.timers.cancel(token);
        }
    }
}
