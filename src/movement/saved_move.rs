use bevy::prelude::*;

use crate::game_logic::{Kinematics, MovementBase};
use crate::movement::{
    CharacterState, CompressedFlags, ExtendedFlags, MovementIntent, MovementMode, encode,
    encode_extended,
};

/// One simulated tick: the only inputs besides the intent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveStep {
    pub timestamp: f64,
    pub delta_time: f32,
    pub acceleration: Vec3,
}

/// Immutable record of one or more ticks of input and their outcome.
///
/// Combined moves keep every step, so replaying a combined move runs exactly
/// the ticks the originating side ran.
#[derive(Clone, Debug, PartialEq)]
pub struct SavedMove {
    pub timestamp: f64,
    pub delta_time: f32,
    pub acceleration: Vec3,
    pub intent: MovementIntent,
    pub flags: CompressedFlags,
    pub extended: ExtendedFlags,
    pub start: Kinematics,
    pub end: Kinematics,
    pub start_mode: MovementMode,
    pub end_mode: MovementMode,
    pub end_base: Option<MovementBase>,
    pub steps: Vec<MoveStep>,
}

impl SavedMove {
    /// Record a tick from the state before and after it ran.
    pub fn capture(
        pre: &CharacterState,
        intent: MovementIntent,
        step: MoveStep,
        post: &CharacterState,
    ) -> Self {
        let intent = intent.with_mirrored(pre);
        Self {
            timestamp: step.timestamp,
            delta_time: step.delta_time,
            acceleration: step.acceleration,
            intent,
            flags: CompressedFlags::from_bits_truncate(encode(&intent)),
            extended: ExtendedFlags::from_bits_truncate(encode_extended(&intent)),
            start: pre.kinematics,
            end: post.kinematics,
            start_mode: pre.mode,
            end_mode: post.mode,
            end_base: post.base,
            steps: vec![step],
        }
    }

    pub fn last_timestamp(&self) -> f64 {
        self.steps.last().map_or(self.timestamp, |step| step.timestamp)
    }

    /// Whether `next` may be folded into this move without changing what
    /// either side simulates.
    pub fn can_combine(&self, next: &SavedMove, max_delta: f64) -> bool {
        self.flags == next.flags
            && self.intent.player_bits() == next.intent.player_bits()
            && self.end_mode == next.start_mode
            && next.timestamp - self.timestamp <= max_delta
    }

    pub fn combine(&mut self, next: SavedMove) {
        self.delta_time += next.delta_time;
        self.acceleration = next.acceleration;
        self.end = next.end;
        self.end_mode = next.end_mode;
        self.end_base = next.end_base;
        self.steps.extend(next.steps);
    }

    /// Restore the mirrored state bits recorded with this move and return
    /// the intent to replay it with.
    pub fn apply_flags(&self, state: &mut CharacterState) -> MovementIntent {
        apply_intent(self.intent, state)
    }
}

pub fn apply_intent(intent: MovementIntent, state: &mut CharacterState) -> MovementIntent {
    state.prev_crouch = intent.prev_crouch;
    state.had_root_motion = intent.had_root_motion;
    state.transition_finished = intent.transition_finished;
    state.wall_run_right = intent.wall_run_right;
    intent
}

/// What the authority knows about a received move.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerMove {
    pub steps: Vec<MoveStep>,
    pub intent: MovementIntent,
    pub client_location: Vec3,
    /// None when the client sent a mode byte we do not understand
    pub client_mode: Option<MovementMode>,
    pub client_base: Option<MovementBase>,
}

impl ServerMove {
    pub fn timestamp(&self) -> f64 {
        self.steps.first().map_or(0.0, |step| step.timestamp)
    }

    pub fn last_timestamp(&self) -> f64 {
        self.steps.last().map_or(0.0, |step| step.timestamp)
    }
}

impl From<&SavedMove> for ServerMove {
    fn from(saved: &SavedMove) -> Self {
        Self {
            steps: saved.steps.clone(),
            intent: saved.intent,
            client_location: saved.end.location,
            client_mode: Some(saved.end_mode),
            client_base: saved.end_base,
        }
    }
}
