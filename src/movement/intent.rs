use bevy::prelude::*;

use crate::movement::CharacterState;

/// Raw buttons and stick direction sampled once per tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlayerInput {
    /// World-space planar direction, length at most 1
    pub move_direction: Vec3,
    pub jump: bool,
    pub crouch: bool,
    pub sprint: bool,
    pub slide: bool,
    pub dash: bool,
    pub prone: bool,
    pub climb: bool,
}

/// Everything the simulation needs to know about what the player wants this
/// tick. Built once per tick and never mutated afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MovementIntent {
    pub jump: bool,
    pub crouch: bool,
    pub sprint: bool,
    pub slide: bool,
    pub dash: bool,
    pub prone: bool,
    pub climb: bool,

    // Mirrored from simulation state when the move is captured
    pub prev_crouch: bool,
    pub had_root_motion: bool,
    pub transition_finished: bool,
    pub wall_run_right: bool,
}

impl MovementIntent {
    /// Copy the mirrored state bits so the move can be replayed elsewhere.
    pub fn with_mirrored(mut self, state: &CharacterState) -> Self {
        self.prev_crouch = state.prev_crouch;
        self.had_root_motion = state.had_root_motion;
        self.transition_finished = state.transition_finished;
        self.wall_run_right = state.wall_run_right;
        self
    }

    /// Only the bits the player controls.
    pub fn player_bits(&self) -> Self {
        Self {
            jump: self.jump,
            crouch: self.crouch,
            sprint: self.sprint,
            slide: self.slide,
            dash: self.dash,
            prone: self.prone,
            climb: self.climb,
            ..Default::default()
        }
    }
}
