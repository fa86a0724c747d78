use bevy::prelude::*;

use crate::game_logic::{Kinematics, MovementBase, MovementSettings, ProbeShape};
use crate::movement::{CustomMode, ForceArena, ForceHandle, MovementMode, ProxyFlags, TransitionController};

/// Which side of the connection is simulating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NetRole {
    /// The owning client predicting its own character
    #[default]
    AutonomousProxy,
    /// The server replaying a client's moves
    Authority,
}

/// Full replayable state of one character. Two copies that compare equal
/// produce equal results for the same intent and world.
#[derive(Clone, Debug, PartialEq)]
pub struct CharacterState {
    pub kinematics: Kinematics,
    pub mode: MovementMode,
    pub crouched: bool,
    pub base: Option<MovementBase>,
    pub orient_rotation_to_movement: bool,

    pub prev_crouch: bool,
    pub had_root_motion: bool,
    pub transition_finished: bool,
    pub wall_run_right: bool,
    /// Set on entering prone; cleared by a crouch release or another prone press
    pub prone_latched: bool,

    pub last_dash_time: Option<f64>,
    /// Animation-driven movement (dash burst, mantle climb-up)
    pub root_motion: Option<ForceHandle>,
    pub transition: TransitionController,
    pub forces: ForceArena,
    pub proxy: ProxyFlags,
}

impl Default for CharacterState {
    fn default() -> Self {
        Self {
            kinematics: Kinematics::default(),
            mode: MovementMode::None,
            crouched: false,
            base: None,
            orient_rotation_to_movement: true,
            prev_crouch: false,
            had_root_motion: false,
            transition_finished: false,
            wall_run_right: false,
            prone_latched: false,
            last_dash_time: None,
            root_motion: None,
            transition: TransitionController::default(),
            forces: ForceArena::default(),
            proxy: ProxyFlags::default(),
        }
    }
}

impl CharacterState {
    pub fn new(location: Vec3, mode: MovementMode) -> Self {
        Self {
            kinematics: Kinematics::at(location),
            mode,
            ..Default::default()
        }
    }

    pub fn half_height(&self, settings: &MovementSettings) -> f32 {
        if self.crouched {
            settings.crouched_half_height
        } else {
            settings.capsule_half_height
        }
    }

    pub fn capsule(&self, settings: &MovementSettings) -> ProbeShape {
        ProbeShape::Capsule {
            radius: settings.capsule_radius,
            half_height: self.half_height(settings),
        }
    }

    pub fn is_moving_on_ground(&self) -> bool {
        self.mode.is_moving_on_ground()
    }

    pub fn has_root_motion(&self) -> bool {
        self.root_motion.is_some_and(|handle| self.forces.contains(handle))
    }

    /// Overwrite the replicated part of the state with authoritative values.
    /// A different mode invalidates anything mode-specific in flight.
    pub fn apply_authoritative(
        &mut self,
        location: Vec3,
        velocity: Vec3,
        base: Option<MovementBase>,
        mode: MovementMode,
    ) {
        self.kinematics.location = location;
        self.kinematics.velocity = velocity;
        self.base = base;
        if self.mode != mode {
            self.transition.discard(&mut self.forces);
            self.root_motion = None;
            self.forces.clear();
            self.transition_finished = false;
            self.prone_latched = mode == MovementMode::Custom(CustomMode::Prone);
            self.mode = mode;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::ForceApplication;

    #[test]
    fn test_capsule_follows_crouch() {
        let settings = MovementSettings::default();
        let mut state = CharacterState::new(Vec3::Y * 90.0, MovementMode::Walking);
        assert_eq!(state.half_height(&settings), 88.0);
        state.crouched = true;
        assert_eq!(
            state.capsule(&settings),
            ProbeShape::Capsule {
                radius: 34.0,
                half_height: 44.0
            }
        );
    }

    #[test]
    fn test_authoritative_mode_change_drops_forces() {
        let mut state = CharacterState::new(Vec3::ZERO, MovementMode::Flying);
        let handle = state.forces.apply_burst(Vec3::X * 1000.0, 0.25);
        state.root_motion = Some(handle);
        assert!(state.has_root_motion());

        state.apply_authoritative(Vec3::ONE, Vec3::ZERO, None, MovementMode::Walking);
        assert_eq!(state.mode, MovementMode::Walking);
        assert!(!state.has_root_motion());
        assert!(state.forces.is_finished(handle));

        // Same mode keeps the in-flight state
        let mut sliding = CharacterState::new(Vec3::ZERO, MovementMode::Custom(CustomMode::Slide));
        sliding.crouched = true;
        sliding.apply_authoritative(Vec3::X, Vec3::ZERO, None, MovementMode::Custom(CustomMode::Slide));
        assert!(sliding.crouched);
        assert_eq!(sliding.kinematics.location, Vec3::X);
    }

    #[test]
    fn test_authoritative_prone_is_latched() {
        let mut state = CharacterState::new(Vec3::ZERO, MovementMode::Walking);
        state.apply_authoritative(Vec3::ZERO, Vec3::ZERO, None, MovementMode::Custom(CustomMode::Prone));
        assert!(state.prone_latched);

        state.apply_authoritative(Vec3::ZERO, Vec3::ZERO, None, MovementMode::Walking);
        assert!(!state.prone_latched);
    }
}
