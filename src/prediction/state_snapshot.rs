use bevy::prelude::*;

use crate::movement::{CharacterState, MovementMode};

/// Complete predicted state right after the tick stamped `timestamp`.
///
/// Corrections only carry location, velocity, base and mode. The rest of the
/// corrected state (transition, forces, crouch) comes from this snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSnapshot {
    pub timestamp: f64,
    pub state: CharacterState,
}

impl StateSnapshot {
    pub fn capture(timestamp: f64, state: &CharacterState) -> Self {
        Self {
            timestamp,
            state: state.clone(),
        }
    }

    pub fn location(&self) -> Vec3 {
        self.state.kinematics.location
    }

    pub fn mode(&self) -> MovementMode {
        self.state.mode
    }

    /// Position error against another report of the same tick
    pub fn distance_to(&self, location: Vec3) -> f32 {
        self.location().distance(location)
    }

    pub fn velocity_difference(&self, other: &StateSnapshot) -> f32 {
        (self.state.kinematics.velocity - other.state.kinematics.velocity).length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_detached_from_source() {
        let mut state = CharacterState::new(Vec3::new(0.0, 90.0, 0.0), MovementMode::Walking);
        let snapshot = StateSnapshot::capture(0.5, &state);
        state.kinematics.location.x = 30.0;
        assert_eq!(snapshot.distance_to(state.kinematics.location), 30.0);
        assert_eq!(snapshot.mode(), MovementMode::Walking);
    }
}
