use bevy::prelude::*;

use crate::game_logic::{ModeSignal, PhysicsFrame, safe_normal_2d};
use crate::movement::MovementMode;

/// Hold still against the wall until the climb intent is released or the
/// wall disappears.
pub fn phys_hang(frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal {
    let location = frame.state.kinematics.location;
    let forward = safe_normal_2d(frame.state.kinematics.forward());
    let reach = frame.settings.climb_reach_distance;
    let gripping = frame.intent.climb && frame.line_trace(location, location + forward * reach).is_some();
    if !gripping {
        return ModeSignal::Exit {
            to: MovementMode::Falling,
            remaining: delta_time,
        };
    }
    frame.iterations += 1;
    frame.state.kinematics.velocity = Vec3::ZERO;
    ModeSignal::Stay
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::{MovementSettings, StaticGeometry, SurfacePatch};
    use crate::movement::{CharacterState, CustomMode, MovementIntent, NetRole, SimEnv};

    #[test]
    fn test_hang_holds_until_released() {
        let settings = MovementSettings::default();
        let world = StaticGeometry::new().with_patch(SurfacePatch::wall(
            1,
            Vec3::new(0.0, 200.0, -50.0),
            Vec3::Z,
            200.0,
            200.0,
        ));
        let env = SimEnv::new(&settings, &world, NetRole::AutonomousProxy);
        let mut state = CharacterState::new(Vec3::new(0.0, 200.0, 0.0), MovementMode::Custom(CustomMode::Hang));
        state.kinematics.velocity = Vec3::Y * 50.0;
        let mut events = Vec::new();

        let holding = MovementIntent {
            climb: true,
            ..Default::default()
        };
        let mut frame = env.frame(&mut state, holding, Vec3::ZERO, 0.0, &mut events);
        assert_eq!(phys_hang(&mut frame, 1.0 / 60.0), ModeSignal::Stay);
        assert_eq!(state.kinematics.velocity, Vec3::ZERO);

        let mut frame = env.frame(&mut state, MovementIntent::default(), Vec3::ZERO, 0.0, &mut events);
        assert!(matches!(
            phys_hang(&mut frame, 1.0 / 60.0),
            ModeSignal::Exit {
                to: MovementMode::Falling,
                ..
            }
        ));
    }
}
