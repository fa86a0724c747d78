use bevy::prelude::*;

use crate::game_logic::{ModeSignal, PhysicsFrame, ProbeShape, phys_walking};
use crate::movement::{CustomMode, MovementMode, set_mode};

pub fn try_prone(frame: &mut PhysicsFrame<'_>) -> bool {
    if !frame.intent.prone {
        return false;
    }
    let from_slide = frame.state.mode == MovementMode::Custom(CustomMode::Slide);
    let crouch_walking = frame.state.mode == MovementMode::Walking && frame.state.crouched;
    if !from_slide && !crouch_walking {
        return false;
    }
    set_mode(frame, MovementMode::Custom(CustomMode::Prone));
    true
}

/// Room to stand up from a crouched capsule resting on the ground.
pub fn has_standing_clearance(frame: &PhysicsFrame<'_>) -> bool {
    let settings = frame.settings;
    let grow = settings.capsule_half_height - frame.half_height();
    let standing = ProbeShape::Capsule {
        radius: settings.capsule_radius,
        half_height: settings.capsule_half_height,
    };
    !frame
        .world
        .overlaps(frame.state.kinematics.location + Vec3::Y * grow, standing)
}

/// Prone holds until unlatched, then stands as soon as there is room.
pub fn phys_prone(frame: &mut PhysicsFrame<'_>, delta_time: f32) -> ModeSignal {
    if !frame.state.prone_latched && has_standing_clearance(frame) {
        return ModeSignal::Exit {
            to: MovementMode::Walking,
            remaining: delta_time,
        };
    }
    // Walking rules with the prone speed cap and braking
    phys_walking(frame, delta_time)
}
