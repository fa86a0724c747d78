pub mod climb;
pub mod hang;
pub mod prone;
pub mod slide;
pub mod wall_run;

pub use climb::*;
pub use hang::*;
pub use prone::*;
pub use slide::*;
pub use wall_run::*;

use crate::game_logic::{ModeSignal, PhysicsFrame};
use crate::movement::CustomMode;

pub type CustomPhysics = fn(&mut PhysicsFrame<'_>, f32) -> ModeSignal;

/// Integrator per custom submode, indexed by [`CustomMode::index`].
pub const CUSTOM_PHYSICS: [CustomPhysics; 5] = [
    phys_slide,
    phys_prone,
    phys_wall_run,
    phys_hang,
    phys_climb,
];

pub fn custom_physics(mode: CustomMode) -> CustomPhysics {
    CUSTOM_PHYSICS[mode.index()]
}
