pub mod components;
pub mod constants;
pub mod geometry;
pub mod physics;
pub mod probe;
pub mod settings;

pub use components::*;
pub use constants::*;
pub use geometry::*;
pub use physics::*;
pub use probe::*;
pub use settings::*;
