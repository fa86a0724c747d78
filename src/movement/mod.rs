pub mod component;
pub mod dash;
pub mod events;
pub mod flags;
pub mod force;
pub mod integrators;
pub mod intent;
pub mod mode;
pub mod saved_move;
pub mod scheduler;
pub mod state;
pub mod state_machine;
pub mod transition;

pub use component::*;
pub use dash::*;
pub use events::*;
pub use flags::*;
pub use force::*;
pub use integrators::*;
pub use intent::*;
pub use mode::*;
pub use saved_move::*;
pub use scheduler::*;
pub use state::*;
pub use state_machine::*;
pub use transition::*;
