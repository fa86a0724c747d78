pub mod link;
pub mod types;

pub use link::*;
pub use types::*;
