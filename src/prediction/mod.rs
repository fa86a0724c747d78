// Client-side prediction with server reconciliation:
// 1. Client simulates every tick locally and buffers the moves it sends
// 2. Server re-runs each move from its own state and compares the result
// 3. On divergence the server sends a correction, the client rewinds and replays

pub mod client_prediction;
pub mod move_buffer;
pub mod reconciliation;
pub mod state_snapshot;
pub mod stats;

pub use client_prediction::ClientPrediction;
pub use move_buffer::{MAX_COMBINE_DELTA, MOVE_BUFFER_CAPACITY, SavedMoveBuffer};
pub use reconciliation::{
    Correction, MoveResponse, POSITION_EPSILON, ServerReconciler, needs_correction,
};
pub use state_snapshot::StateSnapshot;
pub use stats::SimulationStats;
