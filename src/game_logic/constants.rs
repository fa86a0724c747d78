// Simulation timing
pub const FIXED_TIMESTEP: f32 = 1.0 / 60.0;
pub const MIN_TICK_TIME: f32 = 1.0e-6;
pub const MAX_SIMULATION_TIME_STEP: f32 = 0.05;
pub const MAX_SIMULATION_ITERATIONS: u32 = 8;

// Floor tolerances (cm)
pub const MIN_FLOOR_DIST: f32 = 1.9;
pub const MAX_FLOOR_DIST: f32 = 2.4;

// Sweeps stop this far short of the contact
pub const PULLBACK_DISTANCE: f32 = 0.1;

// Braking
pub const BRAKE_TO_STOP_VELOCITY: f32 = 10.0;
pub const BRAKING_SUBSTEP_TIME: f32 = 1.0 / 33.0;
pub const OVER_VELOCITY_PERCENT: f32 = 1.01;

// Flying and root-motion moves use fluid friction
pub const FLYING_FRICTION: f32 = 0.15;

pub const KINDA_SMALL_NUMBER: f32 = 1.0e-4;
