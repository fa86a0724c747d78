use bevy::prelude::*;

use crate::game_logic::{MovementBase, WorldProbe};
use crate::movement::{
    CharacterState, MovementComponent, MovementMode, NetRole, ProxyFlags, ServerMove,
};
use crate::prediction::SimulationStats;

/// Position error above which the server corrects the client, in cm.
/// sqrt(3): one centimeter on every axis.
pub const POSITION_EPSILON: f32 = 1.732_050_8;

/// Authoritative state the client must adopt as of `timestamp`.
#[derive(Clone, Debug, PartialEq)]
pub struct Correction {
    pub timestamp: f64,
    pub location: Vec3,
    pub velocity: Vec3,
    pub base: Option<MovementBase>,
    pub base_bone_name: String,
    pub mode: MovementMode,
    pub gravity_direction: Vec3,
}

impl Correction {
    pub fn from_state(timestamp: f64, state: &CharacterState) -> Self {
        Self {
            timestamp,
            location: state.kinematics.location,
            velocity: state.kinematics.velocity,
            base: state.base,
            base_bone_name: String::new(),
            mode: state.mode,
            gravity_direction: Vec3::NEG_Y,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MoveResponse {
    Ack { timestamp: f64 },
    Correction(Correction),
}

/// Check whether the client's report of a move disagrees with the server's
/// result badly enough to correct. Returns the decision and the position
/// error.
///
/// An unknown client mode always counts as a mismatch.
pub fn needs_correction(
    server: &CharacterState,
    client_location: Vec3,
    client_mode: Option<MovementMode>,
    epsilon: f32,
) -> (bool, f32) {
    let error = server.kinematics.location.distance(client_location);
    let mode_mismatch = client_mode != Some(server.mode);
    (error > epsilon || mode_mismatch, error)
}

/// Server half of the reconciliation protocol for one remotely controlled
/// character.
///
/// Every received move is re-simulated from the server's own state with the
/// same integrators the client ran, then compared against what the client
/// says it ended up with.
#[derive(Resource)]
pub struct ServerReconciler {
    pub component: MovementComponent,
    pub stats: SimulationStats,
    last_processed: Option<f64>,
    epsilon: f32,
}

impl ServerReconciler {
    pub fn new(component: MovementComponent) -> Self {
        Self::with_epsilon(component, POSITION_EPSILON)
    }

    pub fn with_epsilon(component: MovementComponent, epsilon: f32) -> Self {
        if component.role() != NetRole::Authority {
            warn!("server reconciler driving a {:?} component", component.role());
        }
        Self {
            component,
            stats: SimulationStats::default(),
            last_processed: None,
            epsilon,
        }
    }

    pub fn last_processed(&self) -> Option<f64> {
        self.last_processed
    }

    pub fn proxy_flags(&self) -> ProxyFlags {
        self.component.state.proxy
    }

    /// Process one client move and decide between acknowledging and
    /// correcting it.
    pub fn receive(&mut self, server_move: &ServerMove, world: &dyn WorldProbe) -> MoveResponse {
        let timestamp = server_move.last_timestamp();
        if self.last_processed.is_some_and(|last| timestamp <= last) {
            debug!("ignoring stale move at {:.3}", timestamp);
            return MoveResponse::Ack { timestamp };
        }

        self.component.perform_server_move(server_move, world);
        self.last_processed = Some(timestamp);
        self.stats.tick_count += server_move.steps.len() as u64;

        let state = &self.component.state;
        let (correct, error) = needs_correction(
            state,
            server_move.client_location,
            server_move.client_mode,
            self.epsilon,
        );
        if !correct {
            return MoveResponse::Ack { timestamp };
        }

        self.stats.record_correction(error);
        info!(
            "correcting client at {:.3}: error {:.2}cm, client mode {:?}, server mode {:?}",
            timestamp, error, server_move.client_mode, state.mode
        );
        MoveResponse::Correction(Correction::from_state(timestamp, state))
    }
}
