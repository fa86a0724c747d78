use std::collections::VecDeque;

use bevy::prelude::*;

use crate::game_logic::WorldProbe;
use crate::movement::{MovementComponent, PlayerInput, SavedMove};
use crate::prediction::{Correction, SavedMoveBuffer, SimulationStats, StateSnapshot};

/// Keep predicted states for this many ticks past the last acknowledgement
const MAX_SNAPSHOTS: usize = 240;

/// Client half of the reconciliation protocol: predicts locally, buffers
/// what it sent and rewinds onto server corrections.
#[derive(Resource)]
pub struct ClientPrediction {
    pub component: MovementComponent,
    pub buffer: SavedMoveBuffer,
    pub stats: SimulationStats,
    /// Predicted state after each unacknowledged tick, oldest first
    snapshots: VecDeque<StateSnapshot>,
    last_acknowledged: Option<f64>,
}

impl ClientPrediction {
    pub fn new(component: MovementComponent) -> Self {
        Self {
            component,
            buffer: SavedMoveBuffer::default(),
            stats: SimulationStats::default(),
            snapshots: VecDeque::with_capacity(MAX_SNAPSHOTS),
            last_acknowledged: None,
        }
    }

    pub fn last_acknowledged(&self) -> Option<f64> {
        self.last_acknowledged
    }

    pub fn snapshot_at(&self, timestamp: f64) -> Option<&StateSnapshot> {
        self.snapshots.iter().find(|snapshot| snapshot.timestamp == timestamp)
    }

    /// Predict one tick. Returns a move once one is ready to send.
    pub fn tick(&mut self, input: &PlayerInput, delta_time: f32, world: &dyn WorldProbe) -> Option<SavedMove> {
        let saved = self.component.advance_tick(input, delta_time, world);
        self.stats.tick_count += 1;
        self.push_snapshot(StateSnapshot::capture(saved.timestamp, &self.component.state));
        self.buffer.push(saved)
    }

    /// Send whatever is pending without waiting for it to combine further.
    pub fn flush(&mut self) -> Option<SavedMove> {
        self.buffer.flush()
    }

    pub fn apply_ack(&mut self, timestamp: f64) {
        self.buffer.acknowledge(timestamp);
        self.snapshots.retain(|snapshot| snapshot.timestamp >= timestamp);
        self.last_acknowledged = Some(self.last_acknowledged.map_or(timestamp, |last| last.max(timestamp)));
    }

    /// Adopt the server's state as of the correction's timestamp and replay
    /// every move the server has not processed yet on top of it.
    pub fn apply_correction(&mut self, correction: &Correction, world: &dyn WorldProbe) {
        if self.last_acknowledged.is_some_and(|last| correction.timestamp < last) {
            debug!("dropping out of order correction at {:.3}", correction.timestamp);
            return;
        }

        let predicted = self.snapshot_at(correction.timestamp);
        let error = predicted.map_or(0.0, |snapshot| snapshot.distance_to(correction.location));
        let mut state = predicted
            .map(|snapshot| snapshot.state.clone())
            .unwrap_or_else(|| self.component.state.clone());
        state.apply_authoritative(
            correction.location,
            correction.velocity,
            correction.base,
            correction.mode,
        );

        self.stats.record_correction(error);
        info!(
            "applying correction at {:.3}: error {:.2}cm, mode {:?}",
            correction.timestamp, error, correction.mode
        );

        self.apply_ack(correction.timestamp);
        self.component.state = state;
        self.snapshots.clear();

        let component = &mut self.component;
        let snapshots = &mut self.snapshots;
        let mut replayed = 0;
        for saved in self.buffer.unacknowledged_mut() {
            let intent = saved.apply_flags(&mut component.state);
            saved.start = component.state.kinematics;
            saved.start_mode = component.state.mode;
            for step in &saved.steps {
                component.replay_step(intent, *step, world);
                snapshots.push_back(StateSnapshot::capture(step.timestamp, &component.state));
                replayed += 1;
            }
            saved.end = component.state.kinematics;
            saved.end_mode = component.state.mode;
            saved.end_base = component.state.base;
        }
        debug!("replayed {} ticks after correction", replayed);
    }

    fn push_snapshot(&mut self, snapshot: StateSnapshot) {
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > MAX_SNAPSHOTS {
            self.snapshots.pop_front();
        }
    }
}
