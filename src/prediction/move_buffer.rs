use std::collections::VecDeque;

use crate::movement::SavedMove;

/// Moves whose first steps are further apart than this are never combined
pub const MAX_COMBINE_DELTA: f64 = 1.0 / 30.0;

/// ~2 seconds of unacknowledged moves at 60 ticks per second
pub const MOVE_BUFFER_CAPACITY: usize = 120;

/// Ordered buffer of sent, not yet acknowledged moves plus the newest move,
/// which is held back while following ticks can still be folded into it.
///
/// Moves leave the buffer when the server acknowledges or corrects a
/// timestamp at or after their last step.
#[derive(Clone, Debug)]
pub struct SavedMoveBuffer {
    moves: VecDeque<SavedMove>,
    pending: Option<SavedMove>,
    max_size: usize,
    max_combine_delta: f64,
}

impl Default for SavedMoveBuffer {
    fn default() -> Self {
        Self::new(MOVE_BUFFER_CAPACITY, MAX_COMBINE_DELTA)
    }
}

impl SavedMoveBuffer {
    pub fn new(max_size: usize, max_combine_delta: f64) -> Self {
        Self {
            moves: VecDeque::with_capacity(max_size),
            pending: None,
            max_size,
            max_combine_delta,
        }
    }

    /// Add the newest move. Returns the previously pending move once it can
    /// no longer absorb anything and is ready to send.
    pub fn push(&mut self, saved: SavedMove) -> Option<SavedMove> {
        match self.pending.take() {
            Some(mut pending) if pending.can_combine(&saved, self.max_combine_delta) => {
                pending.combine(saved);
                self.pending = Some(pending);
                None
            }
            Some(ready) => {
                self.pending = Some(saved);
                self.record(ready.clone());
                Some(ready)
            }
            None => {
                self.pending = Some(saved);
                None
            }
        }
    }

    /// Send the pending move now regardless of what follows.
    pub fn flush(&mut self) -> Option<SavedMove> {
        let ready = self.pending.take()?;
        self.record(ready.clone());
        Some(ready)
    }

    fn record(&mut self, saved: SavedMove) {
        self.moves.push_back(saved);
        // Oldest first: the server has most likely seen them already
        while self.moves.len() > self.max_size {
            self.moves.pop_front();
        }
    }

    /// Drop every sent move fully covered by `timestamp`. Returns how many.
    pub fn acknowledge(&mut self, timestamp: f64) -> usize {
        let before = self.moves.len();
        self.moves.retain(|saved| saved.last_timestamp() > timestamp);
        before - self.moves.len()
    }

    /// Sent and pending moves still awaiting the server, oldest first.
    pub fn unacknowledged(&self) -> impl Iterator<Item = &SavedMove> {
        self.moves.iter().chain(self.pending.iter())
    }

    pub fn unacknowledged_mut(&mut self) -> impl Iterator<Item = &mut SavedMove> {
        self.moves.iter_mut().chain(self.pending.iter_mut())
    }

    pub fn pending(&self) -> Option<&SavedMove> {
        self.pending.as_ref()
    }

    /// Number of sent, unacknowledged moves.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_logic::Kinematics;
    use crate::movement::{CharacterState, MoveStep, MovementIntent, MovementMode};
    use bevy::prelude::*;

    fn saved(timestamp: f64, intent: MovementIntent) -> SavedMove {
        let state = CharacterState::new(Vec3::ZERO, MovementMode::Walking);
        let mut post = state.clone();
        post.kinematics = Kinematics::at(Vec3::X * timestamp as f32);
        let step = MoveStep {
            timestamp,
            delta_time: 1.0 / 60.0,
            acceleration: Vec3::ZERO,
        };
        SavedMove::capture(&state, intent, step, &post)
    }

    #[test]
    fn test_identical_moves_combine_until_window_closes() {
        let mut buffer = SavedMoveBuffer::default();
        let idle = MovementIntent::default();

        assert!(buffer.push(saved(0.0, idle)).is_none());
        assert!(buffer.push(saved(0.016, idle)).is_none());
        assert_eq!(buffer.pending().map(|p| p.steps.len()), Some(2));

        let sent = buffer.push(saved(0.05, idle)).expect("window closed");
        assert_eq!(sent.steps.len(), 2);
        assert_eq!(sent.timestamp, 0.0);
        assert_eq!(sent.last_timestamp(), 0.016);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_intent_change_flushes_pending() {
        let mut buffer = SavedMoveBuffer::default();
        let jump = MovementIntent {
            jump: true,
            ..Default::default()
        };
        buffer.push(saved(0.0, MovementIntent::default()));
        let sent = buffer.push(saved(0.016, jump)).expect("different intent");
        assert_eq!(sent.steps.len(), 1);
        assert_eq!(buffer.pending().map(|p| p.intent.jump), Some(true));
    }

    #[test]
    fn test_acknowledge_drops_covered_moves() {
        let mut buffer = SavedMoveBuffer::new(10, 0.0);
        for tick in 0..4 {
            buffer.push(saved(tick as f64, MovementIntent::default()));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.acknowledge(1.0), 2);
        let left: Vec<f64> = buffer.unacknowledged().map(|m| m.timestamp).collect();
        assert_eq!(left, vec![2.0, 3.0]);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut buffer = SavedMoveBuffer::new(5, 0.0);
        for tick in 0..10 {
            buffer.push(saved(tick as f64, MovementIntent::default()));
        }
        buffer.flush();
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.unacknowledged().next().map(|m| m.timestamp), Some(5.0));
        assert!(buffer.pending().is_none());
    }
}
