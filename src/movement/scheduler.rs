use std::time::Duration;

use bevy::prelude::*;

/// Identifies one scheduled callback so it can be cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleToken(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduledAction {
    /// Crouch was held long enough to go prone
    EnterProne,
    DashRetry,
}

pub trait Scheduler {
    fn schedule(&mut self, delay: f64, action: ScheduledAction) -> ScheduleToken;
    /// Returns false if the token already fired or was cancelled.
    fn cancel(&mut self, token: ScheduleToken) -> bool;
}

#[derive(Clone, Debug)]
struct TimerEntry {
    token: ScheduleToken,
    timer: Timer,
    action: ScheduledAction,
}

fn to_duration(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX)
}

/// One-shot timers ticked by the simulation clock rather than wall time, so
/// the same input script always fires the same callbacks on the same tick.
#[derive(Clone, Debug, Default)]
pub struct TimerQueue {
    clock: Duration,
    next_token: u64,
    entries: Vec<TimerEntry>,
}

impl TimerQueue {
    pub fn now(&self) -> f64 {
        self.clock.as_secs_f64()
    }

    pub fn is_scheduled(&self, token: ScheduleToken) -> bool {
        self.entries.iter().any(|entry| entry.token == token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move the clock to `now` and pop every due action, earliest first.
    /// The clock never runs backwards.
    pub fn advance(&mut self, now: f64) -> Vec<(ScheduleToken, ScheduledAction)> {
        let target = to_duration(now).max(self.clock);
        let delta = target - self.clock;
        self.clock = target;

        let mut due = Vec::new();
        self.entries.retain_mut(|entry| {
            let left = entry.timer.remaining();
            entry.timer.tick(delta);
            if entry.timer.finished() {
                due.push((left, entry.token, entry.action));
                return false;
            }
            true
        });
        due.sort_by_key(|&(left, token, _)| (left, token));
        due.into_iter().map(|(_, token, action)| (token, action)).collect()
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }
}

impl Scheduler for TimerQueue {
    fn schedule(&mut self, delay: f64, action: ScheduledAction) -> ScheduleToken {
        let token = ScheduleToken(self.next_token);
        self.next_token += 1;
        self.entries.push(TimerEntry {
            token,
            timer: Timer::new(to_duration(delay), TimerMode::Once),
            action,
        });
        token
    }

    fn cancel(&mut self, token: ScheduleToken) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.token != token);
        self.entries.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_due_order() {
        let mut timers = TimerQueue::default();
        let late = timers.schedule(0.5, ScheduledAction::DashRetry);
        let early = timers.schedule(0.2, ScheduledAction::EnterProne);

        assert!(timers.advance(0.1).is_empty());
        let fired = timers.advance(1.0);
        assert_eq!(
            fired,
            vec![
                (early, ScheduledAction::EnterProne),
                (late, ScheduledAction::DashRetry)
            ]
        );
        assert!(timers.is_empty());
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut timers = TimerQueue::default();
        let token = timers.schedule(0.2, ScheduledAction::EnterProne);
        assert!(timers.cancel(token));
        assert!(!timers.cancel(token));
        assert!(timers.advance(5.0).is_empty());
    }

    #[test]
    fn test_delay_is_relative_to_clock() {
        let mut timers = TimerQueue::default();
        timers.advance(2.0);
        let token = timers.schedule(0.5, ScheduledAction::DashRetry);
        assert!(timers.advance(2.4).is_empty());
        assert_eq!(timers.advance(2.5), vec![(token, ScheduledAction::DashRetry)]);
    }

    #[test]
    fn test_fixed_ticks_fire_on_the_due_tick() {
        let mut timers = TimerQueue::default();
        let token = timers.schedule(0.2, ScheduledAction::EnterProne);
        let dt = 1.0f32 / 60.0;
        let mut now = 0.0f64;
        let mut fired_on = None;
        for tick in 1..=30 {
            now += dt as f64;
            if timers.advance(now).contains(&(token, ScheduledAction::EnterProne)) {
                fired_on = Some(tick);
                break;
            }
        }
        assert_eq!(fired_on, Some(12));

        // An earlier time does not rewind the clock
        let zero_delay = timers.schedule(0.0, ScheduledAction::DashRetry);
        assert_eq!(timers.advance(0.0), vec![(zero_delay, ScheduledAction::DashRetry)]);
        assert!((timers.now() - now).abs() < 1e-6);
    }
}
