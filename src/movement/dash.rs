use bevy::prelude::*;

use crate::game_logic::MovementSettings;
use crate::movement::{ScheduleToken, ScheduledAction, Scheduler};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DashPhase {
    Idle,
    CoolingDown { remaining: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DashRequest {
    /// Dash on this tick
    Execute,
    /// Cooldown ends inside the retry window, a retry is scheduled
    Deferred(ScheduleToken),
    Dropped,
}

/// Input-side cooldown gate for the dash. The last dash time itself lives in
/// the simulated state so replays see it.
#[derive(Clone, Debug, PartialEq)]
pub struct DashController {
    cooldown: f64,
    retry_window: f64,
    retry: Option<ScheduleToken>,
}

impl DashController {
    pub fn new(settings: &MovementSettings) -> Self {
        Self {
            cooldown: settings.dash_cooldown_duration as f64,
            retry_window: settings.dash_retry_window as f64,
            retry: None,
        }
    }

    pub fn phase(&self, now: f64, last_dash: Option<f64>) -> DashPhase {
        match last_dash {
            Some(last) if now - last < self.cooldown => DashPhase::CoolingDown {
                remaining: self.cooldown - (now - last),
            },
            _ => DashPhase::Idle,
        }
    }

    pub fn pending_retry(&self) -> Option<ScheduleToken> {
        self.retry
    }

    pub fn start_dash(
        &mut self,
        now: f64,
        last_dash: Option<f64>,
        scheduler: &mut impl Scheduler,
    ) -> DashRequest {
        match self.phase(now, last_dash) {
            DashPhase::Idle => {
                self.stop_dash(scheduler);
                DashRequest::Execute
            }
            DashPhase::CoolingDown { remaining } if remaining <= self.retry_window => {
                if let Some(token) = self.retry {
                    return DashRequest::Deferred(token);
                }
                let token = scheduler.schedule(remaining, ScheduledAction::DashRetry);
                debug!("dash cooling down, retry in {:.3}s", remaining);
                self.retry = Some(token);
                DashRequest::Deferred(token)
            }
            DashPhase::CoolingDown { .. } => DashRequest::Dropped,
        }
    }

    /// Forget any scheduled retry.
    pub fn stop_dash(&mut self, scheduler: &mut impl Scheduler) {
        if let Some(token) = self.retry.take() {
            scheduler.cancel(token);
        }
    }

    /// The scheduler fired `token`. Returns true if it was our retry.
    pub fn retry_fired(&mut self, token: ScheduleToken) -> bool {
        if self.retry == Some(token) {
            self.retry = None;
            return true;
        }
        false
    }
}
