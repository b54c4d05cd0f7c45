//! Auto-sync schedule
//!
//! [`SyncSchedule`] is the policy read from configuration; [`SyncTimer`]
//! turns it into deadlines for the orchestrator loop.
//!
//! ## Timer policy
//!
//! The timer is anchored at the last resolved run (or at start-up / the
//! moment auto-sync was enabled), so the next firing is always
//! `anchor + interval`. Changing the interval keeps the anchor: a shorter
//! interval whose deadline already passed fires at once, a longer one
//! pushes the deadline out.

use std::time::Duration;

use chrono::{DateTime, Utc};
use syncbot_core::config::SyncConfig;
use tokio::time::Instant;
use tracing::debug;

use crate::SyncError;

// ============================================================================
// SyncSchedule
// ============================================================================

/// Whether and how often the timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSchedule {
    pub auto_sync: bool,
    pub interval: Duration,
}

impl SyncSchedule {
    /// # Errors
    ///
    /// [`SyncError::Config`] if `interval_minutes` is zero.
    pub fn new(auto_sync: bool, interval_minutes: u64) -> Result<Self, SyncError> {
        if interval_minutes == 0 {
            return Err(SyncError::Config(
                "sync interval must be a positive number of minutes".to_string(),
            ));
        }
        Ok(Self {
            auto_sync,
            interval: Duration::from_secs(interval_minutes * 60),
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        Self::new(config.auto_sync, config.interval_minutes)
    }

    /// A schedule that never fires
    pub fn manual_only() -> Self {
        Self {
            auto_sync: false,
            interval: Duration::from_secs(60 * 60),
        }
    }
}

// ============================================================================
// SyncTimer
// ============================================================================

/// Deadline bookkeeping for the auto-sync timer
///
/// Keeps the anchor both as a monotonic [`Instant`] (for sleeping) and as a
/// wall-clock timestamp (for the `next_sync` shown to users).
#[derive(Debug, Clone)]
pub struct SyncTimer {
    schedule: SyncSchedule,
    anchor: Instant,
    anchor_wall: DateTime<Utc>,
}

impl SyncTimer {
    /// Creates a timer anchored at `now`
    pub fn new(schedule: SyncSchedule, now: Instant, now_wall: DateTime<Utc>) -> Self {
        Self {
            schedule,
            anchor: now,
            anchor_wall: now_wall,
        }
    }

    pub fn schedule(&self) -> SyncSchedule {
        self.schedule
    }

    /// Moves the anchor, typically to the moment a run resolved
    pub fn rearm(&mut self, now: Instant, now_wall: DateTime<Utc>) {
        self.anchor = now;
        self.anchor_wall = now_wall;
    }

    /// Applies a new schedule
    ///
    /// Enabling auto-sync anchors the timer at `now`; any other change keeps
    /// the current anchor.
    pub fn reconfigure(&mut self, schedule: SyncSchedule, now: Instant, now_wall: DateTime<Utc>) {
        if schedule.auto_sync && !self.schedule.auto_sync {
            self.rearm(now, now_wall);
        }
        debug!(
            auto_sync = schedule.auto_sync,
            interval_secs = schedule.interval.as_secs(),
            "Timer reconfigured"
        );
        self.schedule = schedule;
    }

    /// When the timer should fire, or `None` while auto-sync is off
    pub fn deadline(&self) -> Option<Instant> {
        self.schedule
            .auto_sync
            .then(|| self.anchor + self.schedule.interval)
    }

    /// Wall-clock equivalent of [`SyncTimer::deadline`]
    pub fn next_sync(&self) -> Option<DateTime<Utc>> {
        if !self.schedule.auto_sync {
            return None;
        }
        let interval = chrono::Duration::from_std(self.schedule.interval).ok()?;
        Some(self.anchor_wall + interval)
    }

    /// Whether the deadline has been reached
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|d| d <= now)
    }
}
