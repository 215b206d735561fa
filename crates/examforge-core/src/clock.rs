//! Session clock: a time-driven state machine for one attempt.
//!
//! Remaining time is always recomputed from the absolute start time, so a
//! late or skipped tick never causes drift. Transitions are computed by the
//! pure [`advance`] reducer; [`SessionClock`] only supplies timestamps.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remaining time at which the one-time warning fires.
pub const WARNING_LEAD: Duration = Duration::from_secs(300);

/// Default cadence of the periodic check.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used to simulate elapsed time.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = chrono::Duration::from_std(by)
            .ok()
            .and_then(|by| now.checked_add_signed(by))
        {
            *now = next;
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Lifecycle of an attempt session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    Running,
    Expired,
    Submitted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Expired | SessionState::Submitted)
    }
}

/// Events produced by a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Remaining time dropped to [`WARNING_LEAD`] or below.
    Warning { remaining: Duration },
    /// The time limit ran out.
    Expired,
}

/// Reducer input and output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockState {
    pub phase: SessionState,
    pub warned: bool,
}

impl Default for ClockState {
    fn default() -> Self {
        Self {
            phase: SessionState::NotStarted,
            warned: false,
        }
    }
}

/// Compute the next clock state from the time elapsed since start.
///
/// Only a running, time-limited session can change state here. If the limit
/// is already exhausted the warning is skipped and only `Expired` is emitted.
pub fn advance(
    state: ClockState,
    limit: Option<Duration>,
    elapsed: Duration,
) -> (ClockState, Vec<ClockEvent>) {
    let Some(limit) = limit else {
        return (state, Vec::new());
    };
    if state.phase != SessionState::Running {
        return (state, Vec::new());
    }

    let remaining = limit.saturating_sub(elapsed);
    if remaining.is_zero() {
        let next = ClockState {
            phase: SessionState::Expired,
            ..state
        };
        return (next, vec![ClockEvent::Expired]);
    }

    if remaining <= WARNING_LEAD && !state.warned {
        let next = ClockState {
            warned: true,
            ..state
        };
        return (next, vec![ClockEvent::Warning { remaining }]);
    }

    (state, Vec::new())
}

/// Time-driven state machine for one attempt.
#[derive(Debug, Clone)]
pub struct SessionClock {
    limit: Option<Duration>,
    state: ClockState,
    start_time: Option<DateTime<Utc>>,
}

impl SessionClock {
    /// A clock for a session with an optional limit in minutes.
    pub fn new(time_limit_minutes: Option<u32>) -> Self {
        Self {
            limit: time_limit_minutes.map(|m| Duration::from_secs(u64::from(m) * 60)),
            state: ClockState::default(),
            start_time: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.phase
    }

    pub fn is_time_limited(&self) -> bool {
        self.limit.is_some()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Record the start time and begin running. Returns `false` if the
    /// clock was already started.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.state.phase != SessionState::NotStarted {
            return false;
        }
        self.start_time = Some(now);
        self.state.phase = SessionState::Running;
        true
    }

    /// Time since start; zero before start or under backwards clock skew.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        self.start_time
            .and_then(|start| (now - start).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Time left before expiry; `None` for untimed sessions.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.limit
            .map(|limit| limit.saturating_sub(self.elapsed(now)))
    }

    /// Periodic check.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<ClockEvent> {
        let (next, events) = advance(self.state, self.limit, self.elapsed(now));
        self.state = next;
        events
    }

    /// `Running -> Submitted`. Returns `false` (and changes nothing) from
    /// any other state.
    pub fn submit_manually(&mut self) -> bool {
        if self.state.phase != SessionState::Running {
            return false;
        }
        self.state.phase = SessionState::Submitted;
        true
    }
}
