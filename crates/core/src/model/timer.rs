use serde::{Deserialize, Serialize};

/// Countdown lifecycle: `idle → running → {paused ⇄ running} → expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
    Expired,
}

impl TimerStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == TimerStatus::Expired
    }
}

/// Status change produced by a timer operation. `from == to` means nothing moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTransition {
    pub from: TimerStatus,
    pub to: TimerStatus,
}

impl TimerTransition {
    fn between(from: TimerStatus, to: TimerStatus) -> Self {
        Self { from, to }
    }

    #[must_use]
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// True only on the step into `expired`.
    #[must_use]
    pub fn expired(&self) -> bool {
        !self.from.is_terminal() && self.to.is_terminal()
    }
}

/// Remaining seconds plus status for a quiz countdown.
///
/// Untimed quizzes carry a timer that never leaves `idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    remaining_secs: u32,
    status: TimerStatus,
    timed: bool,
}

impl TimerState {
    #[must_use]
    pub fn new(limit_secs: u32) -> Self {
        Self {
            remaining_secs: limit_secs,
            status: TimerStatus::Idle,
            timed: true,
        }
    }

    #[must_use]
    pub fn untimed() -> Self {
        Self {
            remaining_secs: 0,
            status: TimerStatus::Idle,
            timed: false,
        }
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn status(&self) -> TimerStatus {
        self.status
    }

    #[must_use]
    pub fn is_timed(&self) -> bool {
        self.timed
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    /// `idle → running`. A timer with nothing left expires immediately.
    pub fn start(&mut self) -> TimerTransition {
        let from = self.status;
        if self.timed && from == TimerStatus::Idle {
            self.status = if self.remaining_secs == 0 {
                TimerStatus::Expired
            } else {
                TimerStatus::Running
            };
        }
        TimerTransition::between(from, self.status)
    }

    /// One second elapsed. Ignored unless running; never goes below zero.
    pub fn tick(&mut self) -> TimerTransition {
        let from = self.status;
        if from == TimerStatus::Running {
            self.remaining_secs = self.remaining_secs.saturating_sub(1);
            if self.remaining_secs == 0 {
                self.status = TimerStatus::Expired;
            }
        }
        TimerTransition::between(from, self.status)
    }

    pub fn pause(&mut self) -> TimerTransition {
        let from = self.status;
        if from == TimerStatus::Running {
            self.status = TimerStatus::Paused;
        }
        TimerTransition::between(from, self.status)
    }

    pub fn resume(&mut self) -> TimerTransition {
        let from = self.status;
        if from == TimerStatus::Paused {
            self.status = TimerStatus::Running;
        }
        TimerTransition::between(from, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_tick_expires_and_stops_at_zero() {
        let mut timer = TimerState::new(1);
        timer.start();

        let transition = timer.tick();
        assert!(transition.expired());
        assert_eq!(timer.status(), TimerStatus::Expired);
        assert_eq!(timer.remaining_secs(), 0);

        let again = timer.tick();
        assert!(!again.changed());
        assert!(!again.expired());
        assert_eq!(timer.remaining_secs(), 0);
    }

    #[test]
    fn pause_and_resume_keep_remaining() {
        let mut timer = TimerState::new(30);
        timer.start();
        timer.tick();

        assert!(timer.pause().changed());
        assert_eq!(timer.tick().to, TimerStatus::Paused);
        assert!(timer.resume().changed());
        assert_eq!(timer.remaining_secs(), 29);
        assert!(timer.is_running());
    }

    #[test]
    fn expired_is_terminal() {
        let mut timer = TimerState::new(0);
        assert!(timer.start().expired());
        assert!(!timer.pause().changed());
        assert!(!timer.resume().changed());
        assert_eq!(timer.status(), TimerStatus::Expired);
    }

    #[test]
    fn untimed_never_starts() {
        let mut timer = TimerState::untimed();
        assert!(!timer.start().changed());
        assert_eq!(timer.status(), TimerStatus::Idle);
    }

    #[test]
    fn resume_from_idle_is_noop() {
        let mut timer = TimerState::new(10);
        assert!(!timer.resume().changed());
        assert_eq!(timer.status(), TimerStatus::Idle);
    }
}
