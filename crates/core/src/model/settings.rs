use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(3_000);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5_000);
pub const DEFAULT_TICK: Duration = Duration::from_millis(1_000);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionSettingsError {
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
}

/// Timing knobs for a quiz-taking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    debounce: Duration,
    retry_delay: Duration,
    tick: Duration,
    monitor_focus: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            retry_delay: DEFAULT_RETRY_DELAY,
            tick: DEFAULT_TICK,
            monitor_focus: true,
        }
    }
}

impl SessionSettings {
    /// Build validated settings.
    ///
    /// # Errors
    ///
    /// Returns `SessionSettingsError::ZeroDuration` if any duration is zero.
    pub fn new(
        debounce: Duration,
        retry_delay: Duration,
        tick: Duration,
        monitor_focus: bool,
    ) -> Result<Self, SessionSettingsError> {
        for (field, value) in [
            ("debounce", debounce),
            ("retry_delay", retry_delay),
            ("tick", tick),
        ] {
            if value.is_zero() {
                return Err(SessionSettingsError::ZeroDuration { field });
            }
        }
        Ok(Self {
            debounce,
            retry_delay,
            tick,
            monitor_focus,
        })
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    #[must_use]
    pub fn tick(&self) -> Duration {
        self.tick
    }

    #[must_use]
    pub fn monitor_focus(&self) -> bool {
        self.monitor_focus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_timings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.debounce(), Duration::from_secs(3));
        assert_eq!(settings.retry_delay(), Duration::from_secs(5));
        assert_eq!(settings.tick(), Duration::from_secs(1));
        assert!(settings.monitor_focus());
    }

    #[test]
    fn zero_durations_are_rejected() {
        let err = SessionSettings::new(
            Duration::from_secs(1),
            Duration::ZERO,
            Duration::from_secs(1),
            true,
        )
        .unwrap_err();
        assert_eq!(err, SessionSettingsError::ZeroDuration { field: "retry_delay" });
    }
}
