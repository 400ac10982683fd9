//! Retry policy for the delivery loop

use std::time::Duration;

use contracts::DispatchSettings;

/// How the delivery loop waits between failed sends
///
/// The default retries forever with a fixed one second wait.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Wait after the first failure
    pub interval: Duration,
    /// Growth factor applied per further failure (1.0 = fixed)
    pub backoff_multiplier: f64,
    /// Upper bound for grown waits
    pub max_interval: Duration,
    /// Give up after this many attempts (None = never)
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            backoff_multiplier: 1.0,
            max_interval: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Unbounded retry at a fixed interval
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Build from the `[dispatch]` settings section
    pub fn from_settings(settings: &DispatchSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.send_failure_wait_ms),
            backoff_multiplier: settings.retry.backoff_multiplier,
            max_interval: Duration::from_millis(settings.retry.max_interval_ms),
            max_attempts: settings.retry.max_attempts,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_backoff(mut self, multiplier: f64, max_interval: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_interval = max_interval;
        self
    }

    /// Wait after `failures` consecutive failed attempts (1-based)
    pub fn delay_after(&self, failures: u32) -> Duration {
        if self.backoff_multiplier <= 1.0 || failures <= 1 {
            return self.interval;
        }

        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let secs = self.interval.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let cap = self.max_interval.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            return self.max_interval.max(self.interval);
        }
        Duration::from_secs_f64(secs)
    }

    /// Whether `attempts` sends have used up the budget
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}
