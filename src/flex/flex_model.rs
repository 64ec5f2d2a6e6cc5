use serde::Serialize;
use std::sync::Arc;

use crate::settings::FlexRetrySettings;

/// Provider of uniform samples in [0.0, 1.0]; injectable for deterministic tests.
pub type JitterProvider = Arc<dyn Fn() -> f64 + Send + Sync>;

/// One recorded retry inside the statement poll loop.
#[derive(Debug, Clone, Serialize)]
pub struct PollAttemptEvent {
    pub poll_attempt: u32,
    pub error_code: String,
    pub error_message: String,
    pub retry_after_seconds: f64,
}

/// Acknowledgement of the `SendRequest` phase.
#[derive(Debug, Clone)]
pub struct FlexRequestAck {
    /// Upstream reference code for the generated statement.
    pub reference_code: String,
    /// Statement retrieval endpoint returned upstream, or the default.
    pub statement_url: String,
}

/// Result of the `GetStatement` poll phase.
#[derive(Debug, Clone)]
pub struct FlexFetchOutcome {
    /// Raw statement payload bytes.
    pub payload: Vec<u8>,
    /// Poll attempts consumed before the payload became available.
    pub poll_attempts: Vec<PollAttemptEvent>,
}

/// Immutable retry strategy applying exponential backoff with jitter.
#[derive(Clone)]
pub struct FlexRetryStrategy {
    settings: FlexRetrySettings,
    jitter: JitterProvider,
}

impl FlexRetryStrategy {
    pub fn new(settings: FlexRetrySettings, jitter: JitterProvider) -> Self {
        Self { settings, jitter }
    }

    pub fn attempts(&self) -> u32 {
        self.settings.retry_attempts
    }

    pub fn initial_wait_seconds(&self) -> f64 {
        self.settings.initial_wait_seconds
    }

    /// Wait before retry `attempt_index` (zero-based):
    /// `max(code_floor, clamp(base * 2^attempt, 0, max)) * U(jitter_min, jitter_max)`.
    pub fn wait_seconds(&self, attempt_index: u32, code_floor_seconds: f64) -> f64 {
        let backoff = self.settings.backoff_base_seconds * 2f64.powi(attempt_index as i32);
        let capped = backoff.clamp(0.0, self.settings.backoff_max_seconds);
        capped.max(code_floor_seconds) * self.jitter_multiplier()
    }

    fn jitter_multiplier(&self) -> f64 {
        let unit = (self.jitter)().clamp(0.0, 1.0);
        let span = self.settings.jitter_max_multiplier - self.settings.jitter_min_multiplier;
        self.settings.jitter_min_multiplier + unit * span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy_with_unit(unit: f64) -> FlexRetryStrategy {
        FlexRetryStrategy::new(
            FlexRetrySettings {
                initial_wait_seconds: 5.0,
                retry_attempts: 7,
                backoff_base_seconds: 10.0,
                backoff_max_seconds: 60.0,
                jitter_min_multiplier: 0.5,
                jitter_max_multiplier: 1.5,
                request_timeout_seconds: 30.0,
            },
            Arc::new(move || unit),
        )
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        // Jitter pinned to the midpoint multiplier of 1.0.
        let strategy = strategy_with_unit(0.5);
        assert_eq!(strategy.wait_seconds(0, 0.0), 10.0);
        assert_eq!(strategy.wait_seconds(1, 0.0), 20.0);
        assert_eq!(strategy.wait_seconds(2, 0.0), 40.0);
        assert_eq!(strategy.wait_seconds(3, 0.0), 60.0);
        assert_eq!(strategy.wait_seconds(6, 0.0), 60.0);
    }

    #[test]
    fn test_code_floor_overrides_small_backoff() {
        let strategy = strategy_with_unit(0.5);
        // Floor of 15s beats the first-attempt backoff of 10s.
        assert_eq!(strategy.wait_seconds(0, 15.0), 15.0);
        // But a larger backoff wins over the floor.
        assert_eq!(strategy.wait_seconds(2, 15.0), 40.0);
    }

    #[test]
    fn test_jitter_bounds_scale_the_wait() {
        let low = strategy_with_unit(0.0);
        let high = strategy_with_unit(1.0);
        assert_eq!(low.wait_seconds(0, 0.0), 5.0);
        assert_eq!(high.wait_seconds(0, 0.0), 15.0);
    }
}
