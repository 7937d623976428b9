//! Exponential backoff reconnection logic.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};

use crate::common::error::ConnectionError;

/// Configuration for exponential backoff reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub base_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for each successive attempt.
    pub multiplier: f32,
    /// Consecutive failures after which the supervisor gives up.
    pub max_attempts: u32,
    /// Consecutive authentication rejections after which the supervisor gives up.
    pub max_auth_failures: u32,
    /// Randomize delays to avoid reconnect storms.
    pub jitter: bool,
    /// How long a session must stay up before it counts as a successful
    /// connect and clears the failure counters.
    pub stable_after: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            max_attempts: 5,
            max_auth_failures: 2,
            jitter: true,
            stable_after: Duration::from_secs(30),
        }
    }
}

/// What to do after a failed (re)connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then connect again.
    Retry(Duration),
    /// The failure is non-recoverable.
    GiveUp,
}

/// Tracks reconnection state and calculates delays.
#[derive(Debug)]
pub struct ReconnectState {
    config: ReconnectConfig,
    attempts: u32,
    auth_failures: u32,
    backoff: ExponentialBackoff,
}

impl ReconnectState {
    pub fn new(config: ReconnectConfig) -> Self {
        let backoff = build_backoff(&config);
        Self {
            config,
            attempts: 0,
            auth_failures: 0,
            backoff,
        }
    }

    /// Record a failure and decide whether to retry.
    pub fn on_failure(&mut self, error: &ConnectionError) -> RetryDecision {
        self.attempts += 1;

        if error.is_auth_rejection() {
            self.auth_failures += 1;
            if self.auth_failures >= self.config.max_auth_failures {
                return RetryDecision::GiveUp;
            }
        } else {
            self.auth_failures = 0;
        }

        if self.attempts >= self.config.max_attempts {
            return RetryDecision::GiveUp;
        }

        let delay = self.backoff.next().unwrap_or(self.config.max_delay);
        let delay = match error.retry_after() {
            Some(requested) => delay.max(requested),
            None => delay,
        };

        RetryDecision::Retry(delay)
    }

    /// Reset state once a session has proven stable.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.auth_failures = 0;
        self.backoff = build_backoff(&self.config);
    }

    /// Get current attempt count.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Get the configured attempt ceiling.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn stable_after(&self) -> Duration {
        self.config.stable_after
    }
}

fn build_backoff(config: &ReconnectConfig) -> ExponentialBackoff {
    let builder = ExponentialBuilder::default()
        .with_min_delay(config.base_delay)
        .with_max_delay(config.max_delay)
        .with_factor(config.multiplier)
        .without_max_times();

    if config.jitter {
        builder.with_jitter().build()
    } else {
        builder.build()
    }
}
