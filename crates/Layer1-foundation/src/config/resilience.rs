//! Circuit breaker, retry and recovery settings

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Circuit Breaker
// ============================================================================

/// Sliding-window circuit breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    /// Number of recent outcomes kept in the window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Failure rate (0.0 - 1.0) that opens the circuit once the window is full
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,

    /// Time spent open before a trial call is allowed (milliseconds)
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Consecutive half-open successes needed to close
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

fn default_window_size() -> usize {
    10
}
fn default_failure_threshold() -> f64 {
    0.5
}
fn default_cooldown_ms() -> u64 {
    60_000
}
fn default_success_threshold() -> u32 {
    3
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            success_threshold: default_success_threshold(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::invalid_config("breaker.windowSize", "must be > 0"));
        }
        if !(self.failure_threshold > 0.0 && self.failure_threshold <= 1.0) {
            return Err(Error::invalid_config(
                "breaker.failureThreshold",
                "must be in (0, 1]",
            ));
        }
        if self.success_threshold == 0 {
            return Err(Error::invalid_config(
                "breaker.successThreshold",
                "must be > 0",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Exponential backoff budget for one error class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    pub base_delay_ms: u64,

    /// Upper bound for any single delay (milliseconds)
    pub max_delay_ms: u64,

    /// Symmetric jitter as a fraction of the computed delay (0.1 = ±10%)
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,

    /// Multiplier for exponential backoff
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_jitter_fraction() -> f64 {
    0.1
}
fn default_multiplier() -> f64 {
    2.0
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            jitter_fraction: default_jitter_fraction(),
            multiplier: default_multiplier(),
        }
    }

    /// No retries for this class
    pub fn no_retry() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn with_jitter(mut self, jitter_fraction: f64) -> Self {
        self.jitter_fraction = jitter_fraction;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// n번째 재시도의 대기 시간 (jitter 적용 전)
    ///
    /// `min(base · multiplier^retry, max)`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.min(i32::MAX as u32) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Per-class retry budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    #[serde(default = "default_rate_limited")]
    pub rate_limited: BackoffPolicy,

    #[serde(default = "default_server_error")]
    pub server_error: BackoffPolicy,

    #[serde(default = "default_network")]
    pub network: BackoffPolicy,
}

fn default_rate_limited() -> BackoffPolicy {
    BackoffPolicy::new(5, 2000, 60_000)
}
fn default_server_error() -> BackoffPolicy {
    BackoffPolicy::new(3, 1000, 30_000)
}
fn default_network() -> BackoffPolicy {
    BackoffPolicy::new(3, 500, 10_000)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            rate_limited: default_rate_limited(),
            server_error: default_server_error(),
            network: default_network(),
        }
    }
}

impl RetryPolicy {
    /// 재시도 없음
    pub fn no_retry() -> Self {
        Self {
            rate_limited: BackoffPolicy::no_retry(),
            server_error: BackoffPolicy::no_retry(),
            network: BackoffPolicy::no_retry(),
        }
    }

    /// Same budget for every class
    pub fn uniform(policy: BackoffPolicy) -> Self {
        Self {
            rate_limited: policy.clone(),
            server_error: policy.clone(),
            network: policy,
        }
    }

    /// Total attempts allowed for one call: largest class budget + 1
    pub fn max_attempts(&self) -> u32 {
        self.rate_limited
            .max_retries
            .max(self.server_error.max_retries)
            .max(self.network.max_retries)
            .saturating_add(1)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, policy) in [
            ("retry.rateLimited", &self.rate_limited),
            ("retry.serverError", &self.server_error),
            ("retry.network", &self.network),
        ] {
            if !(0.0..=1.0).contains(&policy.jitter_fraction) {
                return Err(Error::invalid_config(field, "jitterFraction must be in [0, 1]"));
            }
            if policy.multiplier < 1.0 {
                return Err(Error::invalid_config(field, "multiplier must be >= 1.0"));
            }
            if policy.base_delay_ms > policy.max_delay_ms {
                return Err(Error::invalid_config(field, "baseDelayMs exceeds maxDelayMs"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Recovery
// ============================================================================

/// Pacing of recovery probes while the synthesis dependency is unhealthy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryConfig {
    /// Interval used for the first `fast_probe_limit` probes (seconds)
    #[serde(default = "default_fast_interval_secs")]
    pub fast_interval_secs: u64,

    /// Interval used once the fast probes are spent (seconds)
    #[serde(default = "default_slow_interval_secs")]
    pub slow_interval_secs: u64,

    #[serde(default = "default_fast_probe_limit")]
    pub fast_probe_limit: u32,
}

fn default_fast_interval_secs() -> u64 {
    30
}
fn default_slow_interval_secs() -> u64 {
    300
}
fn default_fast_probe_limit() -> u32 {
    3
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            fast_interval_secs: default_fast_interval_secs(),
            slow_interval_secs: default_slow_interval_secs(),
            fast_probe_limit: default_fast_probe_limit(),
        }
    }
}

impl RecoveryConfig {
    pub fn fast_interval(&self) -> Duration {
        Duration::from_secs(self.fast_interval_secs)
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_secs(self.slow_interval_secs)
    }

    /// Interval that applies after `probes` recovery checks
    pub fn interval_after(&self, probes: u32) -> Duration {
        if probes < self.fast_probe_limit {
            self.fast_interval()
        } else {
            self.slow_interval()
        }
    }
}
