//! Backoff delay computation

use crate::error::RetryClass;
use rand::Rng;
use std::time::Duration;
use voxgate_foundation::{BackoffPolicy, RetryPolicy};

/// Budget that applies to a retryable class (`None` for fatal errors)
pub fn policy_for(policy: &RetryPolicy, class: RetryClass) -> Option<&BackoffPolicy> {
    match class {
        RetryClass::RateLimited { .. } => Some(&policy.rate_limited),
        RetryClass::Server => Some(&policy.server_error),
        RetryClass::Network => Some(&policy.network),
        RetryClass::Fatal => None,
    }
}

/// Spread `delay` uniformly over `delay ± delay·fraction`, floored at zero
pub fn apply_jitter(delay: Duration, fraction: f64) -> Duration {
    if fraction <= 0.0 || delay.is_zero() {
        return delay;
    }
    let base = delay.as_secs_f64();
    let spread = base * fraction;
    let sampled = rand::thread_rng().gen_range((base - spread)..=(base + spread));
    Duration::from_secs_f64(sampled.max(0.0))
}

/// Sleep before retry number `retry` (0-based) of one class
///
/// A retry-after hint replaces the computed delay, capped at `max_delay`.
pub fn backoff_delay(policy: &BackoffPolicy, retry: u32, retry_after: Option<Duration>) -> Duration {
    match retry_after {
        Some(hint) => hint.min(policy.max_delay()),
        None => apply_jitter(policy.delay_for_retry(retry), policy.jitter_fraction),
    }
}
