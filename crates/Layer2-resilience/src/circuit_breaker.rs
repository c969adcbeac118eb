//! # Circuit Breaker
//!
//! Sliding-window failure-rate breaker guarding the synthesis dependency.
//!
//! ```text
//!            window full && rate >= threshold
//!   CLOSED ─────────────────────────────────▶ OPEN
//!     ▲                                        │ cooldown elapsed
//!     │ success_threshold successes            ▼ (next can_execute)
//!     └──────────────────────────────────── HALF_OPEN
//!                    any failure ──▶ OPEN
//! ```
//!
//! Recording an outcome and evaluating the transition it causes happen under
//! one lock, so two concurrent failures can never both decide to open.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use voxgate_foundation::CircuitBreakerConfig;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls fail fast without executing
    Open,
    /// Testing recovery - calls allowed until a success streak or a failure
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable snapshot of the breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub window_len: usize,
    pub window_size: usize,
    pub failure_rate: f64,
    /// Failures recorded since the breaker last closed
    pub failure_count: u64,
    /// Consecutive successes while half-open
    pub success_count: u32,
    pub total_successes: u64,
    pub total_failures: u64,
    pub transitions: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_for_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since_last_failure_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    window: VecDeque<bool>,
    failure_count: u64,
    success_count: u32,
    opened_at: Option<Instant>,
    last_failure_time: Option<Instant>,
    total_successes: u64,
    total_failures: u64,
    transitions: u64,
}

impl BreakerInner {
    fn new(window_size: usize) -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::with_capacity(window_size),
            failure_count: 0,
            success_count: 0,
            opened_at: None,
            last_failure_time: None,
            total_successes: 0,
            total_failures: 0,
            transitions: 0,
        }
    }

    /// `true` = success
    fn push(&mut self, outcome: bool, window_size: usize) {
        while self.window.len() >= window_size {
            self.window.pop_front();
        }
        self.window.push_back(outcome);
    }

    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|ok| !**ok).count();
        failures as f64 / self.window.len() as f64
    }
}

/// Sliding-window circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        debug!(
            component = %name,
            window_size = config.window_size,
            failure_threshold = config.failure_threshold,
            cooldown_ms = config.cooldown_ms,
            success_threshold = config.success_threshold,
            "Circuit breaker initialized"
        );
        Self {
            inner: Mutex::new(BreakerInner::new(config.window_size)),
            name,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state (does not evaluate the cooldown)
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Whether a call may proceed
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open here.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.config.cooldown());
                if cooled {
                    inner.success_count = 0;
                    self.transition(&mut inner, CircuitState::HalfOpen);
                }
                cooled
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.push(true, self.config.window_size);
        inner.total_successes += 1;

        if inner.state == CircuitState::HalfOpen {
            inner.success_count += 1;
            if inner.success_count >= self.config.success_threshold {
                inner.window.clear();
                inner.failure_count = 0;
                inner.success_count = 0;
                inner.opened_at = None;
                self.transition(&mut inner, CircuitState::Closed);
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.push(false, self.config.window_size);
        inner.failure_count += 1;
        inner.total_failures += 1;
        inner.last_failure_time = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                let full = inner.window.len() == self.config.window_size;
                if full && inner.failure_rate() >= self.config.failure_threshold {
                    inner.opened_at = Some(Instant::now());
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                inner.success_count = 0;
                inner.opened_at = Some(Instant::now());
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    /// Force CLOSED and forget all history
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        let transitions = inner.transitions;
        *inner = BreakerInner::new(self.config.window_size);
        inner.transitions = transitions;
        if previous != CircuitState::Closed {
            inner.transitions += 1;
        }
        info!(component = %self.name, from = %previous, "Circuit breaker reset");
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            window_len: inner.window.len(),
            window_size: self.config.window_size,
            failure_rate: inner.failure_rate(),
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            transitions: inner.transitions,
            open_for_ms: inner
                .opened_at
                .filter(|_| inner.state != CircuitState::Closed)
                .map(|at| at.elapsed().as_millis() as u64),
            since_last_failure_ms: inner
                .last_failure_time
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.transitions += 1;

        let failure_rate = inner.failure_rate();
        match to {
            CircuitState::Open => warn!(
                component = %self.name,
                from = %from,
                to = %to,
                failure_rate,
                window_len = inner.window.len(),
                cooldown_ms = self.config.cooldown_ms,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => info!(
                component = %self.name,
                from = %from,
                to = %to,
                "Circuit breaker half-open, allowing trial calls"
            ),
            CircuitState::Closed => info!(
                component = %self.name,
                from = %from,
                to = %to,
                "Circuit breaker closed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(window_size: usize, threshold: f64) -> CircuitBreaker {
        CircuitBreaker::new(
            "tts",
            CircuitBreakerConfig {
                window_size,
                failure_threshold: threshold,
                cooldown_ms: 1000,
                success_threshold: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_partial_window_never_opens() {
        let cb = breaker(5, 0.5);
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_opens_at_exact_threshold() {
        let cb = breaker(4, 0.5);
        cb.record_success();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[tokio::test]
    async fn test_sliding_window_evaluation() {
        let cb = breaker(4, 0.5);
        for outcome in [true, true, true, false, true, false] {
            if outcome {
                cb.record_success();
            } else {
                cb.record_failure();
            }
        }
        // window = [true, false, true, false] after the first 2 slide out -> 0.5
        assert_eq!(cb.state(), CircuitState::Open);

        let cb = breaker(4, 0.75);
        for outcome in [false, true, false, true, false] {
            if outcome {
                cb.record_success();
            } else {
                cb.record_failure();
            }
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().window_len, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_moves_to_half_open() {
        let cb = breaker(2, 0.5);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!cb.can_execute());
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // window is kept on the way to half-open
        assert_eq!(cb.stats().window_len, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_successes() {
        let cb = breaker(2, 0.5);
        cb.record_failure();
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.can_execute());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);

        let stats = cb.stats();
        assert_eq!(stats.window_len, 0);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.transitions, 3);
        assert!(stats.open_for_ms.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(2, 0.5);
        cb.record_failure();
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.can_execute());

        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // cooldown restarts from the reopen
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!cb.can_execute());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(cb.can_execute());
    }

    #[tokio::test]
    async fn test_outcomes_recorded_while_open() {
        let cb = breaker(3, 0.5);
        for _ in 0..3 {
            cb.record_failure();
        }
        cb.record_success();
        cb.record_success();
        cb.record_success();

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.window_len, 3);
        assert_eq!(stats.failure_rate, 0.0);
        assert_eq!(stats.total_successes, 3);
    }

    #[tokio::test]
    async fn test_reset_forces_closed() {
        let cb = breaker(2, 0.5);
        cb.record_failure();
        cb.record_failure();
        cb.reset();

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.window_len, 0);
        assert_eq!(stats.total_failures, 0);
        assert!(cb.can_execute());
    }

    #[tokio::test]
    async fn test_stats_serialize_state_names() {
        let cb = breaker(2, 0.5);
        let json = serde_json::to_value(cb.stats()).unwrap();
        assert_eq!(json["state"], "CLOSED");
        assert_eq!(json["windowSize"], 2);
    }

    fn shared_breaker(window_size: usize) -> std::sync::Arc<CircuitBreaker> {
        std::sync::Arc::new(CircuitBreaker::new(
            "tts",
            CircuitBreakerConfig {
                window_size,
                failure_threshold: 0.5,
                cooldown_ms: 60_000,
                success_threshold: 2,
            },
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_open_exactly_once() {
        let cb = shared_breaker(20);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cb = std::sync::Arc::clone(&cb);
                tokio::spawn(async move {
                    for _ in 0..50 {
                        cb.record_failure();
                        assert!(cb.stats().window_len <= 20);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.transitions, 1);
        assert_eq!(stats.window_len, 20);
        assert_eq!(stats.total_failures, 800);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mixed_outcomes_keep_window_bounded() {
        let cb = shared_breaker(10);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let cb = std::sync::Arc::clone(&cb);
                tokio::spawn(async move {
                    for _ in 0..100 {
                        if i % 2 == 0 {
                            cb.record_failure();
                        } else {
                            cb.record_success();
                        }
                        let stats = cb.stats();
                        assert!(stats.window_len <= 10);
                        assert!(stats.transitions <= 1);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let stats = cb.stats();
        assert_eq!(stats.total_failures + stats.total_successes, 800);
        assert_eq!(stats.window_len, 10);
        assert!(stats.transitions <= 1);
    }
}
