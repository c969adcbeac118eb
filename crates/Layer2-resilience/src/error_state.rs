//! Caller-visible error / mute state
//!
//! 실패가 이어지면 mute 상태가 되고, 복구 probe는 간격을 두고만 허용한다.
//! 처음 `fast_probe_limit`번은 빠른 간격, 이후에는 느린 간격.

use crate::error::{SynthesisError, SynthesisErrorKind};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};
use voxgate_foundation::RecoveryConfig;

/// Snapshot of the dependency's health as seen by callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorState {
    pub has_error: bool,
    pub error_kind: Option<SynthesisErrorKind>,
    pub message: Option<String>,
    pub consecutive_failures: u32,
    pub last_error_time: Option<DateTime<Utc>>,
    pub recovery_check_count: u32,
    pub muted: bool,
}

#[derive(Debug, Default)]
struct TrackerInner {
    state: ErrorState,
    /// Monotonic time of the last failure or permitted probe
    last_mark: Option<Instant>,
}

/// Shared error-state bookkeeping
#[derive(Debug)]
pub struct ErrorTracker {
    config: RecoveryConfig,
    inner: Mutex<TrackerInner>,
}

impl ErrorTracker {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(TrackerInner::default()),
        }
    }

    /// Record an unrecovered failure and mute
    pub fn record_failure(&self, error: &SynthesisError) {
        let mut inner = self.inner.lock();
        let root = error.root();
        let state = &mut inner.state;
        state.has_error = true;
        state.error_kind = Some(error.kind());
        state.message = Some(root.to_string());
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_error_time = Some(Utc::now());
        state.muted = true;
        let consecutive = state.consecutive_failures;
        inner.last_mark = Some(Instant::now());

        debug!(
            code = error.code(),
            consecutive_failures = consecutive,
            "Synthesis error state updated"
        );
    }

    /// Clear everything after a success
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state.has_error {
            info!(
                consecutive_failures = inner.state.consecutive_failures,
                recovery_checks = inner.state.recovery_check_count,
                "Synthesis recovered"
            );
        }
        *inner = TrackerInner::default();
    }

    pub fn snapshot(&self) -> ErrorState {
        self.inner.lock().state.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().state.muted
    }

    /// Whether a recovery probe may be made now
    ///
    /// Always true while healthy. While in error, true once the interval for
    /// the current probe count has passed since the last failure or probe;
    /// each permitted probe is counted.
    pub fn should_attempt_recovery(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.state.has_error {
            return true;
        }

        let interval = self.config.interval_after(inner.state.recovery_check_count);
        let due = inner
            .last_mark
            .map_or(true, |mark| mark.elapsed() >= interval);
        if due {
            inner.state.recovery_check_count += 1;
            inner.last_mark = Some(Instant::now());
            debug!(
                probe = inner.state.recovery_check_count,
                interval_secs = interval.as_secs(),
                "Recovery probe permitted"
            );
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker() -> ErrorTracker {
        ErrorTracker::new(RecoveryConfig {
            fast_interval_secs: 10,
            slow_interval_secs: 60,
            fast_probe_limit: 2,
        })
    }

    #[tokio::test]
    async fn test_failure_mutes_and_success_clears() {
        let tracker = tracker();
        tracker.record_failure(&SynthesisError::server(503, "unavailable"));
        tracker.record_failure(&SynthesisError::server(503, "unavailable"));

        let state = tracker.snapshot();
        assert!(state.has_error);
        assert!(state.muted);
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.error_kind, Some(SynthesisErrorKind::Server));
        assert!(state.last_error_time.is_some());

        tracker.record_success();
        assert_eq!(tracker.snapshot(), ErrorState::default());
        assert!(!tracker.is_muted());
    }

    #[tokio::test]
    async fn test_exhausted_error_keeps_outer_kind_and_inner_message() {
        let tracker = tracker();
        tracker.record_failure(&SynthesisError::RetryExhausted {
            attempts: 3,
            last: Box::new(SynthesisError::timeout("read timed out")),
        });

        let state = tracker.snapshot();
        assert_eq!(state.error_kind, Some(SynthesisErrorKind::RetryExhausted));
        assert!(state.message.unwrap().contains("read timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_interval_escalates() {
        let tracker = tracker();
        assert!(tracker.should_attempt_recovery());
        assert_eq!(tracker.snapshot().recovery_check_count, 0);

        tracker.record_failure(&SynthesisError::network("refused"));
        assert!(!tracker.should_attempt_recovery());

        // two fast probes
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(tracker.should_attempt_recovery());
        assert!(!tracker.should_attempt_recovery());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(tracker.should_attempt_recovery());

        // then the slow interval
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!tracker.should_attempt_recovery());
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(tracker.should_attempt_recovery());
        assert_eq!(tracker.snapshot().recovery_check_count, 3);
    }
}
