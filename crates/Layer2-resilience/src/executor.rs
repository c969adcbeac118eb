//! Retry executor
//!
//! Runs an async operation behind the circuit breaker:
//! 1. breaker가 막혀 있으면 시도 없이 `CircuitOpen`
//! 2. 성공 → error state 초기화, breaker에 success 기록
//! 3. 실패 → breaker에 failure 기록 후 분류
//!    - fatal: 즉시 반환
//!    - rate-limited / server / network: 클래스별 budget 안에서 backoff 후 재시도
//! 4. budget 소진 → error state 갱신, `RetryExhausted`

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{RetryClass, SynthesisError};
use crate::error_state::ErrorTracker;
use crate::retry::{backoff_delay, policy_for};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voxgate_foundation::RetryPolicy;

/// Per-class retry counters for one call
#[derive(Debug, Default)]
struct RetryCounters {
    rate_limited: u32,
    server: u32,
    network: u32,
}

impl RetryCounters {
    fn slot(&mut self, class: RetryClass) -> Option<&mut u32> {
        match class {
            RetryClass::RateLimited { .. } => Some(&mut self.rate_limited),
            RetryClass::Server => Some(&mut self.server),
            RetryClass::Network => Some(&mut self.network),
            RetryClass::Fatal => None,
        }
    }
}

/// Breaker-gated retry loop with cancellable backoff
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    breaker: Arc<CircuitBreaker>,
    errors: Arc<ErrorTracker>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryExecutor {
    pub fn new(breaker: Arc<CircuitBreaker>, errors: Arc<ErrorTracker>, policy: RetryPolicy) -> Self {
        Self {
            breaker,
            errors,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token for backoff cancellation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn error_tracker(&self) -> &Arc<ErrorTracker> {
        &self.errors
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Execute with the executor's default policy
    pub async fn execute<T, F, Fut>(&self, operation_name: &str, operation: F) -> Result<T, SynthesisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SynthesisError>>,
    {
        self.execute_with_retry(&self.policy, operation_name, operation)
            .await
    }

    /// Execute an async operation with retry logic
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, SynthesisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SynthesisError>>,
    {
        let max_attempts = policy.max_attempts();
        let mut counters = RetryCounters::default();
        let mut attempt: u32 = 0;
        let mut last_error: Option<SynthesisError> = None;

        loop {
            if !self.breaker.can_execute() {
                debug!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    "Circuit breaker open, call rejected"
                );
                // a breaker that tripped during our own retries ends the call unrecovered
                if let Some(last) = &last_error {
                    self.errors.record_failure(last);
                }
                return Err(SynthesisError::CircuitOpen);
            }

            attempt += 1;
            let error = match operation().await {
                Ok(result) => {
                    self.errors.record_success();
                    self.breaker.record_success();
                    if attempt > 1 {
                        info!(operation = operation_name, attempts = attempt, "Succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(e) => e,
            };

            self.breaker.record_failure();
            let class = error.classify();

            let (Some(backoff), Some(used)) = (policy_for(policy, class), counters.slot(class)) else {
                warn!(
                    operation = operation_name,
                    attempt,
                    code = error.code(),
                    error = %error,
                    "Non-retryable synthesis error"
                );
                self.errors.record_failure(&error);
                return Err(error);
            };

            if *used >= backoff.max_retries || attempt >= max_attempts {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    code = error.code(),
                    error = %error,
                    "Retry budget exhausted"
                );
                let exhausted = SynthesisError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                };
                self.errors.record_failure(&exhausted);
                return Err(exhausted);
            }

            let delay = backoff_delay(backoff, *used, error.retry_after());
            *used += 1;
            warn!(
                operation = operation_name,
                attempt,
                retry = *used,
                max_retries = backoff.max_retries,
                code = error.code(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Synthesis attempt failed, retrying"
            );
            last_error = Some(error);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(operation = operation_name, attempt, "Backoff cancelled");
                    return Err(SynthesisError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
