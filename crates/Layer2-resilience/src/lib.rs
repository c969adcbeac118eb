//! # voxgate-resilience
//!
//! Failure handling around the remote synthesis call:
//! - [`SynthesisError`]: error taxonomy and retry classification
//! - [`CircuitBreaker`]: sliding-window CLOSED / OPEN / HALF_OPEN breaker
//! - [`RetryExecutor`]: per-class exponential backoff gated by the breaker
//! - [`ErrorTracker`]: caller-visible error / mute state with paced recovery probes

pub mod circuit_breaker;
pub mod error;
pub mod error_state;
pub mod executor;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use error::{RetryClass, SynthesisError, SynthesisErrorKind};
pub use error_state::{ErrorState, ErrorTracker};
pub use executor::RetryExecutor;
pub use retry::{apply_jitter, backoff_delay};
