//! Speech service
//!
//! Cache-first synthesis:
//! 1. 캐시 hit → `Cached`
//! 2. mute 상태이고 recovery probe 시점이 아니면 → `Skipped`
//! 3. executor로 synthesis (breaker + retry) → 성공 시 모든 tier에 저장

use crate::synthesizer::Synthesizer;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voxgate_cache::{spawn_cleanup_task, CacheReport, CleanupHandle, Payload, TieredCache};
use voxgate_foundation::{Result, VoxgateConfig};
use voxgate_resilience::{
    CircuitBreaker, CircuitBreakerStats, ErrorState, ErrorTracker, RetryExecutor, SynthesisError,
};

/// Why `speak` produced no audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Recent failures; waiting for the next recovery probe
    Muted,
    /// Breaker rejected the call
    CircuitOpen,
}

/// Result of a `speak` call
#[derive(Debug, Clone)]
pub enum SpeechOutcome {
    Cached(Payload),
    Synthesized(Payload),
    Skipped(SkipReason),
}

impl SpeechOutcome {
    pub fn audio(&self) -> Option<&Payload> {
        match self {
            SpeechOutcome::Cached(audio) | SpeechOutcome::Synthesized(audio) => Some(audio),
            SpeechOutcome::Skipped(_) => None,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, SpeechOutcome::Cached(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, SpeechOutcome::Skipped(_))
    }
}

/// Composition root: one cache, one breaker, one executor, one synthesizer
pub struct SpeechService {
    cache: Arc<TieredCache>,
    executor: RetryExecutor,
    synthesizer: Arc<dyn Synthesizer>,
    shutdown: CancellationToken,
    cleanup: Mutex<Option<CleanupHandle>>,
}

impl SpeechService {
    /// Open the configured cache tiers and start background cleanup
    pub async fn new(config: VoxgateConfig, synthesizer: Arc<dyn Synthesizer>) -> Result<Self> {
        config.validate()?;
        let cache = TieredCache::from_config(config.cache.clone()).await?;
        Ok(Self::with_cache(&config, Arc::new(cache), synthesizer))
    }

    /// Build around an existing cache
    ///
    /// Must be called inside a tokio runtime (spawns the cleanup loop).
    pub fn with_cache(
        config: &VoxgateConfig,
        cache: Arc<TieredCache>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        let shutdown = CancellationToken::new();

        let breaker = Arc::new(CircuitBreaker::new(
            synthesizer.name().to_string(),
            config.breaker.clone(),
        ));
        let errors = Arc::new(ErrorTracker::new(config.recovery.clone()));
        let executor = RetryExecutor::new(breaker, errors, config.retry.clone())
            .with_cancellation(shutdown.child_token());

        let cleanup = spawn_cleanup_task(
            Arc::clone(&cache),
            config.cache.cleanup_interval(),
            shutdown.child_token(),
        );

        info!(
            synthesizer = synthesizer.name(),
            tiers = ?cache.tier_kinds(),
            "Speech service started"
        );

        Self {
            cache,
            executor,
            synthesizer,
            shutdown,
            cleanup: Mutex::new(Some(cleanup)),
        }
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Audio for `text`, from cache or a fresh synthesis
    ///
    /// Returns `Err` only for synthesis failures other than a breaker
    /// rejection; those map to [`SpeechOutcome::Skipped`].
    pub async fn speak(&self, text: &str) -> std::result::Result<SpeechOutcome, SynthesisError> {
        if let Some(audio) = self.cache.get(text).await {
            return Ok(SpeechOutcome::Cached(audio));
        }

        let errors = self.executor.error_tracker();
        if errors.is_muted() && !errors.should_attempt_recovery() {
            debug!(chars = text.chars().count(), "Synthesis muted, skipping");
            return Ok(SpeechOutcome::Skipped(SkipReason::Muted));
        }

        let synthesizer = &self.synthesizer;
        let result = self
            .executor
            .execute("synthesize", || synthesizer.synthesize(text))
            .await;

        match result {
            Ok(audio) => {
                let audio = Payload::from(audio);
                self.cache.put(text, Arc::clone(&audio)).await;
                Ok(SpeechOutcome::Synthesized(audio))
            }
            Err(SynthesisError::CircuitOpen) => {
                debug!("Circuit open, skipping synthesis");
                Ok(SpeechOutcome::Skipped(SkipReason::CircuitOpen))
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, "Synthesis failed");
                Err(e)
            }
        }
    }

    /// Preload audio without calling the synthesizer
    pub async fn warm<I, T, P>(&self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (T, P)>,
        T: AsRef<str>,
        P: Into<Payload>,
    {
        self.cache.warm(pairs).await
    }

    pub async fn comprehensive_stats(&self) -> CacheReport {
        self.cache.comprehensive_stats().await
    }

    pub fn circuit_breaker_state(&self) -> CircuitBreakerStats {
        self.executor.breaker().stats()
    }

    pub fn reset_circuit_breaker(&self) {
        self.executor.breaker().reset();
    }

    pub fn error_state(&self) -> ErrorState {
        self.executor.error_tracker().snapshot()
    }

    /// Stop background work and cancel pending backoff sleeps
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.cleanup.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!("Speech service stopped");
        }
    }
}

impl Drop for SpeechService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
