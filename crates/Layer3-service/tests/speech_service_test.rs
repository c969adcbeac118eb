//! Speech service integration tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use voxgate_cache::TierKind;
use voxgate_foundation::{
    CacheConfig, CircuitBreakerConfig, PersistentTierConfig, RecoveryConfig, RetryPolicy,
    VoxgateConfig,
};
use voxgate_resilience::{CircuitState, SynthesisError, SynthesisErrorKind};
use voxgate_service::{SkipReason, SpeechOutcome, SpeechService, Synthesizer};

type Scripted = Result<Vec<u8>, SynthesisError>;

/// Replays scripted results, then echoes the text as audio
#[derive(Default)]
struct MockSynthesizer {
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicU32,
}

impl MockSynthesizer {
    fn scripted(results: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(results.into()),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(format!("audio:{text}").into_bytes()))
    }
}

fn memory_config() -> VoxgateConfig {
    VoxgateConfig::default()
        .with_cache(CacheConfig::minimal())
        .with_retry(RetryPolicy::no_retry())
}

#[tokio::test]
async fn test_miss_synthesizes_then_hits_cache() {
    let synth = MockSynthesizer::scripted(vec![]);
    let service = SpeechService::new(memory_config(), synth.clone()).await.unwrap();

    let first = service.speak("hello").await.unwrap();
    assert!(matches!(first, SpeechOutcome::Synthesized(_)));
    assert_eq!(&first.audio().unwrap()[..], b"audio:hello");

    let second = service.speak("hello").await.unwrap();
    assert!(second.is_cached());
    assert_eq!(second.audio(), first.audio());
    assert_eq!(synth.calls(), 1);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failure_mutes_until_recovery_probe() {
    let synth = MockSynthesizer::scripted(vec![Err(SynthesisError::server(503, "down"))]);
    let config = memory_config().with_recovery(RecoveryConfig {
        fast_interval_secs: 30,
        slow_interval_secs: 300,
        fast_probe_limit: 3,
    });
    let service = SpeechService::new(config, synth.clone()).await.unwrap();

    let err = service.speak("first").await.unwrap_err();
    assert_eq!(err.kind(), SynthesisErrorKind::RetryExhausted);
    assert!(service.error_state().muted);

    let skipped = service.speak("second").await.unwrap();
    assert!(matches!(skipped, SpeechOutcome::Skipped(SkipReason::Muted)));
    assert_eq!(synth.calls(), 1);

    tokio::time::advance(Duration::from_secs(30)).await;
    let recovered = service.speak("second").await.unwrap();
    assert!(matches!(recovered, SpeechOutcome::Synthesized(_)));
    assert_eq!(synth.calls(), 2);
    assert!(!service.error_state().has_error);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_skips_synthesis() {
    let synth = MockSynthesizer::scripted(vec![Err(SynthesisError::timeout("slow"))]);
    let config = memory_config()
        .with_breaker(CircuitBreakerConfig {
            window_size: 1,
            ..Default::default()
        })
        .with_recovery(RecoveryConfig {
            fast_interval_secs: 0,
            slow_interval_secs: 0,
            fast_probe_limit: 0,
        });
    let service = SpeechService::new(config, synth.clone()).await.unwrap();

    assert!(service.speak("a").await.is_err());
    assert_eq!(service.circuit_breaker_state().state, CircuitState::Open);

    let outcome = service.speak("b").await.unwrap();
    assert!(matches!(outcome, SpeechOutcome::Skipped(SkipReason::CircuitOpen)));
    assert_eq!(synth.calls(), 1);

    service.reset_circuit_breaker();
    assert_eq!(service.circuit_breaker_state().state, CircuitState::Closed);
    assert!(service.speak("b").await.unwrap().audio().is_some());

    service.shutdown().await;
}

#[tokio::test]
async fn test_cached_audio_served_while_muted() {
    let synth = MockSynthesizer::scripted(vec![Err(SynthesisError::auth("revoked key"))]);
    let service = SpeechService::new(memory_config(), synth.clone()).await.unwrap();

    assert_eq!(service.warm(vec![("greeting", b"pcm".to_vec())]).await, 1);

    let err = service.speak("other").await.unwrap_err();
    assert!(!err.is_recoverable());
    assert!(service.error_state().muted);

    let cached = service.speak("greeting").await.unwrap();
    assert!(cached.is_cached());
    assert_eq!(synth.calls(), 1);

    service.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_speakers() {
    let synth = MockSynthesizer::scripted(vec![]);
    let service = Arc::new(SpeechService::new(memory_config(), synth.clone()).await.unwrap());

    let texts: Vec<String> = (0..8).map(|i| format!("line {}", i % 4)).collect();
    let outcomes = futures::future::join_all(texts.iter().map(|t| service.speak(t))).await;

    for (text, outcome) in texts.iter().zip(outcomes) {
        let outcome = outcome.unwrap();
        assert_eq!(&outcome.audio().unwrap()[..], format!("audio:{text}").as_bytes());
    }
    let report = service.comprehensive_stats().await;
    assert_eq!(report.tier(TierKind::Memory).unwrap().backend.as_ref().unwrap().entries, 4);

    service.shutdown().await;
}

#[tokio::test]
async fn test_persistent_tier_survives_restart() {
    let dir = tempdir().unwrap();
    let mut cache = CacheConfig::default();
    cache.persistent = PersistentTierConfig {
        path: Some(dir.path().join("audio.db")),
        ..Default::default()
    };
    let config = memory_config().with_cache(cache);

    let synth = MockSynthesizer::scripted(vec![]);
    let service = SpeechService::new(config.clone(), synth.clone()).await.unwrap();
    service.speak("keep me").await.unwrap();
    service.shutdown().await;
    drop(service);

    let restarted = SpeechService::new(config, synth.clone()).await.unwrap();
    let outcome = restarted.speak("keep me").await.unwrap();
    assert!(outcome.is_cached());
    assert_eq!(synth.calls(), 1);
    restarted.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let service = SpeechService::new(memory_config(), MockSynthesizer::scripted(vec![]))
        .await
        .unwrap();
    service.shutdown().await;
    service.shutdown().await;
    assert!(service.executor().cancel_token().is_cancelled());
}
