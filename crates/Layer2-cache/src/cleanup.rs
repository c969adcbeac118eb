//! Background expiry sweeps

use crate::tiered::TieredCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Handle to a running cleanup loop
#[derive(Debug)]
pub struct CleanupHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl CleanupHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Cleanup task ended abnormally");
        }
    }
}

/// Sweep every tier each `interval` until `token` is cancelled
///
/// 각 iteration은 별도 task에서 실행되어 panic이 루프를 멈추지 않는다.
pub fn spawn_cleanup_task(
    cache: Arc<TieredCache>,
    interval: Duration,
    token: CancellationToken,
) -> CleanupHandle {
    let loop_token = token.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        info!(interval_secs = interval.as_secs_f64(), "Cache cleanup loop started");
        loop {
            tokio::select! {
                _ = loop_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let cache = Arc::clone(&cache);
            let sweep = tokio::spawn(async move { cache.cleanup_expired().await });
            match sweep.await {
                Ok(report) => debug!(
                    removed = report.removed,
                    failed_tiers = report.failed_tiers.len(),
                    "Cleanup iteration finished"
                ),
                Err(e) => error!(error = %e, "Cleanup iteration panicked"),
            }
        }
        info!("Cache cleanup loop stopped");
    });

    CleanupHandle { token, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CacheBackend, MemoryBackend, TierKind};
    use voxgate_foundation::{CacheConfig, CacheKey};

    #[tokio::test(start_paused = true)]
    async fn test_loop_sweeps_and_stops() {
        let memory = Arc::new(MemoryBackend::with_limits(10, 1024, None));
        let cache = Arc::new(
            TieredCache::builder(CacheConfig::minimal())
                .backend(memory.clone())
                .build(),
        );
        memory
            .put(
                &CacheKey::from_text("a"),
                Arc::from(&b"x"[..]),
                Some(Duration::from_secs(1)),
            )
            .await
            .unwrap();

        let handle = spawn_cleanup_task(
            Arc::clone(&cache),
            Duration::from_secs(10),
            CancellationToken::new(),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;

        let stats = cache.backend(TierKind::Memory).unwrap().stats().await.unwrap();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.expirations, 1);

        handle.shutdown().await;
    }
}
