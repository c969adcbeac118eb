//! Synthesis provider boundary

use async_trait::async_trait;
use voxgate_resilience::SynthesisError;

/// Remote text-to-speech call
///
/// Implementations map transport failures onto [`SynthesisError`] (for HTTP
/// APIs, [`SynthesisError::from_http_status`]) so the executor can classify
/// them.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str {
        "synthesizer"
    }

    /// Produce audio bytes for `text`
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;
}
