//! # voxgate-service
//!
//! Cache-first speech synthesis. [`SpeechService`] ties a [`voxgate_cache::TieredCache`]
//! to a [`Synthesizer`] through the breaker-gated retry executor.

pub mod service;
pub mod synthesizer;

pub use service::{SkipReason, SpeechOutcome, SpeechService};
pub use synthesizer::Synthesizer;
