//! # voxgate-foundation
//!
//! Foundation layer for Voxgate:
//! - Error: 캐시 / 설정 / 저장소 에러
//! - Config: 통합 설정 (VoxgateConfig, 티어 한도, 브레이커, 재시도)
//! - Key: 요청 텍스트의 SHA-256 캐시 키
//!
//! ## 아키텍처
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  SpeechService (Layer3)                                   │
//! │      │                      │                             │
//! │      ▼                      ▼                             │
//! │  TieredCache (Layer2)   RetryExecutor (Layer2)            │
//! │  memory → sqlite → redis   CircuitBreaker + ErrorTracker   │
//! │      │                      │                             │
//! │      └──────────┬───────────┘                             │
//! │                 ▼                                         │
//! │      Foundation: Error, VoxgateConfig, CacheKey           │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod key;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    BackoffPolicy, CacheConfig, CircuitBreakerConfig, ConfigSource, ConfigStore,
    DistributedTierConfig, MemoryTierConfig, PersistentTierConfig, RecoveryConfig, RetryPolicy,
    VoxgateConfig, CACHE_DB_FILE, VOXGATE_CONFIG_ENV, VOXGATE_CONFIG_FILE,
};

// ============================================================================
// Key (캐시 키)
// ============================================================================
pub use key::CacheKey;
