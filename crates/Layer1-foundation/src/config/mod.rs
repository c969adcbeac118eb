//! Config - 통합 설정 관리
//!
//! - `cache.rs` - 티어별 캐시 한도
//! - `resilience.rs` - 서킷 브레이커 / 재시도 / 복구
//! - `settings.rs` - VoxgateConfig 통합 설정
//! - `store.rs` - JSON 파일 저장소

mod cache;
mod resilience;
mod settings;
mod store;

pub use cache::{
    CacheConfig, DistributedTierConfig, MemoryTierConfig, PersistentTierConfig, CACHE_DB_FILE,
};
pub use resilience::{BackoffPolicy, CircuitBreakerConfig, RecoveryConfig, RetryPolicy};
pub use settings::{ConfigSource, VoxgateConfig, VOXGATE_CONFIG_ENV, VOXGATE_CONFIG_FILE};
pub use store::{load_json_file, ConfigStore};
