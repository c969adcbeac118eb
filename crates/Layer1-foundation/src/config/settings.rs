//! Voxgate Config - 통합 설정
//!
//! 캐시 / 서킷 브레이커 / 재시도 / 복구 설정을 한 파일로 관리한다.
//! 생성 시점에 한 번만 읽는다.

use super::store::{load_json_file, ConfigStore};
use super::{CacheConfig, CircuitBreakerConfig, RecoveryConfig, RetryPolicy};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 설정 파일명
pub const VOXGATE_CONFIG_FILE: &str = "config.json";

/// Environment variable pointing at an explicit config file
pub const VOXGATE_CONFIG_ENV: &str = "VOXGATE_CONFIG";

/// Voxgate 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoxgateConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub recovery: RecoveryConfig,
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl VoxgateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// Load with the usual precedence
    ///
    /// 1. `$VOXGATE_CONFIG`
    /// 2. 프로젝트 `.voxgate/config.json`
    /// 3. 글로벌 `<config_dir>/voxgate/config.json`
    /// 4. 기본값
    pub fn load() -> Result<(Self, ConfigSource)> {
        if let Ok(path) = std::env::var(VOXGATE_CONFIG_ENV) {
            let path = PathBuf::from(path);
            let config = Self::load_from(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        let mut candidates = Vec::new();
        if let Ok(project) = ConfigStore::current_project() {
            candidates.push(project);
        }
        if let Ok(global) = ConfigStore::global() {
            candidates.push(global);
        }

        for store in candidates {
            if let Some(config) = store.load_optional::<VoxgateConfig>(VOXGATE_CONFIG_FILE)? {
                config.validate()?;
                let path = store.file_path(VOXGATE_CONFIG_FILE);
                debug!(path = %path.display(), "Loaded configuration");
                return Ok((config, ConfigSource::File(path)));
            }
        }

        Ok((Self::default(), ConfigSource::Defaults))
    }

    /// Load a specific file and validate it
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: VoxgateConfig = load_json_file(path)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// 글로벌 설정 저장
    pub fn save_global(&self) -> Result<()> {
        let store = ConfigStore::global()?;
        store.save(VOXGATE_CONFIG_FILE, self)
    }

    /// 프로젝트 설정 저장
    pub fn save_project(&self) -> Result<()> {
        let store = ConfigStore::current_project()?;
        store.save(VOXGATE_CONFIG_FILE, self)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.breaker.validate()?;
        self.retry.validate()?;
        Ok(())
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = recovery;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "cache": {"memory": {"maxSize": 7}},
                "breaker": {"windowSize": 4, "failureThreshold": 0.75},
                "retry": {"rateLimited": {"maxRetries": 2, "baseDelayMs": 10, "maxDelayMs": 100}}
            }"#,
        )
        .unwrap();

        let config = VoxgateConfig::load_from(&path).unwrap();
        assert_eq!(config.cache.memory.max_size, 7);
        assert_eq!(config.breaker.window_size, 4);
        assert_eq!(config.breaker.success_threshold, 3);
        assert_eq!(config.retry.rate_limited.max_retries, 2);
        assert_eq!(config.retry.rate_limited.multiplier, 2.0);
        assert_eq!(config.retry.server_error, RetryPolicy::default().server_error);
    }

    #[test]
    fn test_load_from_rejects_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"breaker": {"windowSize": 0}}"#).unwrap();
        assert!(VoxgateConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_round_trip_through_store() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let config = VoxgateConfig::new().with_cache(CacheConfig::minimal());
        store.save(VOXGATE_CONFIG_FILE, &config).unwrap();

        let loaded = VoxgateConfig::load_from(&store.file_path(VOXGATE_CONFIG_FILE)).unwrap();
        assert!(!loaded.cache.persistent.enabled);
        assert_eq!(loaded.cache.memory.max_size, 100);
    }
}
