//! Error types for Voxgate
//!
//! 캐시 / 설정 / 저장소 에러를 중앙에서 관리.
//! Synthesis 호출 에러는 `voxgate-resilience`의 `SynthesisError`가 담당한다.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Voxgate 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfig { field: String, message: String },

    // ========================================================================
    // 저장소 관련
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cache backend error: {tier} - {message}")]
    Backend { tier: String, message: String },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Backend 에러 생성 헬퍼
    pub fn backend(tier: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Backend {
            tier: tier.into(),
            message: message.into(),
        }
    }

    /// 설정 검증 에러 생성 헬퍼
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// I/O 계열 에러인지 확인 (재시도하면 해결될 수 있음)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Unavailable(_) | Error::Backend { .. } | Error::Sqlite(_)
        )
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
