//! Synthesis error taxonomy
//!
//! 원격 synthesis 호출 실패를 분류한다:
//! - 재시도 대상: RateLimited / Server / Network
//! - 즉시 실패: Auth / InvalidRequest
//! - executor가 만드는 종료 상태: RetryExhausted / CircuitOpen / Cancelled

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by a synthesis call or by the executor around it
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Credentials rejected (401/403)
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded{}", .retry_after_ms.map(|ms| format!(", retry after {}ms", ms)).unwrap_or_default())]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },

    /// Server error (5xx)
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Connection failure or timeout
    #[error("Network error{}: {message}", .timed_out.then_some(" (timed out)").unwrap_or_default())]
    Network {
        message: String,
        timed_out: bool,
        #[source]
        source: Option<BoxError>,
    },

    /// Request rejected as malformed (other 4xx)
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Class budget or global attempt bound spent
    #[error("Retry budget exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<SynthesisError>,
    },

    /// Breaker refused the call
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// Backoff interrupted by shutdown
    #[error("Operation cancelled")]
    Cancelled,
}

/// Machine-readable error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisErrorKind {
    Auth,
    RateLimited,
    Server,
    Network,
    Timeout,
    InvalidRequest,
    RetryExhausted,
    CircuitOpen,
    Cancelled,
}

impl SynthesisErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SynthesisErrorKind::Auth => "auth",
            SynthesisErrorKind::RateLimited => "rate_limited",
            SynthesisErrorKind::Server => "server_error",
            SynthesisErrorKind::Network => "network",
            SynthesisErrorKind::Timeout => "timeout",
            SynthesisErrorKind::InvalidRequest => "invalid_request",
            SynthesisErrorKind::RetryExhausted => "retry_exhausted",
            SynthesisErrorKind::CircuitOpen => "circuit_open",
            SynthesisErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SynthesisErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the executor treats an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    RateLimited { retry_after_ms: Option<u64> },
    Server,
    Network,
    /// Never retried
    Fatal,
}

impl SynthesisError {
    // ========================================================================
    // Constructors
    // ========================================================================

    pub fn auth(message: impl Into<String>) -> Self {
        SynthesisError::Auth {
            message: message.into(),
        }
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        SynthesisError::RateLimited {
            message: "Too many requests".to_string(),
            retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        SynthesisError::Server {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        SynthesisError::Network {
            message: message.into(),
            timed_out: false,
            source: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        SynthesisError::Network {
            message: message.into(),
            timed_out: true,
            source: None,
        }
    }

    /// Network error wrapping its underlying cause
    pub fn network_caused_by(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SynthesisError::Network {
            message: message.into(),
            timed_out: false,
            source: Some(Box::new(cause)),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        SynthesisError::InvalidRequest {
            message: message.into(),
        }
    }

    /// Map an HTTP status and response body to an error
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => SynthesisError::auth(body),
            429 => SynthesisError::RateLimited {
                message: body.to_string(),
                retry_after_ms: extract_retry_after(body),
            },
            408 => SynthesisError::timeout(format!("HTTP 408: {}", body)),
            500..=599 => SynthesisError::server(status, body),
            _ => SynthesisError::invalid_request(format!("HTTP {}: {}", status, body)),
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn kind(&self) -> SynthesisErrorKind {
        match self {
            SynthesisError::Auth { .. } => SynthesisErrorKind::Auth,
            SynthesisError::RateLimited { .. } => SynthesisErrorKind::RateLimited,
            SynthesisError::Server { .. } => SynthesisErrorKind::Server,
            SynthesisError::Network {
                timed_out: true, ..
            } => SynthesisErrorKind::Timeout,
            SynthesisError::Network { .. } => SynthesisErrorKind::Network,
            SynthesisError::InvalidRequest { .. } => SynthesisErrorKind::InvalidRequest,
            SynthesisError::RetryExhausted { .. } => SynthesisErrorKind::RetryExhausted,
            SynthesisError::CircuitOpen => SynthesisErrorKind::CircuitOpen,
            SynthesisError::Cancelled => SynthesisErrorKind::Cancelled,
        }
    }

    /// Machine-readable code, e.g. `rate_limited`
    pub fn code(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Human-readable message without the kind prefix
    pub fn message(&self) -> String {
        match self {
            SynthesisError::Auth { message }
            | SynthesisError::RateLimited { message, .. }
            | SynthesisError::Server { message, .. }
            | SynthesisError::Network { message, .. }
            | SynthesisError::InvalidRequest { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the caller may eventually succeed by trying again later
    ///
    /// Only authentication failures and breaker rejections are terminal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            SynthesisError::Auth { .. } | SynthesisError::CircuitOpen
        )
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            SynthesisError::Server { status, .. } => Some(*status),
            SynthesisError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SynthesisError::RateLimited {
                retry_after_ms: Some(ms),
                ..
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    /// Retry class for the executor
    pub fn classify(&self) -> RetryClass {
        match self {
            SynthesisError::RateLimited { retry_after_ms, .. } => RetryClass::RateLimited {
                retry_after_ms: *retry_after_ms,
            },
            SynthesisError::Server { .. } => RetryClass::Server,
            SynthesisError::Network { .. } => RetryClass::Network,
            SynthesisError::Auth { .. }
            | SynthesisError::InvalidRequest { .. }
            | SynthesisError::RetryExhausted { .. }
            | SynthesisError::CircuitOpen
            | SynthesisError::Cancelled => RetryClass::Fatal,
        }
    }

    /// Underlying error for `RetryExhausted`, otherwise `self`
    pub fn root(&self) -> &SynthesisError {
        match self {
            SynthesisError::RetryExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

/// Try to extract retry-after value from error body (in milliseconds)
fn extract_retry_after(body: &str) -> Option<u64> {
    // Try to find retry_after in JSON
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let secs = json
            .get("retry_after")
            .or_else(|| json.get("error").and_then(|e| e.get("retry_after")))
            .and_then(|v| v.as_f64());
        if let Some(secs) = secs {
            return Some((secs.max(0.0) * 1000.0) as u64);
        }
    }

    // Try to find in plain text
    let idx = body.to_ascii_lowercase().find("retry")?;
    let num_str: String = body[idx..]
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    num_str
        .parse::<f64>()
        .ok()
        .map(|secs| (secs * 1000.0) as u64)
}
