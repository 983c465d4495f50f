use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanErrorKind {
    AuthFailed,
    ProfileNotFound,
    Timeout,
    RateLimited,
    Malformed,
    Unreachable,
}

impl ScanErrorKind {
    /// Kinds that may succeed when the same request is sent again.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited | Self::Unreachable)
    }

    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::AuthFailed,
            StatusCode::NOT_FOUND => Self::ProfileNotFound,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            s if s.is_server_error() => Self::Unreachable,
            _ => Self::Malformed,
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() || err.is_body() {
            Self::Malformed
        } else {
            Self::Unreachable
        }
    }
}

impl fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AuthFailed => "auth_failed",
            Self::ProfileNotFound => "profile_not_found",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Malformed => "malformed",
            Self::Unreachable => "unreachable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("security scan failed ({kind}): {message}")]
pub struct ScanError {
    pub kind: ScanErrorKind,
    pub message: String,
}

impl ScanError {
    pub fn new(kind: ScanErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        Self::new(ScanErrorKind::from_reqwest(&err), err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionErrorKind {
    AuthFailed,
    Timeout,
    RateLimited,
    Unreachable,
    Malformed,
}

impl CompletionErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::AuthFailed,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            s if s.is_server_error() => Self::Unreachable,
            _ => Self::Malformed,
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() || err.is_body() {
            Self::Malformed
        } else {
            Self::Unreachable
        }
    }
}

impl fmt::Display for CompletionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AuthFailed => "auth_failed",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Unreachable => "unreachable",
            Self::Malformed => "malformed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("completion failed ({kind}): {message}")]
pub struct CompletionError {
    pub kind: CompletionErrorKind,
    pub message: String,
}

impl CompletionError {
    pub fn new(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        Self::new(CompletionErrorKind::from_reqwest(&err), err.to_string())
    }
}

/// Reason an exchange produced no reply. A security block is not an error
/// and is reported through `ExchangeOutcome` instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_status_classification() {
        assert_eq!(ScanErrorKind::from_status(StatusCode::UNAUTHORIZED), ScanErrorKind::AuthFailed);
        assert_eq!(ScanErrorKind::from_status(StatusCode::FORBIDDEN), ScanErrorKind::AuthFailed);
        assert_eq!(ScanErrorKind::from_status(StatusCode::NOT_FOUND), ScanErrorKind::ProfileNotFound);
        assert_eq!(ScanErrorKind::from_status(StatusCode::TOO_MANY_REQUESTS), ScanErrorKind::RateLimited);
        assert_eq!(ScanErrorKind::from_status(StatusCode::BAD_GATEWAY), ScanErrorKind::Unreachable);
        assert_eq!(ScanErrorKind::from_status(StatusCode::BAD_REQUEST), ScanErrorKind::Malformed);
    }

    #[test]
    fn test_completion_not_found_is_malformed() {
        assert_eq!(
            CompletionErrorKind::from_status(StatusCode::NOT_FOUND),
            CompletionErrorKind::Malformed
        );
        assert_eq!(
            CompletionErrorKind::from_status(StatusCode::SERVICE_UNAVAILABLE),
            CompletionErrorKind::Unreachable
        );
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ScanErrorKind::Unreachable.is_transient());
        assert!(ScanErrorKind::Timeout.is_transient());
        assert!(!ScanErrorKind::AuthFailed.is_transient());
        assert!(!ScanErrorKind::ProfileNotFound.is_transient());
        assert!(!ScanErrorKind::Malformed.is_transient());
    }

    #[test]
    fn test_exchange_error_display_carries_kind() {
        let err: ExchangeError = ScanError::new(ScanErrorKind::Timeout, "deadline elapsed").into();
        assert_eq!(err.to_string(), "security scan failed (timeout): deadline elapsed");
    }
}
