//! Ledger error types
//!
//! Three failure classes reach callers:
//! - validation failures are rejected before anything touches the store
//! - store failures are retryable and leave the optimistic copy to the
//!   configured write-failure policy
//! - configuration failures only happen at startup
//!
//! There is no not-found variant: every write is an upsert and
//! reading an unseen spot yields a FREE record.

use thiserror::Error;

/// Error category for structured logging and behavior mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected input (empty plate, unknown month, unregistered spot)
    ValidationError,
    /// Snapshot or upsert could not reach the store
    StoreUnavailableError,
    /// Config file unreadable or inconsistent
    ConfigError,
}

impl ErrorCategory {
    /// Machine-readable code for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::StoreUnavailableError => "STORE_UNAVAILABLE",
            Self::ConfigError => "CONFIG_ERROR",
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl LedgerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::ValidationError,
            Self::StoreUnavailable { .. } => ErrorCategory::StoreUnavailableError,
            Self::Config { .. } => ErrorCategory::ConfigError,
        }
    }

    /// Only store failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn store_unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_map_to_codes() {
        assert_eq!(
            LedgerError::validation("x").category().as_str(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            LedgerError::store_unavailable("x").category().as_str(),
            "STORE_UNAVAILABLE"
        );
        assert_eq!(LedgerError::config("x").category().as_str(), "CONFIG_ERROR");
    }

    #[test]
    fn only_store_errors_are_retryable() {
        assert!(LedgerError::store_unavailable("down").is_retryable());
        assert!(!LedgerError::validation("empty plate").is_retryable());
        assert!(!LedgerError::config("bad toml").is_retryable());
    }

    #[test]
    fn source_is_preserved() {
        let io = std::io::Error::other("connection refused");
        let err = LedgerError::store_unavailable_with_source("GET snapshot failed", io);
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connection refused"));
        assert_eq!(err.to_string(), "store unavailable: GET snapshot failed");
    }
}
