// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the progression core.
//!
//! Store failures never reach game-logic callers as `Err`: they are folded
//! into typed outcomes at the component boundary and logged. The only error
//! raised synchronously is [`ValidationError`], which signals a caller bug.
//!
//! ```text
//! StorageError ──┐
//!                ├──► SyncError ──► FailureKind (carried by outcomes)
//! DecodeError  ──┘
//! ValidationError ──► returned directly as Err
//! ```

use thiserror::Error;

use crate::storage::traits::StorageError;

/// An invalid argument passed to a public operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("player id must not be empty")]
    EmptyId,
}

/// A stored document could not be decoded into a player record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("document is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("document root is not an object")]
    NotAnObject,
    #[error("document has no `data` object")]
    MissingData,
    #[error("unsupported schema version {0}")]
    UnsupportedSchema(u64),
}

/// Coarse failure classification carried by typed outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Durable store unreachable or rejected the operation
    Connectivity,
    /// Stored document did not match any known shape
    Deserialization,
    /// Caller passed an invalid identifier
    Validation,
    /// Neither the cache nor the store hold a record
    NoData,
    /// The synchronizer is not running
    Stopped,
    /// The background task was cancelled or panicked
    Interrupted,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connectivity => write!(f, "connectivity"),
            Self::Deserialization => write!(f, "deserialization"),
            Self::Validation => write!(f, "validation"),
            Self::NoData => write!(f, "no_data"),
            Self::Stopped => write!(f, "stopped"),
            Self::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Errors at the component boundary.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("document store unavailable: {0}")]
    Connectivity(#[from] StorageError),
    #[error("failed to decode document '{key}': {source}")]
    Deserialization {
        key: String,
        #[source]
        source: DecodeError,
    },
    #[error("no data for player '{0}'")]
    NoData(String),
    #[error("synchronizer is stopped")]
    Stopped,
}

impl SyncError {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::Connectivity(_) => FailureKind::Connectivity,
            Self::Deserialization { .. } => FailureKind::Deserialization,
            Self::NoData(_) => FailureKind::NoData,
            Self::Stopped => FailureKind::Stopped,
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Reject empty or whitespace-only player ids.
pub fn validate_id(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        Err(ValidationError::EmptyId)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("069a79f4-44e9-4726-a5be-fca90e38aaf5").is_ok());
        assert_eq!(validate_id(""), Err(ValidationError::EmptyId));
        assert_eq!(validate_id("   "), Err(ValidationError::EmptyId));
    }

    #[test]
    fn test_sync_error_kind() {
        let err = SyncError::from(StorageError::Unavailable("down".into()));
        assert_eq!(err.kind(), FailureKind::Connectivity);

        let err = SyncError::Deserialization {
            key: "player_p1".into(),
            source: DecodeError::MissingData,
        };
        assert_eq!(err.kind(), FailureKind::Deserialization);
        assert!(err.to_string().contains("player_p1"));

        assert_eq!(SyncError::from(ValidationError::EmptyId).kind(), FailureKind::Validation);
        assert_eq!(SyncError::Stopped.kind(), FailureKind::Stopped);
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::Connectivity.to_string(), "connectivity");
        assert_eq!(FailureKind::NoData.to_string(), "no_data");
    }
}
