//! Error handling for the crossbench harness
//!
//! Errors are layered the same way the harness is: the collector, the
//! storage abstraction, the operation strategies, parameter resolution and
//! the factories each own an error enum, and `HarnessError` wraps them all
//! for callers that just want one type.

use std::io;

use thiserror::Error;

use crate::metrics::OperationKind;
use crate::operations::OperationResult;

/// The main error type for the harness
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Metrics collector misuse
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    /// Storage backend failures
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Whole-operation failures
    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    /// Parameter and plan configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Unknown operation or backend names
    #[error("Factory error: {0}")]
    Factory(#[from] FactoryError),

    /// Prometheus registration or encoding failures
    #[error("Metrics export error: {reason}")]
    Export { reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Structural misuse of the metrics collector
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    #[error("no test is currently running")]
    NoActiveRun,

    #[error("test '{name}' is not the current test")]
    NotCurrent { name: String },

    #[error("a test named '{name}' already exists")]
    DuplicateRun { name: String },

    #[error("no test named '{name}'")]
    UnknownRun { name: String },
}

/// Failures reported by a storage backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("record not found: {partition}/{id}")]
    NotFound { partition: String, id: String },

    #[error("conditional check failed for {id}")]
    ConditionFailed { id: String },

    #[error("batch of {size} records exceeds the backend limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("verification failed for {id}: digest mismatch")]
    VerificationFailed { id: String },

    #[error("backend '{backend}' is not initialized")]
    NotInitialized { backend: String },

    #[error("request throttled: {reason}")]
    Throttled { reason: String },

    #[error("backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("invalid backend configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Collector(#[from] CollectorError),
}

/// Failure of an entire operation strategy
#[derive(Error, Debug)]
pub enum OperationError {
    /// Every dispatched unit failed; the partial result is kept for inspection
    #[error("all {attempted} {kind} operations failed")]
    AllFailed {
        kind: OperationKind,
        attempted: usize,
        result: Box<OperationResult>,
    },

    #[error("invalid operation parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error(transparent)]
    Collector(#[from] CollectorError),
}

/// Parameter and plan configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {reason}")]
    ParseError { reason: String },
}

/// Rejected type strings at construction time
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    #[error("unknown operation type: {name}")]
    UnknownOperation { name: String },

    #[error("unsupported database type: {name}")]
    UnsupportedBackend { name: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, HarnessError>;

/// A specialized result type for collector operations
pub type CollectorResult<T> = std::result::Result<T, CollectorError>;

/// A specialized result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A specialized result type for operation strategies
pub type OperationOutcome = std::result::Result<OperationResult, OperationError>;

/// A specialized result type for configuration handling
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// A specialized result type for factory lookups
pub type FactoryResult<T> = std::result::Result<T, FactoryError>;

impl HarnessError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            HarnessError::Collector(_) => "collector",
            HarnessError::Storage(_) => "storage",
            HarnessError::Operation(_) => "operation",
            HarnessError::Config(_) => "config",
            HarnessError::Factory(_) => "factory",
            HarnessError::Export { .. } => "export",
            HarnessError::Io(_) => "io",
            HarnessError::Serialization(_) => "serialization",
        }
    }
}

impl StorageError {
    /// Transient failures a real client would typically retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Throttled { .. }
                | StorageError::Unavailable { .. }
                | StorageError::DeadlineExceeded
        )
    }
}

impl OperationError {
    /// The partial result carried by an all-failed operation.
    pub fn partial_result(&self) -> Option<&OperationResult> {
        match self {
            OperationError::AllFailed { result, .. } => Some(&**result),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categorization() {
        let err = HarnessError::from(CollectorError::NoActiveRun);
        assert_eq!(err.category(), "collector");

        let err = HarnessError::from(FactoryError::UnknownOperation {
            name: "scan".to_string(),
        });
        assert_eq!(err.category(), "factory");
        assert_eq!(
            err.to_string(),
            "Factory error: unknown operation type: scan"
        );
    }

    #[test]
    fn test_retryable_storage_errors() {
        assert!(StorageError::Throttled { reason: "rcu".into() }.is_retryable());
        assert!(StorageError::DeadlineExceeded.is_retryable());
        assert!(!StorageError::Cancelled.is_retryable());
        assert!(!StorageError::NotFound {
            partition: "a".into(),
            id: "b".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_collector_error_is_transparent_in_storage() {
        let err = StorageError::from(CollectorError::NoActiveRun);
        assert_eq!(err.to_string(), "no test is currently running");
    }
}
