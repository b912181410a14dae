//! Core error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a backing-store gateway call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The script or query was rejected by the backing store.
    #[error("execution failed: {0}")]
    Execution(String),

    /// The gateway call did not finish within its deadline.
    #[error("gateway call timed out after {0:?}")]
    Timeout(Duration),

    /// The backing store could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The background task running the call panicked or was aborted.
    #[error("gateway task failed: {0}")]
    Task(String),
}

/// Control plane errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown migration, backup, alert or plan id.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was being looked up.
        kind: &'static str,
        /// The id that was not found.
        id: String,
    },

    /// Operation attempted from a disallowed status.
    #[error("cannot {operation} {id}: status is {status}")]
    InvalidState {
        /// The operation being attempted.
        operation: &'static str,
        /// The unit the operation targeted.
        id: String,
        /// The status the unit was in.
        status: String,
    },

    /// A migration dependency has not completed.
    #[error("migration {migration_id} depends on {dependency_id}, which is {status}")]
    Dependency {
        /// The migration being executed.
        migration_id: String,
        /// The dependency that blocks it.
        dependency_id: String,
        /// Status of the blocking dependency.
        status: String,
    },

    /// The backing-store call itself failed.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Operation aborted by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Input rejected before any state change.
    #[error("validation failed: {0}")]
    Validation(String),

    /// State store error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Persisted record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn invalid_state(
        operation: &'static str,
        id: impl Into<String>,
        status: impl ToString,
    ) -> Self {
        Error::InvalidState {
            operation,
            id: id.into(),
            status: status.to_string(),
        }
    }

    /// Whether the error was raised by a precondition check rather than by
    /// executing work against the backing store.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. }
                | Error::InvalidState { .. }
                | Error::Dependency { .. }
                | Error::Validation(_)
        )
    }
}

/// Result alias for control plane operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Dependency {
            migration_id: "mig_2".to_string(),
            dependency_id: "mig_1".to_string(),
            status: "pending".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "migration mig_2 depends on mig_1, which is pending"
        );

        let err = Error::not_found("backup", "bak_1");
        assert_eq!(err.to_string(), "backup not found: bak_1");
    }

    #[test]
    fn test_gateway_error_wraps() {
        let err: Error = GatewayError::Timeout(Duration::from_secs(3)).into();
        assert!(err.to_string().contains("timed out after 3s"));
        assert!(!err.is_precondition());
    }

    #[test]
    fn test_precondition_classification() {
        assert!(Error::invalid_state("rollback", "m", "pending").is_precondition());
        assert!(!Error::Cancelled.is_precondition());
    }
}
