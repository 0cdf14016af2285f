//! Error handling for the task-group DAG scheduler.
//!
//! Structural errors (`CycleDetected`, `DuplicateKey`, `UnknownKey`,
//! `InvalidState`) are programmer errors: they are raised synchronously from
//! the offending call and the graph is left unmodified. `WorkItemFailure` is
//! the one variant that crosses the asynchronous boundary — it is surfaced
//! through the invocation driver's result stream rather than returned from a
//! composition call.

use thiserror::Error;
use tracing::error;

/// A specialized Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised by DAG composition, enumeration, and invocation.
#[derive(Debug, Error, Clone)]
pub enum GraphError {
    /// Adding an edge or composing task groups would introduce a cycle.
    #[error("cycle detected: adding edge {from} -> {to} would create a cycle")]
    CycleDetected {
        /// Key of the edge's source entry.
        from: String,
        /// Key of the edge's destination entry.
        to: String,
    },

    /// An entry with this key already exists in the DAG.
    #[error("duplicate key: entry {key} already exists")]
    DuplicateKey {
        /// The colliding key.
        key: String,
    },

    /// An operation referenced a key that is not present in the DAG.
    #[error("unknown key: {key} is not present in this DAG")]
    UnknownKey {
        /// The missing key.
        key: String,
    },

    /// An operation expected an entry in a different state.
    #[error("invalid state: entry {key} is {actual}, expected {expected}")]
    InvalidState {
        /// Key of the offending entry.
        key: String,
        /// The state the entry was actually in.
        actual: String,
        /// The state the caller required.
        expected: String,
    },

    /// A work item's invocation stream produced an error.
    #[error("work item {key} failed: {cause}")]
    WorkItemFailure {
        /// Key of the entry whose work item failed.
        key: String,
        /// Human-readable cause, forwarded from the work item's own error.
        cause: String,
    },
}

impl GraphError {
    /// Construct a [`GraphError::CycleDetected`] and log it at `warn` level.
    pub fn cycle_detected(from: impl Into<String>, to: impl Into<String>) -> Self {
        let err = Self::CycleDetected {
            from: from.into(),
            to: to.into(),
        };
        err.log();
        err
    }

    /// Construct a [`GraphError::DuplicateKey`] and log it at `warn` level.
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        let err = Self::DuplicateKey { key: key.into() };
        err.log();
        err
    }

    /// Construct a [`GraphError::UnknownKey`] and log it at `warn` level.
    pub fn unknown_key(key: impl Into<String>) -> Self {
        let err = Self::UnknownKey { key: key.into() };
        err.log();
        err
    }

    /// Construct a [`GraphError::InvalidState`] and log it at `warn` level.
    pub fn invalid_state(
        key: impl Into<String>,
        actual: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        let err = Self::InvalidState {
            key: key.into(),
            actual: actual.into(),
            expected: expected.into(),
        };
        err.log();
        err
    }

    /// Construct a [`GraphError::WorkItemFailure`] and log it at `error` level.
    pub fn work_item_failure(key: impl Into<String>, cause: impl Into<String>) -> Self {
        let err = Self::WorkItemFailure {
            key: key.into(),
            cause: cause.into(),
        };
        err.log();
        err
    }

    /// True for the programmer-error structural variants that should never
    /// be retried.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::WorkItemFailure { .. })
    }

    /// Emit this error through `tracing` at a severity appropriate to its
    /// kind — structural errors are `warn`, work item failures are `error`.
    pub fn log(&self) {
        match self {
            Self::WorkItemFailure { key, cause } => {
                error!(key = %key, cause = %cause, "work item failed");
            }
            other => {
                tracing::warn!(error = %other, "rejected graph mutation");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_detected_message() {
        let err = GraphError::cycle_detected("F", "A");
        assert!(err.to_string().contains("F -> A"));
        assert!(err.is_structural());
    }

    #[test]
    fn test_work_item_failure_not_structural() {
        let err = GraphError::work_item_failure("F", "boom");
        assert!(!err.is_structural());
    }

    #[test]
    fn test_invalid_state_message() {
        let err = GraphError::invalid_state("F", "NotStarted", "InProgress");
        let msg = err.to_string();
        assert!(msg.contains("NotStarted"));
        assert!(msg.contains("InProgress"));
    }
}
