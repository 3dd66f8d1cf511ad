//! Error types for the MySQL Backup Operator

use thiserror::Error;

use crate::waiter::WaitError;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// No eligible cluster member could be selected to execute an operation
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    /// Backup or restore work itself failed
    #[error("Execution error: {0}")]
    Execution(String),

    /// Target cluster does not exist
    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),

    /// Source backup has not reached Complete yet
    #[error("Source backup '{name}' is not complete (phase {phase})")]
    SourceBackupNotReady { name: String, phase: String },

    /// Phase transition not allowed by the state machine
    #[error("Invalid {kind} transition from {from} to {to}")]
    InvalidTransition {
        kind: &'static str,
        from: String,
        to: String,
    },

    /// Attempt to change an already scheduled execution member
    #[error("Backup already scheduled on '{current}', refusing to reassign to '{requested}'")]
    AgentReassignment { current: String, requested: String },

    /// Waiting for a phase failed
    #[error(transparent)]
    Wait(#[from] WaitError),

    /// Finalizer error
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a scheduling error
    pub fn scheduling(msg: impl Into<String>) -> Self {
        Error::Scheduling(msg.into())
    }

    /// Create an execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Error::Execution(msg.into())
    }

    /// Whether the error indicates the resource should be moved to Failed
    /// rather than retried on the next reconcile.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::Scheduling(_)
                | Error::Execution(_)
                | Error::ClusterNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_operation_failures_are_permanent() {
        assert!(Error::scheduling("no primary").is_permanent());
        assert!(Error::ClusterNotFound("default/db1".to_string()).is_permanent());
        assert!(!Error::config("bad interval").is_permanent());
        assert!(!Error::AgentReassignment {
            current: "db1-0".to_string(),
            requested: "db1-1".to_string(),
        }
        .is_permanent());
    }
}
