//! Phase enumerations shared by MySQLBackup and MySQLRestore

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Capabilities every operation phase exposes.
///
/// Terminal and failure classification lives on the type so that callers never
/// compare phase names as strings.
pub trait OperationPhase: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// No further transition occurs from this phase
    fn is_terminal(&self) -> bool;

    /// Terminal phase that represents an unsuccessful outcome
    fn is_failure(&self) -> bool;

    /// Position along the directed phase path, used for monotonicity checks.
    /// Failure phases rank after every non-terminal phase.
    fn rank(&self) -> u8;
}

/// MySQLBackup lifecycle phase
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum BackupPhase {
    /// Created, not yet scheduled on a cluster member
    #[default]
    New,
    /// Execution member selected
    Scheduled,
    /// Designated member is executing the backup
    Running,
    /// Backup artifact stored
    Complete,
    /// Backup could not complete
    Failed,
}

impl OperationPhase for BackupPhase {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::New => 0,
            Self::Scheduled => 1,
            Self::Running => 2,
            Self::Complete | Self::Failed => 3,
        }
    }
}

impl fmt::Display for BackupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "New"),
            Self::Scheduled => write!(f, "Scheduled"),
            Self::Running => write!(f, "Running"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// MySQLRestore lifecycle phase
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum RestorePhase {
    /// Created, not yet validated
    #[default]
    New,
    /// Waiting for the source backup to be complete
    Validating,
    /// Restoring data into the target cluster
    Running,
    /// Restore finished
    Complete,
    /// Restore could not complete
    Failed,
}

impl OperationPhase for RestorePhase {
    fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::New => 0,
            Self::Validating => 1,
            Self::Running => 2,
            Self::Complete | Self::Failed => 3,
        }
    }
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "New"),
            Self::Validating => write!(f, "Validating"),
            Self::Running => write!(f, "Running"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(BackupPhase::Complete.is_terminal());
        assert!(!BackupPhase::Complete.is_failure());
        assert!(BackupPhase::Failed.is_failure());
        assert!(!BackupPhase::Running.is_terminal());

        assert!(RestorePhase::Failed.is_terminal());
        assert!(!RestorePhase::Validating.is_terminal());
    }

    #[test]
    fn phases_serialize_as_plain_names() {
        assert_eq!(
            serde_json::to_string(&BackupPhase::Scheduled).unwrap(),
            "\"Scheduled\""
        );
        let phase: RestorePhase = serde_json::from_str("\"Validating\"").unwrap();
        assert_eq!(phase, RestorePhase::Validating);
    }

    #[test]
    fn display_matches_serialized_form() {
        assert_eq!(BackupPhase::Complete.to_string(), "Complete");
        assert_eq!(RestorePhase::New.to_string(), "New");
    }
}
