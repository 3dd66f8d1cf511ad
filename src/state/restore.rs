//! MySQLRestore state machine
//!
//! `New -> Validating -> Running -> Complete`, with `Failed` reachable from any
//! non-terminal phase. `Begin` is only accepted once the source backup is
//! Complete; until then the restore stalls in Validating.

use crate::crd::{BackupPhase, MySQLRestore, RestorePhase};
use crate::error::{Error, Result};

use super::ensure_forward;

/// Events that advance a restore
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestoreEvent {
    /// Start checking the source backup
    Validate,
    /// Source backup is usable; restore into `member`
    Begin {
        backup: String,
        backup_phase: BackupPhase,
        location: Option<String>,
        member: String,
    },
    /// Data restored
    Complete,
    /// The restore cannot complete
    Fail { reason: String },
}

impl RestoreEvent {
    fn target(&self) -> RestorePhase {
        match self {
            Self::Validate => RestorePhase::Validating,
            Self::Begin { .. } => RestorePhase::Running,
            Self::Complete => RestorePhase::Complete,
            Self::Fail { .. } => RestorePhase::Failed,
        }
    }
}

/// Snapshot of the fields the state machine governs
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestoreState {
    pub phase: RestorePhase,
    pub source_location: Option<String>,
    pub executed_on: Option<String>,
    pub message: Option<String>,
}

impl RestoreState {
    /// Read the governed fields from a resource
    pub fn of(restore: &MySQLRestore) -> Self {
        let status = restore.status.as_ref();
        Self {
            phase: restore.phase(),
            source_location: status.and_then(|s| s.source_location.clone()),
            executed_on: status.and_then(|s| s.executed_on.clone()),
            message: status.and_then(|s| s.message.clone()),
        }
    }

    /// Compute the state after `event`, or reject it.
    ///
    /// A `Begin` against a source backup that is not Complete yields
    /// [`Error::SourceBackupNotReady`], which callers treat as "try again
    /// later" rather than a failure.
    pub fn apply(&self, event: RestoreEvent) -> Result<Self> {
        let to = event.target();
        ensure_forward("restore", self.phase, to)?;

        let mut next = self.clone();
        next.phase = to;
        match event {
            RestoreEvent::Validate => {
                next.message = Some("Waiting for source backup".to_string());
            }
            RestoreEvent::Begin {
                backup,
                backup_phase,
                location,
                member,
            } => {
                let location = location.filter(|l| !l.trim().is_empty());
                let Some(location) = location.filter(|_| backup_phase == BackupPhase::Complete)
                else {
                    return Err(Error::SourceBackupNotReady {
                        name: backup,
                        phase: backup_phase.to_string(),
                    });
                };
                if member.is_empty() {
                    return Err(Error::validation("restore member must not be empty"));
                }
                next.source_location = Some(location);
                next.executed_on = Some(member);
                next.message = Some(format!("Restoring from backup {}", backup));
            }
            RestoreEvent::Complete => {
                next.message = Some("Restore completed successfully".to_string());
            }
            RestoreEvent::Fail { reason } => {
                next.message = Some(reason);
            }
        }
        Ok(next)
    }
}
