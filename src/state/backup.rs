//! MySQLBackup state machine
//!
//! `New -> Scheduled -> Running -> Complete`, with `Failed` reachable from any
//! non-terminal phase. The execution member is recorded by `Schedule` and can
//! never change afterwards.

use crate::crd::{BackupPhase, MySQLBackup};
use crate::error::{Error, Result};

use super::ensure_forward;

/// Events that advance a backup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackupEvent {
    /// A cluster member was selected to execute the backup
    Schedule { agent: String },
    /// The designated member started executing
    Start,
    /// The artifact was stored at `location`
    Complete { location: String },
    /// The backup cannot complete
    Fail { reason: String },
}

impl BackupEvent {
    fn target(&self) -> BackupPhase {
        match self {
            Self::Schedule { .. } => BackupPhase::Scheduled,
            Self::Start => BackupPhase::Running,
            Self::Complete { .. } => BackupPhase::Complete,
            Self::Fail { .. } => BackupPhase::Failed,
        }
    }
}

/// Snapshot of the fields the state machine governs
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackupState {
    pub phase: BackupPhase,
    pub agent_scheduled: Option<String>,
    pub location: Option<String>,
    pub message: Option<String>,
}

impl BackupState {
    /// Read the governed fields from a resource. The agent comes from
    /// status only: the spec copy is user-writable.
    pub fn of(backup: &MySQLBackup) -> Self {
        Self {
            phase: backup.phase(),
            agent_scheduled: backup.scheduled_agent().map(str::to_string),
            location: backup.location().map(str::to_string),
            message: backup.message().map(str::to_string),
        }
    }

    /// Compute the state after `event`, or reject it.
    pub fn apply(&self, event: BackupEvent) -> Result<Self> {
        let to = event.target();
        ensure_forward("backup", self.phase, to)?;

        let mut next = self.clone();
        next.phase = to;
        match event {
            BackupEvent::Schedule { agent } => {
                if agent.is_empty() {
                    return Err(Error::validation("scheduled agent must not be empty"));
                }
                if let Some(current) = &self.agent_scheduled {
                    if *current != agent {
                        return Err(Error::AgentReassignment {
                            current: current.clone(),
                            requested: agent,
                        });
                    }
                }
                next.agent_scheduled = Some(agent);
                next.message = Some("Backup scheduled".to_string());
            }
            BackupEvent::Start => {
                if self.agent_scheduled.is_none() {
                    return Err(Error::validation("backup cannot start without a scheduled agent"));
                }
                next.message = Some("Backup in progress".to_string());
            }
            BackupEvent::Complete { location } => {
                if location.trim().is_empty() {
                    return Err(Error::validation("completed backup must report an artifact location"));
                }
                next.location = Some(location);
                next.message = Some("Backup completed successfully".to_string());
            }
            BackupEvent::Fail { reason } => {
                next.location = None;
                next.message = Some(reason);
            }
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduled() -> BackupState {
        BackupState::default()
            .apply(BackupEvent::Schedule {
                agent: "db1-0".to_string(),
            })
            .unwrap()
    }

    #[test]
    fn happy_path_reaches_complete_with_location() {
        let state = scheduled()
            .apply(BackupEvent::Start)
            .unwrap()
            .apply(BackupEvent::Complete {
                location: "s3://backups/db1/employees.sql.gz".to_string(),
            })
            .unwrap();

        assert_eq!(state.phase, BackupPhase::Complete);
        assert_eq!(state.agent_scheduled.as_deref(), Some("db1-0"));
        assert!(state.location.is_some());
    }

    #[test]
    fn rescheduling_same_agent_is_idempotent_in_new() {
        let state = BackupState {
            agent_scheduled: Some("db1-0".to_string()),
            ..Default::default()
        };
        let next = state
            .apply(BackupEvent::Schedule {
                agent: "db1-0".to_string(),
            })
            .unwrap();
        assert_eq!(next.phase, BackupPhase::Scheduled);
    }

    #[test]
    fn reassigning_agent_is_rejected() {
        let state = BackupState {
            agent_scheduled: Some("db1-0".to_string()),
            ..Default::default()
        };
        let err = state
            .apply(BackupEvent::Schedule {
                agent: "db1-1".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::AgentReassignment { .. }));
    }

    #[test]
    fn scheduling_after_new_is_rejected() {
        let err = scheduled()
            .apply(BackupEvent::Schedule {
                agent: "db1-0".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn complete_requires_location() {
        let running = scheduled().apply(BackupEvent::Start).unwrap();
        let err = running
            .apply(BackupEvent::Complete {
                location: "  ".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn complete_from_scheduled_is_rejected() {
        assert!(scheduled()
            .apply(BackupEvent::Complete {
                location: "s3://x".to_string()
            })
            .is_err());
    }

    #[test]
    fn fail_from_new_keeps_agent_unset() {
        let state = BackupState::default()
            .apply(BackupEvent::Fail {
                reason: "no primary".to_string(),
            })
            .unwrap();
        assert_eq!(state.phase, BackupPhase::Failed);
        assert!(state.agent_scheduled.is_none());
        assert!(state.location.is_none());
    }

    #[test]
    fn state_reads_agent_from_status_not_spec() {
        use crate::crd::{new_backup, MySQLBackupStatus};

        let mut backup = new_backup("db1", "b-", "creds", &["employees"]);
        backup.spec.agent_scheduled = Some("db1-1".to_string());
        assert!(BackupState::of(&backup).agent_scheduled.is_none());

        backup.status = Some(MySQLBackupStatus {
            phase: BackupPhase::Scheduled,
            agent_scheduled: Some("db1-0".to_string()),
            ..Default::default()
        });
        assert_eq!(BackupState::of(&backup).agent_scheduled.as_deref(), Some("db1-0"));
    }

    #[test]
    fn failed_is_final() {
        let failed = scheduled()
            .apply(BackupEvent::Fail {
                reason: "upload failed".to_string(),
            })
            .unwrap();
        assert!(failed.apply(BackupEvent::Start).is_err());
        assert!(failed
            .apply(BackupEvent::Fail {
                reason: "again".to_string()
            })
            .is_err());
    }
}
