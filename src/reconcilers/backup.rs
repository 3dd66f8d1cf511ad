//! MySQLBackup reconciler
//!
//! Handles the business logic for backup operations including:
//! - Spec validation
//! - Scheduling on the cluster primary
//! - Backup execution on the designated member
//! - Status updates

use std::collections::HashSet;
use std::time::Instant;

use chrono::Utc;
use kube::{runtime::controller::Action, ResourceExt};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::crd::{BackupPhase, Condition, MySQLBackup};
use crate::error::{Error, Result};
use crate::executor::BackupRequest;
use crate::metrics;
use crate::state::{BackupEvent, BackupState};

use super::{is_interrupted, OperationContext, REQUEUE_IN_PROGRESS};

/// Validate the MySQLBackup spec
pub fn validate(backup: &MySQLBackup) -> Result<()> {
    if backup.spec.cluster.name.is_empty() {
        return Err(Error::validation("A target cluster must be specified"));
    }

    if backup.spec.databases.is_empty() {
        return Err(Error::validation("At least one database must be specified"));
    }

    let mut seen = HashSet::new();
    for database in &backup.spec.databases {
        if database.trim().is_empty() {
            return Err(Error::validation("Database names must not be empty"));
        }
        if !seen.insert(database.as_str()) {
            return Err(Error::validation(format!(
                "Database '{}' is listed more than once",
                database
            )));
        }
    }

    if backup.spec.storage_credentials_ref.name.is_empty() {
        return Err(Error::validation(
            "A storage credentials secret must be specified",
        ));
    }

    Ok(())
}

/// Advance a backup by one step of its state machine
pub async fn reconcile_phase(backup: &MySQLBackup, ctx: &OperationContext, namespace: &str) -> Result<Action> {
    match backup.phase() {
        BackupPhase::New => schedule(backup, ctx, namespace).await,
        BackupPhase::Scheduled => execute(backup, ctx, namespace).await,
        BackupPhase::Running => check_running(backup, ctx, namespace).await,
        BackupPhase::Complete | BackupPhase::Failed => Ok(Action::await_change()),
    }
}

/// New -> Scheduled, or New -> Failed when no member can be chosen
async fn schedule(backup: &MySQLBackup, ctx: &OperationContext, namespace: &str) -> Result<Action> {
    let name = backup.name_any();
    let state = BackupState::of(backup);

    if let Err(e) = validate(backup) {
        warn!(name = %name, error = %e, "Validation failed");
        return fail(backup, ctx, namespace, &state, e.to_string()).await;
    }

    let picked = match ctx
        .scheduler
        .schedule(namespace, &backup.spec.cluster.name)
        .await
    {
        Ok(member) => member,
        Err(e) if e.is_permanent() => {
            warn!(name = %name, error = %e, "Scheduling failed");
            metrics::SCHEDULING_FAILURES
                .with_label_values(&[namespace])
                .inc();
            return fail(backup, ctx, namespace, &state, e.to_string()).await;
        }
        Err(e) => return Err(e),
    };

    // A member requested in the spec must be the one the scheduler picked.
    let requested = BackupState {
        agent_scheduled: backup.spec.agent_scheduled.clone(),
        ..state.clone()
    };
    let next = match requested.apply(BackupEvent::Schedule {
        agent: picked.clone(),
    }) {
        Ok(next) => next,
        Err(e @ Error::AgentReassignment { .. }) => {
            warn!(name = %name, error = %e, "Requested agent is not the scheduled member");
            return fail(backup, ctx, namespace, &state, e.to_string()).await;
        }
        Err(e) => return Err(e),
    };

    if backup.spec.agent_scheduled.is_none() {
        let mut patch = ctx.config.provenance.label_patch();
        patch["spec"] = json!({ "agentScheduled": picked });
        ctx.store.patch_backup(namespace, &name, &patch).await?;
    }
    persist(backup, ctx, namespace, &next).await?;

    info!(name = %name, agent = %picked, "Backup scheduled");
    Ok(Action::requeue(REQUEUE_IN_PROGRESS))
}

/// Scheduled -> Running -> Complete | Failed
async fn execute(backup: &MySQLBackup, ctx: &OperationContext, namespace: &str) -> Result<Action> {
    let name = backup.name_any();
    let state = BackupState::of(backup);
    let cluster = &backup.spec.cluster.name;

    let Some(member) = state.agent_scheduled.clone() else {
        return fail(backup, ctx, namespace, &state, "Scheduled backup has no recorded agent".to_string())
            .await;
    };

    if backup.spec.agent_scheduled.as_deref() != Some(member.as_str()) {
        let e = Error::AgentReassignment {
            current: member.clone(),
            requested: backup.spec.agent_scheduled.clone().unwrap_or_default(),
        };
        warn!(name = %name, error = %e, "Scheduled agent was edited");
        return fail(backup, ctx, namespace, &state, e.to_string()).await;
    }

    // Never retarget: an unavailable member fails the backup.
    if !ctx
        .scheduler
        .topology()
        .member_available(namespace, cluster, &member)
        .await?
    {
        warn!(name = %name, member = %member, "Designated member unavailable");
        let reason = format!("Designated member '{}' is unavailable", member);
        return fail(backup, ctx, namespace, &state, reason).await;
    }

    let running = state.apply(BackupEvent::Start)?;
    persist(backup, ctx, namespace, &running).await?;
    info!(name = %name, member = %member, databases = ?backup.spec.databases, "Starting backup execution");

    let request = BackupRequest {
        namespace: namespace.to_string(),
        name: name.clone(),
        cluster: cluster.clone(),
        member,
        databases: backup.spec.databases.clone(),
        credentials_secret: backup.spec.storage_credentials_ref.name.clone(),
    };

    let started = Instant::now();
    let result = ctx.executor.backup(&request).await;
    metrics::BACKUP_DURATION
        .with_label_values(&[namespace])
        .observe(started.elapsed().as_secs_f64());

    let next = match result {
        Ok(location) => {
            info!(name = %name, location = %location, "Backup completed successfully");
            metrics::BACKUPS_TOTAL
                .with_label_values(&["success", namespace])
                .inc();
            running.apply(BackupEvent::Complete { location })?
        }
        Err(e) => {
            error!(name = %name, error = %e, "Backup failed");
            metrics::BACKUPS_TOTAL
                .with_label_values(&["failure", namespace])
                .inc();
            running.apply(BackupEvent::Fail {
                reason: format!("Backup failed: {}", e),
            })?
        }
    };
    persist(backup, ctx, namespace, &next).await?;

    Ok(Action::await_change())
}

/// A backup found Running at reconcile start is not executing in this pass
async fn check_running(backup: &MySQLBackup, ctx: &OperationContext, namespace: &str) -> Result<Action> {
    let start_time = backup.status.as_ref().and_then(|s| s.start_time);
    if !is_interrupted(start_time, ctx.config.execution_timeout, Utc::now()) {
        return Ok(Action::requeue(REQUEUE_IN_PROGRESS));
    }

    warn!(name = %backup.name_any(), "Backup execution was interrupted");
    let state = BackupState::of(backup);
    fail(
        backup,
        ctx,
        namespace,
        &state,
        "Backup execution was interrupted".to_string(),
    )
    .await
}

async fn fail(
    backup: &MySQLBackup,
    ctx: &OperationContext,
    namespace: &str,
    state: &BackupState,
    reason: String,
) -> Result<Action> {
    let next = state.apply(BackupEvent::Fail { reason })?;
    persist(backup, ctx, namespace, &next).await?;
    Ok(Action::await_change())
}

/// Stamp provenance and write the status for `state`
async fn persist(
    backup: &MySQLBackup,
    ctx: &OperationContext,
    namespace: &str,
    state: &BackupState,
) -> Result<()> {
    let name = backup.name_any();
    let stamper = &ctx.config.provenance;
    if !stamper.is_stamped(backup) {
        ctx.store
            .patch_backup(namespace, &name, &stamper.label_patch())
            .await?;
    }

    let patch = status_patch(state, backup.metadata.generation);
    ctx.store
        .patch_backup_status(namespace, &name, &patch)
        .await?;

    metrics::PHASE_TRANSITIONS
        .with_label_values(&["MySQLBackup", &state.phase.to_string()])
        .inc();
    Ok(())
}

/// Status merge patch for `state`
pub fn status_patch(state: &BackupState, generation: Option<i64>) -> Value {
    let now = Utc::now();
    let message = state.message.clone().unwrap_or_default();
    let condition = match state.phase {
        BackupPhase::Complete => Condition::ready(true, "BackupSucceeded", message.clone()),
        BackupPhase::Failed => Condition::ready(false, "BackupFailed", message.clone()),
        phase => Condition::ready(false, &phase.to_string(), message.clone()),
    };

    let mut status = json!({
        "phase": state.phase,
        "message": message,
        "agentScheduled": state.agent_scheduled,
        "outcome": state.location.as_ref().map(|location| json!({ "location": location })),
        "observedGeneration": generation,
        "conditions": [condition],
    });
    match state.phase {
        BackupPhase::Running => status["startTime"] = json!(now),
        BackupPhase::Complete | BackupPhase::Failed => status["completionTime"] = json!(now),
        _ => {}
    }

    json!({ "status": status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::new_backup;

    #[test]
    fn complete_patch_carries_location() {
        let state = BackupState {
            phase: BackupPhase::Complete,
            agent_scheduled: Some("db1-0".to_string()),
            location: Some("s3://backups/db1.sql.gz".to_string()),
            message: Some("Backup completed successfully".to_string()),
        };
        let patch = status_patch(&state, Some(2));
        assert_eq!(patch["status"]["phase"], "Complete");
        assert_eq!(patch["status"]["outcome"]["location"], "s3://backups/db1.sql.gz");
        assert_eq!(patch["status"]["conditions"][0]["status"], "True");
        assert!(patch["status"]["completionTime"].is_string());
    }

    #[test]
    fn scheduled_patch_records_agent_in_status() {
        let state = BackupState {
            phase: BackupPhase::Scheduled,
            agent_scheduled: Some("db1-0".to_string()),
            ..Default::default()
        };
        let patch = status_patch(&state, Some(1));
        assert_eq!(patch["status"]["agentScheduled"], "db1-0");
    }

    #[test]
    fn failed_patch_clears_outcome() {
        let state = BackupState {
            phase: BackupPhase::Failed,
            message: Some("no primary member found".to_string()),
            ..Default::default()
        };
        let patch = status_patch(&state, None);
        assert!(patch["status"]["outcome"].is_null());
        assert_eq!(patch["status"]["conditions"][0]["reason"], "BackupFailed");
    }

    #[test]
    fn running_patch_sets_start_time() {
        let state = BackupState {
            phase: BackupPhase::Running,
            agent_scheduled: Some("db1-0".to_string()),
            ..Default::default()
        };
        let patch = status_patch(&state, None);
        assert!(patch["status"]["startTime"].is_string());
        assert!(patch["status"].get("completionTime").is_none());
    }

    #[test]
    fn duplicate_databases_fail_validation() {
        let backup = new_backup("db1", "b-", "creds", &["employees", "employees"]);
        let err = validate(&backup).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
