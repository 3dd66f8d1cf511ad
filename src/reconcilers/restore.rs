//! MySQLRestore reconciler
//!
//! Handles the business logic for restore operations including:
//! - Spec validation
//! - Waiting for the source backup to complete
//! - Restore execution on the cluster primary
//! - Status updates

use std::time::Instant;

use chrono::Utc;
use kube::{runtime::controller::Action, ResourceExt};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::crd::{BackupPhase, Condition, MySQLRestore, RestorePhase};
use crate::error::{Error, Result};
use crate::executor::RestoreRequest;
use crate::metrics;
use crate::state::{RestoreEvent, RestoreState};

use super::{is_interrupted, OperationContext, REQUEUE_IN_PROGRESS, REQUEUE_WAITING};

/// Validate the MySQLRestore spec
pub fn validate(restore: &MySQLRestore) -> Result<()> {
    if restore.spec.cluster.name.is_empty() {
        return Err(Error::validation("A target cluster must be specified"));
    }

    if restore.spec.backup_ref.name.is_empty() {
        return Err(Error::validation("A source backup name must be specified"));
    }

    Ok(())
}

/// Advance a restore by one step of its state machine
pub async fn reconcile_phase(
    restore: &MySQLRestore,
    ctx: &OperationContext,
    namespace: &str,
) -> Result<Action> {
    match restore.phase() {
        RestorePhase::New => start_validation(restore, ctx, namespace).await,
        RestorePhase::Validating => await_source(restore, ctx, namespace).await,
        RestorePhase::Running => check_running(restore, ctx, namespace).await,
        RestorePhase::Complete | RestorePhase::Failed => Ok(Action::await_change()),
    }
}

/// New -> Validating
async fn start_validation(
    restore: &MySQLRestore,
    ctx: &OperationContext,
    namespace: &str,
) -> Result<Action> {
    let name = restore.name_any();
    let state = RestoreState::of(restore);

    if let Err(e) = validate(restore) {
        warn!(name = %name, error = %e, "Validation failed");
        return fail(restore, ctx, namespace, &state, e.to_string()).await;
    }

    let cluster = &restore.spec.cluster.name;
    if !ctx
        .scheduler
        .topology()
        .cluster_exists(namespace, cluster)
        .await?
    {
        let e = Error::ClusterNotFound(format!("{}/{}", namespace, cluster));
        return fail(restore, ctx, namespace, &state, e.to_string()).await;
    }

    let next = state.apply(RestoreEvent::Validate)?;
    persist(restore, ctx, namespace, &next).await?;
    Ok(Action::requeue(REQUEUE_IN_PROGRESS))
}

/// Validating -> Running once the source backup is Complete
async fn await_source(restore: &MySQLRestore, ctx: &OperationContext, namespace: &str) -> Result<Action> {
    let name = restore.name_any();
    let state = RestoreState::of(restore);
    let backup_name = &restore.spec.backup_ref.name;

    let Some(backup) = ctx.store.get_backup(namespace, backup_name).await? else {
        debug!(name = %name, backup = %backup_name, "Source backup does not exist yet");
        return Ok(Action::requeue(REQUEUE_WAITING));
    };

    match backup.phase() {
        BackupPhase::Complete => {}
        BackupPhase::Failed => {
            let reason = format!("Source backup '{}' failed", backup_name);
            return fail(restore, ctx, namespace, &state, reason).await;
        }
        phase => {
            debug!(name = %name, backup = %backup_name, phase = %phase, "Source backup not complete");
            return Ok(Action::requeue(REQUEUE_WAITING));
        }
    }

    let member = match ctx
        .scheduler
        .schedule(namespace, &restore.spec.cluster.name)
        .await
    {
        Ok(member) => member,
        Err(e) if e.is_permanent() => {
            return fail(restore, ctx, namespace, &state, e.to_string()).await;
        }
        Err(e) => return Err(e),
    };

    let running = match state.apply(RestoreEvent::Begin {
        backup: backup_name.clone(),
        backup_phase: backup.phase(),
        location: backup.location().map(str::to_string),
        member,
    }) {
        Ok(running) => running,
        Err(Error::SourceBackupNotReady { .. }) => return Ok(Action::requeue(REQUEUE_WAITING)),
        Err(e) => return Err(e),
    };

    execute(restore, ctx, namespace, running).await
}

/// Running -> Complete | Failed
async fn execute(
    restore: &MySQLRestore,
    ctx: &OperationContext,
    namespace: &str,
    running: RestoreState,
) -> Result<Action> {
    let name = restore.name_any();
    persist(restore, ctx, namespace, &running).await?;

    let request = RestoreRequest {
        namespace: namespace.to_string(),
        name: name.clone(),
        cluster: restore.spec.cluster.name.clone(),
        member: running.executed_on.clone().unwrap_or_default(),
        backup: restore.spec.backup_ref.name.clone(),
        location: running.source_location.clone().unwrap_or_default(),
    };
    info!(
        name = %name,
        member = %request.member,
        location = %request.location,
        "Starting restore execution"
    );

    let started = Instant::now();
    let result = ctx.executor.restore(&request).await;
    metrics::RESTORE_DURATION
        .with_label_values(&[namespace])
        .observe(started.elapsed().as_secs_f64());

    let next = match result {
        Ok(()) => {
            info!(name = %name, "Restore completed successfully");
            metrics::RESTORES_TOTAL
                .with_label_values(&["success", namespace])
                .inc();
            running.apply(RestoreEvent::Complete)?
        }
        Err(e) => {
            error!(name = %name, error = %e, "Restore failed");
            metrics::RESTORES_TOTAL
                .with_label_values(&["failure", namespace])
                .inc();
            running.apply(RestoreEvent::Fail {
                reason: format!("Restore failed: {}", e),
            })?
        }
    };
    persist(restore, ctx, namespace, &next).await?;

    Ok(Action::await_change())
}

async fn check_running(restore: &MySQLRestore, ctx: &OperationContext, namespace: &str) -> Result<Action> {
    let start_time = restore.status.as_ref().and_then(|s| s.start_time);
    if !is_interrupted(start_time, ctx.config.execution_timeout, Utc::now()) {
        return Ok(Action::requeue(REQUEUE_IN_PROGRESS));
    }

    warn!(name = %restore.name_any(), "Restore execution was interrupted");
    let state = RestoreState::of(restore);
    fail(
        restore,
        ctx,
        namespace,
        &state,
        "Restore execution was interrupted".to_string(),
    )
    .await
}

async fn fail(
    restore: &MySQLRestore,
    ctx: &OperationContext,
    namespace: &str,
    state: &RestoreState,
    reason: String,
) -> Result<Action> {
    let next = state.apply(RestoreEvent::Fail { reason })?;
    persist(restore, ctx, namespace, &next).await?;
    Ok(Action::await_change())
}

async fn persist(
    restore: &MySQLRestore,
    ctx: &OperationContext,
    namespace: &str,
    state: &RestoreState,
) -> Result<()> {
    let name = restore.name_any();
    let stamper = &ctx.config.provenance;
    if !stamper.is_stamped(restore) {
        ctx.store
            .patch_restore(namespace, &name, &stamper.label_patch())
            .await?;
    }

    let patch = status_patch(state, restore.metadata.generation);
    ctx.store
        .patch_restore_status(namespace, &name, &patch)
        .await?;

    metrics::PHASE_TRANSITIONS
        .with_label_values(&["MySQLRestore", &state.phase.to_string()])
        .inc();
    Ok(())
}

/// Status merge patch for `state`
pub fn status_patch(state: &RestoreState, generation: Option<i64>) -> Value {
    let now = Utc::now();
    let message = state.message.clone().unwrap_or_default();
    let condition = match state.phase {
        RestorePhase::Complete => Condition::ready(true, "RestoreSucceeded", message.clone()),
        RestorePhase::Failed => Condition::ready(false, "RestoreFailed", message.clone()),
        phase => Condition::ready(false, &phase.to_string(), message.clone()),
    };

    let mut status = json!({
        "phase": state.phase,
        "message": message,
        "sourceLocation": state.source_location,
        "executedOn": state.executed_on,
        "observedGeneration": generation,
        "conditions": [condition],
    });
    match state.phase {
        RestorePhase::Running => status["startTime"] = json!(now),
        RestorePhase::Complete | RestorePhase::Failed => status["completionTime"] = json!(now),
        _ => {}
    }

    json!({ "status": status })
}
