//! MySQLBackup controller
//!
//! Watches MySQLBackup resources and triggers reconciliation.

use std::sync::Arc;

use futures::StreamExt;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        finalizer::{finalizer, Event as FinalizerEvent},
        watcher::Config as WatcherConfig,
    },
    Api, Client, ResourceExt,
};
use tracing::{debug, error, info, instrument};

use crate::controllers::{requeue_after, Context};
use crate::crd::MySQLBackup;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::backup as backup_reconciler;

/// Finalizer name for MySQLBackup resources
const FINALIZER_NAME: &str = "mysql.oso.sh/backup-finalizer";

/// Run the MySQLBackup controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<MySQLBackup> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("MySQLBackup CRD not installed: {}", e);
        return;
    }

    info!("Starting MySQLBackup controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    debug!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled MySQLBackup"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["MySQLBackup"])
                        .inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<MySQLBackup>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["MySQLBackup"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["MySQLBackup"])
        .inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<MySQLBackup> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER_NAME, obj, |event| async {
        match event {
            FinalizerEvent::Apply(backup) => apply(backup, ctx.clone(), &api).await,
            FinalizerEvent::Cleanup(backup) => cleanup(backup, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

/// Apply reconciliation (create/update)
async fn apply(backup: Arc<MySQLBackup>, ctx: Arc<Context>, api: &Api<MySQLBackup>) -> Result<Action> {
    let name = backup.name_any();
    let namespace = backup.namespace().unwrap_or_else(|| "default".to_string());

    // The watch cache may lag behind our own status writes.
    let Some(latest) = api.get_opt(&name).await? else {
        return Ok(Action::await_change());
    };

    info!(
        name = %name,
        namespace = %namespace,
        phase = %latest.phase(),
        "Reconciling MySQLBackup"
    );

    backup_reconciler::reconcile_phase(&latest, &ctx.operations, &namespace).await
}

/// Cleanup when resource is being deleted
async fn cleanup(backup: Arc<MySQLBackup>, _ctx: Arc<Context>) -> Result<Action> {
    // The stored artifact is NOT deleted with the resource.
    info!(
        name = %backup.name_any(),
        location = backup.location().unwrap_or_default(),
        "Cleaning up MySQLBackup"
    );
    metrics::CLEANUPS.with_label_values(&["MySQLBackup"]).inc();

    Ok(Action::await_change())
}

/// Error policy for the controller
fn error_policy(obj: Arc<MySQLBackup>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        name = %obj.name_any(),
        error = %error,
        "Reconciliation failed, scheduling retry"
    );
    Action::requeue(requeue_after(error))
}
