//! MySQLRestore controller
//!
//! Watches MySQLRestore resources and triggers reconciliation.

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
use tracing::{debug, error, info, instrument, warn};

use crate::controllers::{requeue_after, Context};
use crate::crd::{MySQLRestore, RestorePhase};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::restore as restore_reconciler;

/// Finalizer name for MySQLRestore resources
const FINALIZER_NAME: &str = "mysql.oso.sh/restore-finalizer";

/// Run the MySQLRestore controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<MySQLRestore> = Api::all(client.clone());

    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("MySQLRestore CRD not installed: {}", e);
        return;
    }

    info!("Starting MySQLRestore controller");

    Controller::new(api, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    debug!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled MySQLRestore"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS
                        .with_label_values(&["MySQLRestore"])
                        .inc();
                }
            }
        })
        .await;
}

#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<MySQLRestore>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&["MySQLRestore"])
        .start_timer();
    metrics::RECONCILIATIONS
        .with_label_values(&["MySQLRestore"])
        .inc();

    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let api: Api<MySQLRestore> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, FINALIZER_NAME, obj, |event| async {
        match event {
            FinalizerEvent::Apply(restore) => apply(restore, ctx.clone(), &api).await,
            FinalizerEvent::Cleanup(restore) => cleanup(restore, ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

async fn apply(
    restore: Arc<MySQLRestore>,
    ctx: Arc<Context>,
    api: &Api<MySQLRestore>,
) -> Result<Action> {
    let name = restore.name_any();
    let namespace = restore.namespace().unwrap_or_else(|| "default".to_string());

    let Some(latest) = api.get_opt(&name).await? else {
        return Ok(Action::await_change());
    };

    info!(
        name = %name,
        namespace = %namespace,
        backup = %latest.spec.backup_ref.name,
        phase = %latest.phase(),
        "Reconciling MySQLRestore"
    );

    restore_reconciler::reconcile_phase(&latest, &ctx.operations, &namespace).await
}

async fn cleanup(restore: Arc<MySQLRestore>, _ctx: Arc<Context>) -> Result<Action> {
    let name = restore.name_any();
    if restore.phase() == RestorePhase::Running {
        warn!(name = %name, "Deleting MySQLRestore while restore is running");
    }
    info!(name = %name, "Cleaning up MySQLRestore");
    metrics::CLEANUPS.with_label_values(&["MySQLRestore"]).inc();

    Ok(Action::await_change())
}

fn error_policy(obj: Arc<MySQLRestore>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        name = %obj.name_any(),
        error = %error,
        "Reconciliation failed, scheduling retry"
    );
    Action::requeue(requeue_after(error))
}
