//! Kubernetes controllers for MySQL backup CRDs
//!
//! This module contains the controller implementations that watch for CRD changes
//! and trigger reconciliation.

mod backup_controller;
mod restore_controller;

pub use backup_controller::run as run_backup_controller;
pub use restore_controller::run as run_restore_controller;

use std::sync::Arc;
use std::time::Duration;

use kube::Client;

use crate::config::OperatorConfig;
use crate::error::Error;
use crate::executor::CommandExecutor;
use crate::reconcilers::OperationContext;
use crate::scheduler::{AgentScheduler, KubeTopology};
use crate::store::KubeStore;

/// Shared context for all controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Store, scheduler and executor the reconcilers run against
    pub operations: OperationContext,
}

impl Context {
    /// Create a context backed by the live cluster topology and the
    /// configured backup/restore commands
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        let operations = OperationContext {
            store: Arc::new(KubeStore::new(client.clone())),
            scheduler: AgentScheduler::new(Arc::new(KubeTopology::new(client.clone()))),
            executor: Arc::new(CommandExecutor::new(
                config.backup_command.clone(),
                config.restore_command.clone(),
                config.execution_timeout,
            )),
            config,
        };
        Self { client, operations }
    }
}

/// Requeue delay for a failed reconciliation
pub(crate) fn requeue_after(error: &Error) -> Duration {
    match error {
        Error::Kube(_) => Duration::from_secs(30),
        Error::Config(_) | Error::Validation(_) => Duration::from_secs(300),
        Error::InvalidTransition { .. } | Error::AgentReassignment { .. } => {
            Duration::from_secs(120)
        }
        _ => Duration::from_secs(30),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_specs_back_off_longest() {
        assert_eq!(
            requeue_after(&Error::validation("bad")),
            Duration::from_secs(300)
        );
        assert_eq!(
            requeue_after(&Error::scheduling("no primary")),
            Duration::from_secs(30)
        );
    }
}
