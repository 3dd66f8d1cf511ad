//! Control-plane client for MySQLBackup and MySQLRestore resources
//!
//! Used by tests, CLIs and other controllers to create operations and wait for
//! the operator to drive them to a phase.

use std::sync::Arc;

use kube::{
    api::{DeleteParams, PostParams},
    Api, Client, ResourceExt,
};
use tracing::info;

use crate::crd::{BackupPhase, MySQLBackup, MySQLRestore, RestorePhase};
use crate::config::WaitPolicy;
use crate::error::{Error, Result};
use crate::reconcilers::{backup as backup_reconciler, restore as restore_reconciler};
use crate::scheduler::{ClusterTopology, KubeTopology};
use crate::waiter::{wait_for_phase, Backoff};

/// Namespaced client for backup and restore operations
#[derive(Clone)]
pub struct OperationClient {
    client: Client,
    namespace: String,
    topology: Arc<dyn ClusterTopology>,
    policy: WaitPolicy,
}

impl OperationClient {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            topology: Arc::new(KubeTopology::new(client.clone())),
            client,
            namespace: namespace.into(),
            policy: WaitPolicy::default(),
        }
    }

    /// Replace the per-kind wait budgets
    pub fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn backups(&self) -> Api<MySQLBackup> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn restores(&self) -> Api<MySQLRestore> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn ensure_cluster(&self, cluster: &str) -> Result<()> {
        if self.topology.cluster_exists(&self.namespace, cluster).await? {
            Ok(())
        } else {
            Err(Error::ClusterNotFound(format!("{}/{}", self.namespace, cluster)))
        }
    }

    /// Validate and create a backup. The target cluster must exist.
    pub async fn create_backup(&self, backup: &MySQLBackup) -> Result<MySQLBackup> {
        backup_reconciler::validate(backup)?;
        self.ensure_cluster(&backup.spec.cluster.name).await?;
        let created = self.backups().create(&PostParams::default(), backup).await?;
        info!(name = %created.name_any(), cluster = %created.spec.cluster.name, "Created MySQLBackup");
        Ok(created)
    }

    pub async fn get_backup(&self, name: &str) -> Result<MySQLBackup> {
        Ok(self.backups().get(name).await?)
    }

    /// Delete a backup. The stored artifact is left untouched.
    pub async fn delete_backup(&self, name: &str) -> Result<()> {
        self.backups().delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    /// Validate and create a restore. The target cluster must exist.
    pub async fn create_restore(&self, restore: &MySQLRestore) -> Result<MySQLRestore> {
        restore_reconciler::validate(restore)?;
        self.ensure_cluster(&restore.spec.cluster.name).await?;
        let created = self.restores().create(&PostParams::default(), restore).await?;
        info!(
            name = %created.name_any(),
            backup = %created.spec.backup_ref.name,
            "Created MySQLRestore"
        );
        Ok(created)
    }

    pub async fn get_restore(&self, name: &str) -> Result<MySQLRestore> {
        Ok(self.restores().get(name).await?)
    }

    pub async fn delete_restore(&self, name: &str) -> Result<()> {
        self.restores().delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    /// Wait for a backup using the configured backup budget
    pub async fn wait_for_backup_phase(&self, name: &str, target: BackupPhase) -> Result<MySQLBackup> {
        self.wait_for_backup_phase_with(name, target, &self.policy.backup)
            .await
    }

    pub async fn wait_for_backup_phase_with(
        &self,
        name: &str,
        target: BackupPhase,
        backoff: &Backoff,
    ) -> Result<MySQLBackup> {
        let api = self.backups();
        Ok(wait_for_phase(name, target, backoff, || api.get(name)).await?)
    }

    /// Wait for a restore using the configured restore budget
    pub async fn wait_for_restore_phase(
        &self,
        name: &str,
        target: RestorePhase,
    ) -> Result<MySQLRestore> {
        self.wait_for_restore_phase_with(name, target, &self.policy.restore)
            .await
    }

    pub async fn wait_for_restore_phase_with(
        &self,
        name: &str,
        target: RestorePhase,
        backoff: &Backoff,
    ) -> Result<MySQLRestore> {
        let api = self.restores();
        Ok(wait_for_phase(name, target, backoff, || api.get(name)).await?)
    }
}
