//! Persistence seam between the reconcilers and the control plane
//!
//! Reconcilers read resources and write merge patches through
//! [`OperationStore`]; [`KubeStore`] is the API-server implementation.

use async_trait::async_trait;
use kube::{
    api::{Patch, PatchParams},
    Api, Client,
};
use serde_json::Value;

use crate::crd::{MySQLBackup, MySQLRestore};
use crate::error::Result;

/// Field manager used for every patch the operator issues
pub const FIELD_MANAGER: &str = "mysql-backup-operator";

/// Reads and patches MySQLBackup and MySQLRestore resources
#[async_trait]
pub trait OperationStore: Send + Sync {
    async fn get_backup(&self, namespace: &str, name: &str) -> Result<Option<MySQLBackup>>;

    async fn get_restore(&self, namespace: &str, name: &str) -> Result<Option<MySQLRestore>>;

    /// Merge-patch the backup's metadata and spec
    async fn patch_backup(&self, namespace: &str, name: &str, patch: &Value) -> Result<()>;

    /// Merge-patch the backup's status subresource
    async fn patch_backup_status(&self, namespace: &str, name: &str, patch: &Value)
        -> Result<()>;

    /// Merge-patch the restore's metadata and spec
    async fn patch_restore(&self, namespace: &str, name: &str, patch: &Value) -> Result<()>;

    /// Merge-patch the restore's status subresource
    async fn patch_restore_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<()>;
}

/// Store backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn backups(&self, namespace: &str) -> Api<MySQLBackup> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn restores(&self, namespace: &str) -> Api<MySQLRestore> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl OperationStore for KubeStore {
    async fn get_backup(&self, namespace: &str, name: &str) -> Result<Option<MySQLBackup>> {
        Ok(self.backups(namespace).get_opt(name).await?)
    }

    async fn get_restore(&self, namespace: &str, name: &str) -> Result<Option<MySQLRestore>> {
        Ok(self.restores(namespace).get_opt(name).await?)
    }

    async fn patch_backup(&self, namespace: &str, name: &str, patch: &Value) -> Result<()> {
        self.backups(namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn patch_backup_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<()> {
        self.backups(namespace)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn patch_restore(&self, namespace: &str, name: &str, patch: &Value) -> Result<()> {
        self.restores(namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn patch_restore_status(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<()> {
        self.restores(namespace)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await?;
        Ok(())
    }
}
