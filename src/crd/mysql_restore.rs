//! MySQLRestore Custom Resource Definition

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ClusterRef, Condition, RestorePhase};

/// MySQLRestore resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "mysql.oso.sh",
    version = "v1alpha1",
    kind = "MySQLRestore",
    plural = "mysqlrestores",
    singular = "mysqlrestore",
    shortname = "myr",
    namespaced,
    status = "MySQLRestoreStatus",
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.cluster.name"}"#,
    printcolumn = r#"{"name": "Backup", "type": "string", "jsonPath": ".spec.backupRef.name"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MySQLRestoreSpec {
    /// MySQL cluster to restore into
    pub cluster: ClusterRef,

    /// MySQLBackup to restore from
    pub backup_ref: BackupRef,
}

/// Backup reference for restore
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupRef {
    /// MySQLBackup resource name in the restore's namespace
    pub name: String,
}

/// MySQLRestore status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MySQLRestoreStatus {
    /// Current phase
    #[serde(default)]
    pub phase: RestorePhase,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Artifact the restore reads from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<String>,

    /// Cluster member the data was restored into
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_on: Option<String>,

    /// Start time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// Completion time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    /// Observed generation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl MySQLRestore {
    /// Current phase; a resource without status is New
    pub fn phase(&self) -> RestorePhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Status message
    pub fn message(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.message.as_deref())
    }
}

/// Build a MySQLRestore with a generated name
pub fn new_restore(cluster: &str, backup_name: &str, generate_name: &str) -> MySQLRestore {
    let mut restore = MySQLRestore::new(
        "",
        MySQLRestoreSpec {
            cluster: ClusterRef::new(cluster),
            backup_ref: BackupRef {
                name: backup_name.to_string(),
            },
        },
    );
    restore.metadata.name = None;
    restore.metadata.generate_name = Some(generate_name.to_string());
    restore
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_restore_references_backup() {
        let restore = new_restore("db1", "nightly-x7k2p", "nightly-x7k2p-restore-");
        assert_eq!(restore.spec.backup_ref.name, "nightly-x7k2p");
        assert_eq!(restore.spec.cluster.name, "db1");
        assert_eq!(restore.phase(), RestorePhase::New);
    }

    #[test]
    fn status_round_trips_through_json() {
        let json = serde_json::json!({
            "phase": "Validating",
            "message": "Waiting for backup",
        });
        let status: MySQLRestoreStatus = serde_json::from_value(json).unwrap();
        assert_eq!(status.phase, RestorePhase::Validating);
        assert!(status.source_location.is_none());
    }
}
