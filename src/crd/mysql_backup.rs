//! MySQLBackup Custom Resource Definition

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{BackupPhase, ClusterRef, Condition};

/// MySQLBackup resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "mysql.oso.sh",
    version = "v1alpha1",
    kind = "MySQLBackup",
    plural = "mysqlbackups",
    singular = "mysqlbackup",
    shortname = "myb",
    namespaced,
    status = "MySQLBackupStatus",
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.cluster.name"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Agent", "type": "string", "jsonPath": ".status.agentScheduled"}"#,
    printcolumn = r#"{"name": "Location", "type": "string", "jsonPath": ".status.outcome.location"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MySQLBackupSpec {
    /// MySQL cluster to back up
    pub cluster: ClusterRef,

    /// Databases to include in the backup
    pub databases: Vec<String>,

    /// Secret holding credentials for uploading the backup artifact
    pub storage_credentials_ref: StorageCredentialsRef,

    /// Cluster member chosen to execute the backup. Set once by the operator;
    /// a value supplied at creation must match the member the operator selects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_scheduled: Option<String>,
}

/// Reference to the upload credentials secret
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageCredentialsRef {
    /// Secret name
    pub name: String,
}

/// Result of a successful backup
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupOutcome {
    /// Opaque reference to the stored backup artifact
    pub location: String,
}

/// MySQLBackup status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MySQLBackupStatus {
    /// Current phase
    #[serde(default)]
    pub phase: BackupPhase,

    /// Member recorded at scheduling; authoritative over the spec field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_scheduled: Option<String>,

    /// Outcome, present only once the backup is Complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<BackupOutcome>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Execution start time
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

impl MySQLBackup {
    /// Current phase; a resource without status is New
    pub fn phase(&self) -> BackupPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Artifact location, if the backup produced one
    pub fn location(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.outcome.as_ref())
            .map(|o| o.location.as_str())
            .filter(|l| !l.is_empty())
    }

    /// Status message
    pub fn message(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.message.as_deref())
    }

    /// Member the backup was scheduled on, as recorded by the operator
    pub fn scheduled_agent(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.agent_scheduled.as_deref())
    }
}

/// Build a MySQLBackup with a generated name
pub fn new_backup(
    cluster: &str,
    generate_name: &str,
    credentials_secret: &str,
    databases: &[&str],
) -> MySQLBackup {
    let mut backup = MySQLBackup::new(
        "",
        MySQLBackupSpec {
            cluster: ClusterRef::new(cluster),
            databases: databases.iter().map(|d| d.to_string()).collect(),
            storage_credentials_ref: StorageCredentialsRef {
                name: credentials_secret.to_string(),
            },
            agent_scheduled: None,
        },
    );
    backup.metadata.name = None;
    backup.metadata.generate_name = Some(generate_name.to_string());
    backup
}
