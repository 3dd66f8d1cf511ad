//! Custom Resource Definitions for MySQL Backup Operator

mod mysql_backup;
mod mysql_restore;
mod phase;

pub use mysql_backup::*;
pub use mysql_restore::*;
pub use phase::*;

use chrono::{DateTime, Utc};
use kube::CustomResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a MySQL cluster in the resource's namespace
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRef {
    /// Cluster name
    pub name: String,
}

impl ClusterRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Status condition
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// Build a `Ready` condition
    pub fn ready(ready: bool, reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: "Ready".to_string(),
            status: if ready { "True" } else { "False" }.to_string(),
            last_transition_time: Utc::now(),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }
}

/// Generate all CRD YAML manifests
pub fn generate_crds() -> serde_yaml::Result<Vec<String>> {
    Ok(vec![
        serde_yaml::to_string(&MySQLBackup::crd())?,
        serde_yaml::to_string(&MySQLRestore::crd())?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crds_generate_for_both_kinds() {
        let crds = generate_crds().unwrap();
        assert_eq!(crds.len(), 2);
        assert!(crds[0].contains("mysqlbackups.mysql.oso.sh"));
        assert!(crds[1].contains("mysqlrestores.mysql.oso.sh"));
    }

    #[test]
    fn condition_serializes_type_field() {
        let value = serde_json::to_value(Condition::ready(false, "BackupFailed", "boom")).unwrap();
        assert_eq!(value["type"], "Ready");
        assert_eq!(value["status"], "False");
        assert_eq!(value["reason"], "BackupFailed");
    }
}
