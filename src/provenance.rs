//! Operator version label attached to every processed resource
//!
//! The label is an audit trail for callers checking which operator build
//! produced a backup or restore. Nothing in the operator branches on it.

use std::collections::BTreeMap;

use kube::ResourceExt;
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Label key recording the operator version that processed a resource
pub const OPERATOR_VERSION_LABEL: &str = "mysql.oso.sh/operator-version";

/// Maximum length of a Kubernetes label value
const MAX_LABEL_VALUE_LEN: usize = 63;

/// Stamps resources with the operator version
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvenanceStamper {
    version: String,
}

impl ProvenanceStamper {
    /// Create a stamper for `version`, which must be a valid label value
    pub fn new(version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        validate_label_value(&version)?;
        Ok(Self { version })
    }

    /// Stamper for the version this crate was built as
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Set the version label. Returns whether the labels changed.
    pub fn stamp(&self, labels: &mut BTreeMap<String, String>) -> bool {
        if labels.get(OPERATOR_VERSION_LABEL) == Some(&self.version) {
            return false;
        }
        labels.insert(OPERATOR_VERSION_LABEL.to_string(), self.version.clone());
        true
    }

    /// Stamp a resource's metadata in place
    pub fn stamp_resource<K: ResourceExt>(&self, obj: &mut K) -> bool {
        self.stamp(obj.labels_mut())
    }

    /// Whether `obj` already carries this version
    pub fn is_stamped<K: ResourceExt>(&self, obj: &K) -> bool {
        obj.labels().get(OPERATOR_VERSION_LABEL) == Some(&self.version)
    }

    /// Merge patch setting the version label
    pub fn label_patch(&self) -> Value {
        json!({
            "metadata": {
                "labels": {
                    OPERATOR_VERSION_LABEL: self.version,
                }
            }
        })
    }
}

/// Read the version label from a resource
pub fn stamped_version<K: ResourceExt>(obj: &K) -> Option<&str> {
    obj.labels().get(OPERATOR_VERSION_LABEL).map(String::as_str)
}

fn validate_label_value(value: &str) -> Result<()> {
    if value.is_empty() || value.len() > MAX_LABEL_VALUE_LEN {
        return Err(Error::config(format!(
            "operator version '{}' must be 1-{} characters",
            value, MAX_LABEL_VALUE_LEN
        )));
    }
    let alnum = |c: char| c.is_ascii_alphanumeric();
    let valid_chars = value
        .chars()
        .all(|c| alnum(c) || matches!(c, '-' | '_' | '.'));
    let starts_ends_alnum =
        value.starts_with(alnum) && value.ends_with(alnum);
    if !valid_chars || !starts_ends_alnum {
        return Err(Error::config(format!(
            "operator version '{}' is not a valid label value",
            value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::new_backup;

    #[test]
    fn stamping_twice_is_a_noop() {
        let stamper = ProvenanceStamper::new("1.4.2").unwrap();
        let mut once = BTreeMap::new();
        assert!(stamper.stamp(&mut once));

        let mut twice = once.clone();
        assert!(!stamper.stamp(&mut twice));
        assert_eq!(once, twice);
    }

    #[test]
    fn new_version_overwrites() {
        let mut labels = BTreeMap::from([("app".to_string(), "mysql".to_string())]);
        ProvenanceStamper::new("1.4.2").unwrap().stamp(&mut labels);
        assert!(ProvenanceStamper::new("1.5.0").unwrap().stamp(&mut labels));

        assert_eq!(labels.get(OPERATOR_VERSION_LABEL).map(String::as_str), Some("1.5.0"));
        assert_eq!(labels.get("app").map(String::as_str), Some("mysql"));
    }

    #[test]
    fn stamps_resources() {
        let stamper = ProvenanceStamper::new("e2e-5f3c2a1").unwrap();
        let mut backup = new_backup("db1", "b-", "creds", &["employees"]);
        assert!(stamped_version(&backup).is_none());

        stamper.stamp_resource(&mut backup);
        assert!(stamper.is_stamped(&backup));
        assert_eq!(stamped_version(&backup), Some("e2e-5f3c2a1"));
    }

    #[test]
    fn label_patch_targets_metadata_labels() {
        let patch = ProvenanceStamper::new("1.0.0").unwrap().label_patch();
        assert_eq!(patch["metadata"]["labels"][OPERATOR_VERSION_LABEL], "1.0.0");
    }

    #[test]
    fn rejects_invalid_label_values() {
        let too_long = "x".repeat(64);
        for version in ["", "1.0.0+build", "-1.0", "v1/2", too_long.as_str()] {
            assert!(ProvenanceStamper::new(version).is_err(), "{version}");
        }
    }

    #[test]
    fn crate_version_is_a_valid_label() {
        let current = ProvenanceStamper::current();
        assert!(ProvenanceStamper::new(current.version()).is_ok());
    }
}
