//! Execution member selection for backups
//!
//! A backup is pinned to the cluster's primary as observed at scheduling time.
//! The choice is recorded once on the resource; later topology changes never
//! move it, and an unavailable member fails the backup instead of retargeting.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::{api::ListParams, Api, Client, ResourceExt};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Label identifying the cluster a member pod belongs to
pub const CLUSTER_LABEL: &str = "mysql.oso.sh/cluster";

/// Label carrying a member's replication role
pub const ROLE_LABEL: &str = "mysql.oso.sh/role";

/// Role label value of the primary member
pub const PRIMARY_ROLE: &str = "primary";

/// Cluster membership as seen by the operator
#[async_trait]
pub trait ClusterTopology: Send + Sync {
    /// Whether the cluster exists in `namespace`
    async fn cluster_exists(&self, namespace: &str, cluster: &str) -> Result<bool>;

    /// Identity of the current primary, if exactly one can be determined
    async fn primary_member(&self, namespace: &str, cluster: &str) -> Result<Option<String>>;

    /// Whether `member` is still a live member of the cluster
    async fn member_available(&self, namespace: &str, cluster: &str, member: &str)
        -> Result<bool>;
}

/// Topology read from the cluster's StatefulSet and member pods
#[derive(Clone)]
pub struct KubeTopology {
    client: Client,
}

impl KubeTopology {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterTopology for KubeTopology {
    async fn cluster_exists(&self, namespace: &str, cluster: &str) -> Result<bool> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(cluster).await?.is_some())
    }

    async fn primary_member(&self, namespace: &str, cluster: &str) -> Result<Option<String>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!(
            "{}={},{}={}",
            CLUSTER_LABEL, cluster, ROLE_LABEL, PRIMARY_ROLE
        );
        let pods = api.list(&ListParams::default().labels(&selector)).await?;
        select_primary(cluster, &pods.items)
    }

    async fn member_available(
        &self,
        namespace: &str,
        cluster: &str,
        member: &str,
    ) -> Result<bool> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let Some(pod) = api.get_opt(member).await? else {
            return Ok(false);
        };
        let in_cluster = pod.labels().get(CLUSTER_LABEL).map(String::as_str) == Some(cluster);
        Ok(in_cluster && is_live(&pod))
    }
}

/// Pick the primary from candidate pods.
///
/// Only Ready, non-terminating pods labelled with the primary role count. More
/// than one such pod means the primary cannot be determined.
pub fn select_primary(cluster: &str, pods: &[Pod]) -> Result<Option<String>> {
    let primaries: Vec<String> = pods
        .iter()
        .filter(|p| p.labels().get(CLUSTER_LABEL).map(String::as_str) == Some(cluster))
        .filter(|p| p.labels().get(ROLE_LABEL).map(String::as_str) == Some(PRIMARY_ROLE))
        .filter(|p| is_live(p))
        .map(|p| p.name_any())
        .collect();

    match primaries.as_slice() {
        [] => Ok(None),
        [primary] => Ok(Some(primary.clone())),
        many => {
            warn!(cluster = %cluster, members = ?many, "Multiple members claim the primary role");
            Err(Error::scheduling(format!(
                "cluster '{}' has {} members labelled primary: {}",
                cluster,
                many.len(),
                many.join(", ")
            )))
        }
    }
}

fn is_live(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return false;
    }
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .unwrap_or(false)
}

/// Chooses the member that executes a backup
#[derive(Clone)]
pub struct AgentScheduler {
    topology: Arc<dyn ClusterTopology>,
}

impl AgentScheduler {
    pub fn new(topology: Arc<dyn ClusterTopology>) -> Self {
        Self { topology }
    }

    pub fn topology(&self) -> &dyn ClusterTopology {
        self.topology.as_ref()
    }

    /// Select the member designated to execute an operation on `cluster`.
    ///
    /// Fails with [`Error::ClusterNotFound`] for an unknown cluster and
    /// [`Error::Scheduling`] when no primary can be determined.
    pub async fn schedule(&self, namespace: &str, cluster: &str) -> Result<String> {
        if !self.topology.cluster_exists(namespace, cluster).await? {
            return Err(Error::ClusterNotFound(format!("{}/{}", namespace, cluster)));
        }

        match self.topology.primary_member(namespace, cluster).await? {
            Some(member) => {
                info!(cluster = %cluster, member = %member, "Selected execution member");
                Ok(member)
            }
            None => {
                debug!(cluster = %cluster, "No primary member available");
                Err(Error::scheduling(format!(
                    "no primary member found for cluster '{}'",
                    cluster
                )))
            }
        }
    }
}
