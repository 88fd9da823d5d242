//! Cluster access used by the reconciler.
//!
//! The reconciler only talks to the API server through [`ClusterClient`], so
//! tests can run whole passes against [`MockClusterClient`].

use crate::error::ControllerError;
use crds::{ClusterPolicy, ClusterPolicyStatus};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::Node;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams};
use kube::{Api, Client};
use serde_json::{Value, json};
use tracing::debug;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "gpu-operator";

/// Kubernetes operations needed by a reconciliation pass.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>, ControllerError>;

    /// Applies a JSON merge patch to a node
    async fn patch_node_labels(&self, name: &str, patch: &Value) -> Result<(), ControllerError>;

    /// `None` when the DaemonSet does not exist
    async fn get_daemonset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DaemonSet>, ControllerError>;

    /// Creates or replaces the DaemonSet with server-side apply
    async fn apply_daemonset(&self, ds: &DaemonSet) -> Result<(), ControllerError>;

    /// Deleting a missing DaemonSet is not an error
    async fn delete_daemonset(&self, namespace: &str, name: &str) -> Result<(), ControllerError>;

    async fn list_cluster_policies(&self) -> Result<Vec<ClusterPolicy>, ControllerError>;

    async fn patch_cluster_policy_status(
        &self,
        name: &str,
        status: &ClusterPolicyStatus,
    ) -> Result<(), ControllerError>;
}

/// JSON merge patch writing every status field.
///
/// Unset fields are sent as `null` so a merge patch clears them instead of
/// keeping the stored value.
pub(crate) fn status_patch(status: &ClusterPolicyStatus) -> Value {
    json!({
        "status": {
            "state": status.state,
            "namespace": status.namespace,
            "error": status.error,
            "lastTransition": status.last_transition,
        }
    })
}

/// [`ClusterClient`] backed by the API server.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn object_name(ds: &DaemonSet) -> Result<(&str, &str), ControllerError> {
    let name = ds
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ControllerError::InvalidConfig("DaemonSet manifest without a name".to_string()))?;
    let namespace = ds.metadata.namespace.as_deref().ok_or_else(|| {
        ControllerError::InvalidConfig(format!("DaemonSet {} without a namespace", name))
    })?;
    Ok((namespace, name))
}

#[async_trait::async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_nodes(&self) -> Result<Vec<Node>, ControllerError> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn patch_node_labels(&self, name: &str, patch: &Value) -> Result<(), ControllerError> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }

    async fn get_daemonset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DaemonSet>, ControllerError> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply_daemonset(&self, ds: &DaemonSet) -> Result<(), ControllerError> {
        let (namespace, name) = object_name(ds)?;
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(name, &params, &Patch::Apply(ds)).await?;
        Ok(())
    }

    async fn delete_daemonset(&self, namespace: &str, name: &str) -> Result<(), ControllerError> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!("DaemonSet {}/{} already gone", namespace, name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_cluster_policies(&self) -> Result<Vec<ClusterPolicy>, ControllerError> {
        let api: Api<ClusterPolicy> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn patch_cluster_policy_status(
        &self,
        name: &str,
        status: &ClusterPolicyStatus,
    ) -> Result<(), ControllerError> {
        let api: Api<ClusterPolicy> = Api::all(self.client.clone());
        let patch = status_patch(status);
        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub use mock::{ClusterWrite, MockClusterClient};


#[cfg(test)]
mod tests {
    use super::*;
    use crds::PolicyState;

    #[test]
    fn test_status_patch_clears_unset_fields() {
        let status = ClusterPolicyStatus {
            state: PolicyState::Ready,
            namespace: Some("gpu-operator".to_string()),
            error: None,
            last_transition: None,
        };
        let patch = status_patch(&status);
        assert_eq!(patch["status"]["state"], "ready");
        assert_eq!(patch["status"]["namespace"], "gpu-operator");
        let fields = patch["status"].as_object().unwrap();
        assert_eq!(fields.get("error"), Some(&Value::Null));
        assert_eq!(fields.get("lastTransition"), Some(&Value::Null));
    }
}
