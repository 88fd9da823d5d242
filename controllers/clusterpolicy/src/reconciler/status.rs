//! ClusterPolicy status reporting

use super::Reconciler;
use crate::error::ControllerError;
use crds::{ClusterPolicy, ClusterPolicyStatus, PolicyState};
use tracing::{debug, info};

/// Check if the reported status differs from what would be written.
pub(crate) fn status_needs_update(
    current: Option<&ClusterPolicyStatus>,
    state: PolicyState,
    namespace: &str,
    error: Option<&str>,
) -> bool {
    match current {
        None => true,
        Some(status) => {
            status.state != state
                || status.namespace.as_deref() != Some(namespace)
                || status.error.as_deref() != error
        }
    }
}

impl Reconciler {
    /// Writes the status of `policy` when state, namespace or error message
    /// changed. `lastTransition` moves only when the state does.
    pub(crate) async fn update_status(
        &self,
        policy: &ClusterPolicy,
        state: PolicyState,
        error: Option<String>,
    ) -> Result<(), ControllerError> {
        let name = policy.metadata.name.as_deref().unwrap_or_default();
        let current = policy.status.as_ref();

        if !status_needs_update(current, state, &self.namespace, error.as_deref()) {
            debug!("ClusterPolicy {} status unchanged", name);
            return Ok(());
        }

        let last_transition = match current {
            Some(status) if status.state == state => status.last_transition,
            _ => Some(chrono::Utc::now()),
        };
        let status = ClusterPolicyStatus {
            state,
            namespace: Some(self.namespace.clone()),
            error,
            last_transition,
        };
        self.client.patch_cluster_policy_status(name, &status).await?;
        info!("Updated ClusterPolicy {} status to {:?}", name, state);
        Ok(())
    }
}
