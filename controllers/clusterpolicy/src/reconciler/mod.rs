//! ClusterPolicy reconciliation.
//!
//! One pass brings the cluster in line with the authoritative ClusterPolicy:
//! - `nodes`: GPU deploy labels on every node
//! - `states`: operand DaemonSets of enabled and disabled states
//! - `status`: status reporting on the ClusterPolicy
//!
//! Only the oldest ClusterPolicy is authoritative. Every other one is marked
//! `ignored` and left alone.

pub mod nodes;
pub mod states;
pub mod status;


use crate::backoff::FibonacciBackoff;
use crate::cluster_client::ClusterClient;
use crate::error::ControllerError;
use crate::manifests::ManifestSource;
use crate::state::EnablementContext;
use crate::workload::{cluster_runtime, validate_cluster_policy_spec};
use crds::{ClusterPolicy, PolicyState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backoff state for a ClusterPolicy
#[derive(Debug, Clone, Default)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles ClusterPolicies against the cluster.
pub struct Reconciler {
    pub(crate) client: Box<dyn ClusterClient>,
    pub(crate) manifests: Box<dyn ManifestSource>,
    /// Namespace operands are deployed into
    pub(crate) namespace: String,
    /// Error count tracking per ClusterPolicy name
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// The authoritative ClusterPolicy: oldest creation timestamp, ties broken
/// by name.
pub fn oldest_policy(policies: &[ClusterPolicy]) -> Option<&ClusterPolicy> {
    policies.iter().min_by(|a, b| {
        a.metadata
            .creation_timestamp
            .as_ref()
            .cmp(&b.metadata.creation_timestamp.as_ref())
            .then_with(|| a.metadata.name.cmp(&b.metadata.name))
    })
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        client: impl ClusterClient + 'static,
        manifests: impl ManifestSource + 'static,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            client: Box::new(client),
            manifests: Box::new(manifests),
            namespace: namespace.into(),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs one reconciliation pass for `policy` and returns the state
    /// reported on it.
    ///
    /// A rejected spec is reported as `notReady` without touching nodes or
    /// operands. Failures while applying operands are reported the same way
    /// and returned so the caller can back off.
    pub async fn reconcile_cluster_policy(
        &self,
        policy: &ClusterPolicy,
    ) -> Result<PolicyState, ControllerError> {
        let name = policy
            .metadata
            .name
            .as_ref()
            .ok_or_else(|| ControllerError::InvalidConfig("ClusterPolicy missing name".to_string()))?;

        info!("Reconciling ClusterPolicy {}", name);

        let policies = self.client.list_cluster_policies().await?;
        if let Some(active) = oldest_policy(&policies)
            && active.metadata.name.as_ref() != Some(name)
        {
            debug!(
                "ClusterPolicy {} is not authoritative ({} is older)",
                name,
                active.metadata.name.as_deref().unwrap_or_default()
            );
            self.update_status(policy, PolicyState::Ignored, None).await?;
            return Ok(PolicyState::Ignored);
        }

        if let Err(e) = validate_cluster_policy_spec(&policy.spec) {
            warn!("ClusterPolicy {} rejected: {}", name, e);
            self.update_status(policy, PolicyState::NotReady, Some(e.to_string()))
                .await?;
            return Ok(PolicyState::NotReady);
        }

        let ctx = EnablementContext::new(&policy.spec);
        let nodes = self.client.list_nodes().await?;
        let patched = self.reconcile_node_labels(&nodes, &ctx).await?;
        debug!("Patched labels on {} of {} nodes", patched, nodes.len());

        let runtime = cluster_runtime(&nodes, policy.spec.operator.default_runtime);
        info!("Using container runtime {} for ClusterPolicy {}", runtime, name);

        if let Err(e) = self.reconcile_states(&policy.spec, &ctx, runtime).await {
            if let Err(status_err) = self
                .update_status(policy, PolicyState::NotReady, Some(e.to_string()))
                .await
            {
                warn!("Failed to report error on ClusterPolicy {}: {}", name, status_err);
            }
            return Err(e);
        }

        self.update_status(policy, PolicyState::Ready, None).await?;
        Ok(PolicyState::Ready)
    }

    /// Get the Fibonacci backoff delay for a ClusterPolicy based on its error count
    ///
    /// Returns (delay, error_count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(resource_key.to_string()).or_default();
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (crate::backoff::DEFAULT_MIN_BACKOFF, 0)
            }
        }
    }

    /// Increment error count for a ClusterPolicy
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_default()
                .increment_error();
        }
    }

    /// Reset error count for a ClusterPolicy (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock()
            && let Some(state) = states.get_mut(resource_key)
        {
            state.reset();
        }
    }
}
