//! Kubernetes resource watchers.
//!
//! ClusterPolicies are reconciled by a kube_runtime::Controller. Node events
//! requeue every known ClusterPolicy so new or relabelled GPU nodes are picked
//! up without waiting for the periodic requeue.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{ClusterPolicy, PolicyState};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::Api;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{
    Controller,
    controller::{Action, Config as ControllerConfig},
    watcher,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Quiet period after the last event before a pass starts
const DEBOUNCE: Duration = Duration::from_secs(5);

/// Watches ClusterPolicies and Nodes.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    cluster_policy_api: Api<ClusterPolicy>,
    node_api: Api<Node>,
    /// Requeue delay after a successful pass
    reconcile_interval: Duration,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("reconcile_interval", &self.reconcile_interval)
            .finish_non_exhaustive()
    }
}

fn policy_key(policy: &ClusterPolicy) -> String {
    policy.metadata.name.clone().unwrap_or_default()
}

/// Requeue action after a successful pass. Ignored policies wait for a change.
fn requeue_action(state: PolicyState, interval: Duration) -> Action {
    match state {
        PolicyState::Ignored => Action::await_change(),
        PolicyState::Ready | PolicyState::NotReady => Action::requeue(interval),
    }
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        cluster_policy_api: Api<ClusterPolicy>,
        node_api: Api<Node>,
        reconcile_interval: Duration,
    ) -> Self {
        Self {
            reconciler,
            cluster_policy_api,
            node_api,
            reconcile_interval,
        }
    }

    /// Starts watching ClusterPolicy resources. Runs until shutdown.
    pub async fn watch_cluster_policies(&self) -> Result<(), ControllerError> {
        info!("Starting ClusterPolicy watcher");
        let interval = self.reconcile_interval;

        // Error policy: requeue with Fibonacci backoff per ClusterPolicy
        let error_policy = |policy: Arc<ClusterPolicy>, error: &ControllerError, ctx: Arc<Reconciler>| {
            let key = policy_key(&policy);
            ctx.increment_error(&key);
            let (delay, error_count) = ctx.get_backoff_for_resource(&key);
            error!(
                "Reconciliation error for ClusterPolicy {} (errors: {}): {}, retrying in {:?}",
                key, error_count, error, delay
            );
            Action::requeue(delay)
        };

        let reconcile = move |policy: Arc<ClusterPolicy>, ctx: Arc<Reconciler>| async move {
            let key = policy_key(&policy);
            let state = ctx.reconcile_cluster_policy(&policy).await?;
            ctx.reset_error(&key);
            Ok::<_, ControllerError>(requeue_action(state, interval))
        };

        // Passes touch every node; run them one at a time
        let controller_config = ControllerConfig::default()
            .debounce(DEBOUNCE)
            .concurrency(1);

        let controller = Controller::new(self.cluster_policy_api.clone(), watcher::Config::default());
        let policies = controller.store();

        controller
            .watches(self.node_api.clone(), watcher::Config::default(), move |_node: Node| {
                policies
                    .state()
                    .into_iter()
                    .map(|policy| ObjectRef::from_obj(&*policy))
                    .collect::<Vec<_>>()
            })
            .with_config(controller_config)
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((policy, _)) => debug!("Reconciled ClusterPolicy {}", policy.name),
                    Err(e) => error!("Controller error for ClusterPolicy: {}", e),
                }
            })
            .await;

        info!("ClusterPolicy watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_action() {
        let interval = Duration::from_secs(300);
        assert_eq!(requeue_action(PolicyState::Ready, interval), Action::requeue(interval));
        assert_eq!(requeue_action(PolicyState::NotReady, interval), Action::requeue(interval));
        assert_eq!(requeue_action(PolicyState::Ignored, interval), Action::await_change());
    }
}
