//! Node label reconcilers
//!
//! Handles: GPU deploy labels on Nodes

use super::Reconciler;
use crate::error::ControllerError;
use crate::node_classifier::has_nfd_labels;
use crate::node_labels::{label_patch, update_gpu_state_labels};
use crate::state::EnablementContext;
use k8s_openapi::api::core::v1::Node;
use tracing::{debug, info, warn};

impl Reconciler {
    /// Brings the deploy labels of every node in line with `ctx`, patching
    /// only nodes whose labels change. Returns the number of patched nodes.
    ///
    /// A node with an invalid workload config is skipped; the other nodes are
    /// still labelled.
    pub async fn reconcile_node_labels(
        &self,
        nodes: &[Node],
        ctx: &EnablementContext<'_>,
    ) -> Result<usize, ControllerError> {
        let nfd_seen = nodes
            .iter()
            .any(|n| n.metadata.labels.as_ref().is_some_and(has_nfd_labels));
        if !nodes.is_empty() && !nfd_seen {
            warn!("No node-feature-discovery labels on any node, GPU nodes cannot be detected");
        }

        let mut patched = 0;
        for node in nodes {
            let Some(name) = node.metadata.name.as_deref() else {
                continue;
            };
            let before = node.metadata.labels.clone().unwrap_or_default();
            let mut after = before.clone();

            match update_gpu_state_labels(&mut after, ctx) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Node {} labels up to date", name);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping node {}: {}", name, e);
                    continue;
                }
            }

            let Some(patch) = label_patch(&before, &after) else {
                continue;
            };
            self.client.patch_node_labels(name, &patch).await?;
            info!("Updated GPU labels on node {}", name);
            patched += 1;
        }
        Ok(patched)
    }
}
