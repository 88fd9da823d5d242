//! Operand state reconcilers
//!
//! Handles: DaemonSets of every known state

use super::Reconciler;
use crate::error::ControllerError;
use crate::manifests::{MANAGED_BY_LABEL_KEY, MANAGED_BY_LABEL_VALUE, RenderContext};
use crate::state::{EnablementContext, STATE_TABLE};
use crds::{ClusterPolicySpec, Runtime};
use k8s_openapi::api::apps::v1::DaemonSet;
use object_hash::{ApplyDecision, decide, stamp_fingerprint};
use tracing::{debug, info};

impl Reconciler {
    /// Applies the DaemonSets of enabled states and removes those of
    /// disabled states, in table order.
    pub async fn reconcile_states(
        &self,
        spec: &ClusterPolicySpec,
        ctx: &EnablementContext<'_>,
        runtime: Runtime,
    ) -> Result<(), ControllerError> {
        let enabled = ctx.enabled_states();
        debug!(
            "Enabled states: {}",
            enabled.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        );

        for (state, _) in STATE_TABLE {
            let render_ctx = RenderContext {
                namespace: &self.namespace,
                runtime,
                component: state.component(spec),
            };
            let desired = self.manifests.desired_daemonsets(*state, &render_ctx)?;

            if enabled.contains(state) {
                debug!("State {} enabled ({} DaemonSets)", state, desired.len());
                for ds in desired {
                    self.apply_if_changed(ds).await?;
                }
            } else {
                for ds in &desired {
                    self.delete_if_present(ds).await?;
                }
            }
        }
        Ok(())
    }

    /// Applies `ds` unless the live object already carries its fingerprint.
    /// Returns whether an apply was issued.
    pub(crate) async fn apply_if_changed(&self, mut ds: DaemonSet) -> Result<bool, ControllerError> {
        let name = ds
            .metadata
            .name
            .clone()
            .ok_or_else(|| ControllerError::InvalidConfig("DaemonSet manifest without a name".to_string()))?;

        let hash = stamp_fingerprint(&mut ds)?;
        let live = self.client.get_daemonset(&self.namespace, &name).await?;
        let live_annotations = live.as_ref().and_then(|l| l.metadata.annotations.as_ref());

        match decide(&hash, live_annotations) {
            ApplyDecision::Skip => {
                debug!("DaemonSet {}/{} unchanged, skipping apply", self.namespace, name);
                Ok(false)
            }
            ApplyDecision::Apply => {
                self.client.apply_daemonset(&ds).await?;
                info!("Applied DaemonSet {}/{}", self.namespace, name);
                Ok(true)
            }
        }
    }

    /// Deletes the live counterpart of `ds` if it exists and is managed by
    /// the operator. Returns whether a delete was issued.
    pub(crate) async fn delete_if_present(&self, ds: &DaemonSet) -> Result<bool, ControllerError> {
        let Some(name) = ds.metadata.name.as_deref() else {
            return Ok(false);
        };
        let Some(live) = self.client.get_daemonset(&self.namespace, name).await? else {
            return Ok(false);
        };

        let managed = live
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(MANAGED_BY_LABEL_KEY))
            .is_some_and(|v| v == MANAGED_BY_LABEL_VALUE);
        if !managed {
            debug!("DaemonSet {}/{} not managed by the operator, leaving it", self.namespace, name);
            return Ok(false);
        }

        self.client.delete_daemonset(&self.namespace, name).await?;
        info!("Deleted DaemonSet {}/{} of disabled state", self.namespace, name);
        Ok(true)
    }
}
