//! Node label reconciliation.
//!
//! Deploy labels are the node selectors of the operand DaemonSets. The
//! controller adds the labels a node's workload config calls for and removes
//! the ones it does not, but never overwrites a value that is already set:
//! an administrator can pin a deploy label to `"false"` on a node.

use crate::error::ValidationError;
use crate::labels::{
    COMMON_GPU_LABEL_KEY, COMMON_GPU_LABEL_VALUE, MIG_CONFIG_DEFAULT_VALUE, MIG_CONFIG_LABEL_KEY,
    MIG_MANAGER_LABEL_KEY, MIG_MANAGER_LABEL_VALUE, all_gpu_state_label_keys,
};
use crate::node_classifier::{
    NodeLabels, has_common_gpu_label, has_gpu_labels, has_mig_capable_gpu, has_mig_manager_label,
    has_operands_disabled,
};
use crate::state::{EnablementContext, get_effective_state_labels};
use crate::workload::{WorkloadConfig, resolve_workload_config};
use serde_json::{Map, Value, json};

/// Removes every deploy label owned by the controller. Returns whether
/// anything was removed; other labels are left alone.
pub fn remove_all_gpu_state_labels(labels: &mut NodeLabels) -> bool {
    let mut modified = false;
    for key in all_gpu_state_label_keys() {
        if labels.remove(key).is_some() {
            modified = true;
        }
    }
    modified
}

fn insert_if_absent(labels: &mut NodeLabels, key: &str, value: &str) -> bool {
    if labels.contains_key(key) {
        return false;
    }
    labels.insert(key.to_string(), value.to_string());
    true
}

/// Brings a node's labels in line with its hardware and the ClusterPolicy.
///
/// Returns whether `labels` changed. An invalid workload config on the node or
/// in the policy is returned as an error; `labels` must then be discarded.
pub fn update_gpu_state_labels(
    labels: &mut NodeLabels,
    ctx: &EnablementContext<'_>,
) -> Result<bool, ValidationError> {
    if !has_gpu_labels(labels) {
        // GPU went away: keep the key so selectors on it stop matching
        if has_common_gpu_label(labels) {
            labels.insert(COMMON_GPU_LABEL_KEY.to_string(), "false".to_string());
            remove_all_gpu_state_labels(labels);
            return Ok(true);
        }
        return Ok(false);
    }

    let mut modified = false;
    if !has_common_gpu_label(labels) {
        labels.insert(COMMON_GPU_LABEL_KEY.to_string(), COMMON_GPU_LABEL_VALUE.to_string());
        modified = true;
    }

    if has_operands_disabled(labels) {
        modified |= remove_all_gpu_state_labels(labels);
        return Ok(modified);
    }

    let workload = resolve_workload_config(labels, ctx.spec, ctx.sandbox_enabled)?;
    let desired = get_effective_state_labels(workload, ctx.sandbox_mode());

    for key in all_gpu_state_label_keys() {
        if key == MIG_MANAGER_LABEL_KEY || desired.contains_key(key) {
            continue;
        }
        if labels.remove(key).is_some() {
            modified = true;
        }
    }
    for (key, value) in &desired {
        modified |= insert_if_absent(labels, key, value);
    }

    if workload == WorkloadConfig::Container && has_mig_capable_gpu(labels) {
        modified |= insert_if_absent(labels, MIG_MANAGER_LABEL_KEY, MIG_MANAGER_LABEL_VALUE);
        // A MIG manager pinned off never applies a MIG config
        if has_mig_manager_label(labels) {
            modified |= insert_if_absent(labels, MIG_CONFIG_LABEL_KEY, MIG_CONFIG_DEFAULT_VALUE);
        }
    } else if labels.remove(MIG_MANAGER_LABEL_KEY).is_some() {
        modified = true;
    }

    Ok(modified)
}

/// JSON merge patch turning `before` into `after`, or `None` when they are
/// equal. Removed keys are set to `null`.
pub fn label_patch(before: &NodeLabels, after: &NodeLabels) -> Option<Value> {
    let mut changes = Map::new();
    for (key, value) in after {
        if before.get(key) != Some(value) {
            changes.insert(key.clone(), Value::String(value.clone()));
        }
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            changes.insert(key.clone(), Value::Null);
        }
    }
    if changes.is_empty() {
        return None;
    }
    Some(json!({ "metadata": { "labels": changes } }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::*;
    use crate::test_utils::labels;
    use crds::{ClusterPolicySpec, SandboxWorkloadsSpec};

    const PCI_KEY: &str = "feature.node.kubernetes.io/pci-10de.present";

    fn sandbox_spec(mode: &str) -> ClusterPolicySpec {
        ClusterPolicySpec {
            sandbox_workloads: SandboxWorkloadsSpec {
                enabled: Some(true),
                mode: Some(mode.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_remove_all_gpu_state_labels_kata_device_plugin() {
        let mut node = labels(&[(KATA_DEVICE_PLUGIN_DEPLOY_LABEL_KEY, "true"), ("other", "keep")]);
        assert!(remove_all_gpu_state_labels(&mut node));
        assert!(!node.contains_key(KATA_DEVICE_PLUGIN_DEPLOY_LABEL_KEY));
        assert_eq!(node.get("other").map(String::as_str), Some("keep"));
    }

    #[test]
    fn test_remove_all_gpu_state_labels_sandbox_device_plugin() {
        let mut node = labels(&[(KUBEVIRT_DEVICE_PLUGIN_DEPLOY_LABEL_KEY, "true")]);
        assert!(remove_all_gpu_state_labels(&mut node));
        assert!(node.is_empty());
    }

    #[test]
    fn test_remove_all_gpu_state_labels_is_idempotent() {
        let mut node = labels(&[
            (DEVICE_PLUGIN_DEPLOY_LABEL_KEY, "true"),
            (MIG_MANAGER_LABEL_KEY, "true"),
            (COMMON_GPU_LABEL_KEY, "true"),
            ("kubernetes.io/hostname", "node-1"),
        ]);
        assert!(remove_all_gpu_state_labels(&mut node));
        let after_first = node.clone();
        assert!(!remove_all_gpu_state_labels(&mut node));
        assert_eq!(node, after_first);
        assert_eq!(
            node,
            labels(&[(COMMON_GPU_LABEL_KEY, "true"), ("kubernetes.io/hostname", "node-1")])
        );
    }

    #[test]
    fn test_update_labels_new_gpu_node() {
        let spec = ClusterPolicySpec::default();
        let ctx = EnablementContext::new(&spec);
        let mut node = labels(&[(PCI_KEY, "true")]);

        assert_eq!(update_gpu_state_labels(&mut node, &ctx), Ok(true));
        assert_eq!(node.get(COMMON_GPU_LABEL_KEY).map(String::as_str), Some("true"));
        for key in CONTAINER_STATE_LABEL_KEYS {
            assert_eq!(node.get(key).map(String::as_str), Some("true"), "{key}");
        }
        assert!(!node.contains_key(MIG_MANAGER_LABEL_KEY));

        // Second pass is a no-op
        assert_eq!(update_gpu_state_labels(&mut node, &ctx), Ok(false));
    }

    #[test]
    fn test_update_labels_preserves_user_value() {
        let spec = ClusterPolicySpec::default();
        let ctx = EnablementContext::new(&spec);
        let mut node = labels(&[(PCI_KEY, "true"), (DEVICE_PLUGIN_DEPLOY_LABEL_KEY, "false")]);

        update_gpu_state_labels(&mut node, &ctx).unwrap();
        assert_eq!(
            node.get(DEVICE_PLUGIN_DEPLOY_LABEL_KEY).map(String::as_str),
            Some("false")
        );
        assert_eq!(update_gpu_state_labels(&mut node, &ctx), Ok(false));
    }

    #[test]
    fn test_update_labels_gpu_removed() {
        let spec = ClusterPolicySpec::default();
        let ctx = EnablementContext::new(&spec);
        let mut node = labels(&[
            (COMMON_GPU_LABEL_KEY, "true"),
            (DRIVER_DEPLOY_LABEL_KEY, "true"),
            ("other", "keep"),
        ]);

        assert_eq!(update_gpu_state_labels(&mut node, &ctx), Ok(true));
        assert_eq!(
            node,
            labels(&[(COMMON_GPU_LABEL_KEY, "false"), ("other", "keep")])
        );
        assert_eq!(update_gpu_state_labels(&mut node, &ctx), Ok(false));
    }

    #[test]
    fn test_update_labels_cpu_node_untouched() {
        let spec = ClusterPolicySpec::default();
        let ctx = EnablementContext::new(&spec);
        let mut node = labels(&[("feature.node.kubernetes.io/cpu-model.vendor_id", "Intel")]);
        let before = node.clone();
        assert_eq!(update_gpu_state_labels(&mut node, &ctx), Ok(false));
        assert_eq!(node, before);
    }

    #[test]
    fn test_update_labels_operands_disabled() {
        let spec = ClusterPolicySpec::default();
        let ctx = EnablementContext::new(&spec);
        let mut node = labels(&[
            (PCI_KEY, "true"),
            (COMMON_GPU_LABEL_KEY, "true"),
            (COMMON_OPERANDS_LABEL_KEY, "false"),
            (DRIVER_DEPLOY_LABEL_KEY, "true"),
        ]);

        assert_eq!(update_gpu_state_labels(&mut node, &ctx), Ok(true));
        assert!(!node.contains_key(DRIVER_DEPLOY_LABEL_KEY));
        assert_eq!(update_gpu_state_labels(&mut node, &ctx), Ok(false));
    }

    #[test]
    fn test_update_labels_switches_device_plugin_flavour() {
        let spec = sandbox_spec("kata");
        let ctx = EnablementContext::new(&spec);
        let mut node = labels(&[
            (PCI_KEY, "true"),
            (GPU_WORKLOAD_CONFIG_LABEL_KEY, "vm-passthrough"),
            (KUBEVIRT_DEVICE_PLUGIN_DEPLOY_LABEL_KEY, "true"),
            (DEVICE_PLUGIN_DEPLOY_LABEL_KEY, "true"),
        ]);

        assert_eq!(update_gpu_state_labels(&mut node, &ctx), Ok(true));
        assert!(node.contains_key(KATA_DEVICE_PLUGIN_DEPLOY_LABEL_KEY));
        assert!(!node.contains_key(KUBEVIRT_DEVICE_PLUGIN_DEPLOY_LABEL_KEY));
        assert!(!node.contains_key(DEVICE_PLUGIN_DEPLOY_LABEL_KEY));
        for key in VM_PASSTHROUGH_STATE_LABEL_KEYS {
            assert!(node.contains_key(key), "{key}");
        }
    }

    #[test]
    fn test_update_labels_vgpu_node() {
        let spec = sandbox_spec("kubevirt");
        let ctx = EnablementContext::new(&spec);
        let mut node = labels(&[
            (PCI_KEY, "true"),
            (GPU_WORKLOAD_CONFIG_LABEL_KEY, "vm-vgpu"),
            (GPU_PRODUCT_LABEL_KEY, "NVIDIA-A100"),
        ]);

        update_gpu_state_labels(&mut node, &ctx).unwrap();
        for key in VM_VGPU_STATE_LABEL_KEYS {
            assert!(node.contains_key(key), "{key}");
        }
        // MIG manager only runs for container workloads
        assert!(!node.contains_key(MIG_MANAGER_LABEL_KEY));
        assert!(!node.contains_key(DRIVER_DEPLOY_LABEL_KEY));
    }

    #[test]
    fn test_update_labels_mig_capable_container_node() {
        let spec = ClusterPolicySpec::default();
        let ctx = EnablementContext::new(&spec);
        let mut node = labels(&[(PCI_KEY, "true"), (GPU_PRODUCT_LABEL_KEY, "NVIDIA-H100-80GB-HBM3")]);

        update_gpu_state_labels(&mut node, &ctx).unwrap();
        assert_eq!(node.get(MIG_MANAGER_LABEL_KEY).map(String::as_str), Some("true"));
        assert_eq!(
            node.get(MIG_CONFIG_LABEL_KEY).map(String::as_str),
            Some(MIG_CONFIG_DEFAULT_VALUE)
        );

        let mut configured = labels(&[
            (PCI_KEY, "true"),
            (MIG_CAPABLE_LABEL_KEY, "true"),
            (MIG_CONFIG_LABEL_KEY, "all-1g.10gb"),
        ]);
        update_gpu_state_labels(&mut configured, &ctx).unwrap();
        assert_eq!(
            configured.get(MIG_CONFIG_LABEL_KEY).map(String::as_str),
            Some("all-1g.10gb")
        );
        let mut pinned_off = labels(&[
            (PCI_KEY, "true"),
            (MIG_CAPABLE_LABEL_KEY, "true"),
            (MIG_MANAGER_LABEL_KEY, "false"),
        ]);
        update_gpu_state_labels(&mut pinned_off, &ctx).unwrap();
        assert_eq!(pinned_off.get(MIG_MANAGER_LABEL_KEY).map(String::as_str), Some("false"));
        assert!(!pinned_off.contains_key(MIG_CONFIG_LABEL_KEY));
    }

    #[test]
    fn test_update_labels_invalid_workload_config() {
        let spec = sandbox_spec("kubevirt");
        let ctx = EnablementContext::new(&spec);
        let mut node = labels(&[(PCI_KEY, "true"), (GPU_WORKLOAD_CONFIG_LABEL_KEY, "gpu-vm")]);
        assert!(matches!(
            update_gpu_state_labels(&mut node, &ctx),
            Err(ValidationError::InvalidWorkloadConfig { .. })
        ));
    }

    #[test]
    fn test_label_patch() {
        let before = labels(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let after = labels(&[("a", "1"), ("b", "20"), ("d", "4")]);
        assert_eq!(
            label_patch(&before, &after),
            Some(json!({ "metadata": { "labels": { "b": "20", "c": null, "d": "4" } } }))
        );
        assert_eq!(label_patch(&before, &before), None);
    }
}
