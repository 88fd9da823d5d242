//! Pure queries over a node's label set.
//!
//! All functions are total: an empty map or missing labels answer `false`.

use crate::labels::{
    COMMON_GPU_LABEL_KEY, COMMON_GPU_LABEL_VALUE, COMMON_OPERANDS_LABEL_KEY, GPU_PCI_LABEL_KEYS,
    GPU_PRODUCT_LABEL_KEY, MIG_CAPABLE_LABEL_KEY, MIG_CAPABLE_LABEL_VALUE, MIG_MANAGER_LABEL_KEY,
    MIG_MANAGER_LABEL_VALUE, NFD_LABEL_PREFIX, VGPU_HOST_DRIVER_LABEL_KEY,
};
use std::collections::BTreeMap;

/// Node labels as read from the API.
pub type NodeLabels = BTreeMap<String, String>;

/// Product name fragments of GPUs that support MIG, matched case-insensitively.
const MIG_CAPABLE_PRODUCTS: [&str; 4] = ["a100", "a30", "h100", "h200"];

fn has_label_value(labels: &NodeLabels, key: &str, value: &str) -> bool {
    labels.get(key).is_some_and(|v| v == value)
}

/// True when node-feature-discovery reports an NVIDIA PCI device.
pub fn has_gpu_labels(labels: &NodeLabels) -> bool {
    GPU_PCI_LABEL_KEYS
        .iter()
        .any(|key| has_label_value(labels, key, "true"))
}

/// True when any node-feature-discovery label is present.
pub fn has_nfd_labels(labels: &NodeLabels) -> bool {
    labels.keys().any(|k| k.starts_with(NFD_LABEL_PREFIX))
}

pub fn has_common_gpu_label(labels: &NodeLabels) -> bool {
    has_label_value(labels, COMMON_GPU_LABEL_KEY, COMMON_GPU_LABEL_VALUE)
}

pub fn has_mig_manager_label(labels: &NodeLabels) -> bool {
    has_label_value(labels, MIG_MANAGER_LABEL_KEY, MIG_MANAGER_LABEL_VALUE)
}

/// True when the node runs a vGPU host driver.
pub fn has_vgpu_host_driver(labels: &NodeLabels) -> bool {
    labels
        .get(VGPU_HOST_DRIVER_LABEL_KEY)
        .is_some_and(|v| !v.is_empty())
}

/// True when the node's GPU supports MIG.
///
/// A vGPU host never is. Otherwise the explicit capability label decides when
/// present, and the product name is matched against known MIG-capable parts
/// when it is not.
pub fn has_mig_capable_gpu(labels: &NodeLabels) -> bool {
    if has_vgpu_host_driver(labels) {
        return false;
    }
    if let Some(value) = labels.get(MIG_CAPABLE_LABEL_KEY) {
        return value == MIG_CAPABLE_LABEL_VALUE;
    }
    labels.get(GPU_PRODUCT_LABEL_KEY).is_some_and(|product| {
        let product = product.to_lowercase();
        MIG_CAPABLE_PRODUCTS.iter().any(|p| product.contains(p))
    })
}

/// True only when the operands label is explicitly `"false"`.
pub fn has_operands_disabled(labels: &NodeLabels) -> bool {
    has_label_value(labels, COMMON_OPERANDS_LABEL_KEY, "false")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::labels;

    #[test]
    fn test_has_gpu_labels() {
        let cases = [
            (labels(&[("feature.node.kubernetes.io/pci-10de.present", "true")]), true),
            (labels(&[("feature.node.kubernetes.io/pci-0302_10de.present", "true")]), true),
            (labels(&[("feature.node.kubernetes.io/pci-0300_10de.present", "true")]), true),
            (labels(&[("feature.node.kubernetes.io/pci-10de.present", "false")]), false),
            (labels(&[("other", "true")]), false),
            (NodeLabels::new(), false),
        ];
        for (input, want) in cases {
            assert_eq!(has_gpu_labels(&input), want, "{input:?}");
        }
    }

    #[test]
    fn test_has_nfd_labels() {
        assert!(has_nfd_labels(&labels(&[("feature.node.kubernetes.io/cpu", "false")])));
        assert!(!has_nfd_labels(&labels(&[("other-label", "value")])));
        assert!(!has_nfd_labels(&NodeLabels::new()));
    }

    #[test]
    fn test_has_common_gpu_label() {
        assert!(has_common_gpu_label(&labels(&[(COMMON_GPU_LABEL_KEY, "true")])));
        assert!(!has_common_gpu_label(&labels(&[(COMMON_GPU_LABEL_KEY, "false")])));
        assert!(!has_common_gpu_label(&NodeLabels::new()));
    }

    #[test]
    fn test_has_mig_manager_label() {
        assert!(has_mig_manager_label(&labels(&[(MIG_MANAGER_LABEL_KEY, "true")])));
        assert!(!has_mig_manager_label(&labels(&[(MIG_MANAGER_LABEL_KEY, "false")])));
        assert!(!has_mig_manager_label(&labels(&[("other", "value")])));
    }

    #[test]
    fn test_has_mig_capable_gpu() {
        let cases = [
            (labels(&[(MIG_CAPABLE_LABEL_KEY, "true")]), true),
            (labels(&[(MIG_CAPABLE_LABEL_KEY, "false")]), false),
            (labels(&[(GPU_PRODUCT_LABEL_KEY, "NVIDIA-A100")]), true),
            (labels(&[(GPU_PRODUCT_LABEL_KEY, "NVIDIA-H100")]), true),
            (labels(&[(GPU_PRODUCT_LABEL_KEY, "NVIDIA-A30")]), true),
            (labels(&[(GPU_PRODUCT_LABEL_KEY, "NVIDIA-H200-SXM")]), true),
            (labels(&[(GPU_PRODUCT_LABEL_KEY, "NVIDIA-T4")]), false),
            (labels(&[(VGPU_HOST_DRIVER_LABEL_KEY, "535.54")]), false),
            (NodeLabels::new(), false),
        ];
        for (input, want) in cases {
            assert_eq!(has_mig_capable_gpu(&input), want, "{input:?}");
        }
    }

    #[test]
    fn test_has_mig_capable_gpu_explicit_label_wins() {
        let node = labels(&[
            (MIG_CAPABLE_LABEL_KEY, "false"),
            (GPU_PRODUCT_LABEL_KEY, "NVIDIA-A100-SXM4-40GB"),
        ]);
        assert!(!has_mig_capable_gpu(&node));
    }

    #[test]
    fn test_has_mig_capable_gpu_vgpu_host() {
        let node = labels(&[
            (MIG_CAPABLE_LABEL_KEY, "true"),
            (VGPU_HOST_DRIVER_LABEL_KEY, "550.90"),
        ]);
        assert!(!has_mig_capable_gpu(&node));
    }

    #[test]
    fn test_has_operands_disabled() {
        assert!(has_operands_disabled(&labels(&[(COMMON_OPERANDS_LABEL_KEY, "false")])));
        assert!(!has_operands_disabled(&labels(&[(COMMON_OPERANDS_LABEL_KEY, "true")])));
        assert!(!has_operands_disabled(&NodeLabels::new()));
    }
}
