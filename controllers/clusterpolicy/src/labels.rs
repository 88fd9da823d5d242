//! Node label vocabulary.
//!
//! Every label key and value the controller reads or writes lives here. The
//! keys are a compatibility contract with the operands' node selectors and
//! with node-feature-discovery, so they must not change.

/// Prefix of all node-feature-discovery labels
pub const NFD_LABEL_PREFIX: &str = "feature.node.kubernetes.io/";

/// PCI presence labels published by node-feature-discovery for NVIDIA devices
/// (vendor `10de`, plain and with display/3D controller class).
pub const GPU_PCI_LABEL_KEYS: [&str; 3] = [
    "feature.node.kubernetes.io/pci-10de.present",
    "feature.node.kubernetes.io/pci-0302_10de.present",
    "feature.node.kubernetes.io/pci-0300_10de.present",
];

/// Canonical "GPU present" label maintained by the controller
pub const COMMON_GPU_LABEL_KEY: &str = "nvidia.com/gpu.present";
/// Value of [`COMMON_GPU_LABEL_KEY`] on a node with a GPU
pub const COMMON_GPU_LABEL_VALUE: &str = "true";

/// Operands are deployed on the node unless this label is `"false"`
pub const COMMON_OPERANDS_LABEL_KEY: &str = "nvidia.com/gpu.deploy.operands";

/// Published by GPU feature discovery on MIG-capable nodes
pub const MIG_CAPABLE_LABEL_KEY: &str = "nvidia.com/mig.capable";
/// Value of [`MIG_CAPABLE_LABEL_KEY`] on a MIG-capable node
pub const MIG_CAPABLE_LABEL_VALUE: &str = "true";

/// GPU product name published by GPU feature discovery
pub const GPU_PRODUCT_LABEL_KEY: &str = "nvidia.com/gpu.product";
/// Set on nodes running the vGPU host driver
pub const VGPU_HOST_DRIVER_LABEL_KEY: &str = "nvidia.com/vgpu.host-driver-version";

/// Per-node override of the cluster default workload config
pub const GPU_WORKLOAD_CONFIG_LABEL_KEY: &str = "nvidia.com/gpu.workload.config";

/// MIG partitioning requested from the MIG manager
pub const MIG_CONFIG_LABEL_KEY: &str = "nvidia.com/mig.config";
/// MIG config asserted when the node has none
pub const MIG_CONFIG_DEFAULT_VALUE: &str = "all-disabled";

/// Deploy label of the MIG manager
pub const MIG_MANAGER_LABEL_KEY: &str = "nvidia.com/gpu.deploy.mig-manager";
/// Value of [`MIG_MANAGER_LABEL_KEY`] when the MIG manager runs
pub const MIG_MANAGER_LABEL_VALUE: &str = "true";

/// Value asserted on every deploy label
pub const DEPLOY_LABEL_VALUE: &str = "true";

/// Deploy label of the driver
pub const DRIVER_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.driver";
/// Deploy label of GPU feature discovery
pub const GFD_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.gpu-feature-discovery";
/// Deploy label of the container toolkit
pub const TOOLKIT_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.container-toolkit";
/// Deploy label of the container device plugin
pub const DEVICE_PLUGIN_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.device-plugin";
/// Deploy label of DCGM
pub const DCGM_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.dcgm";
/// Deploy label of the DCGM exporter
pub const DCGM_EXPORTER_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.dcgm-exporter";
/// Deploy label of the node status exporter
pub const NODE_STATUS_EXPORTER_DEPLOY_LABEL_KEY: &str =
    "nvidia.com/gpu.deploy.node-status-exporter";
/// Deploy label of the operator validator
pub const OPERATOR_VALIDATOR_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.operator-validator";

/// KubeVirt-flavoured sandbox device plugin. Mutually exclusive with
/// [`KATA_DEVICE_PLUGIN_DEPLOY_LABEL_KEY`] on any node.
pub const KUBEVIRT_DEVICE_PLUGIN_DEPLOY_LABEL_KEY: &str =
    "nvidia.com/gpu.deploy.sandbox-device-plugin";
/// Kata-flavoured sandbox device plugin
pub const KATA_DEVICE_PLUGIN_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.kata-device-plugin";

/// Deploy label of the sandbox validator
pub const SANDBOX_VALIDATOR_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.sandbox-validator";
/// Deploy label of the VFIO manager
pub const VFIO_MANAGER_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.vfio-manager";
/// Deploy label of the vGPU manager
pub const VGPU_MANAGER_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.vgpu-manager";
/// Deploy label of the vGPU device manager
pub const VGPU_DEVICE_MANAGER_DEPLOY_LABEL_KEY: &str =
    "nvidia.com/gpu.deploy.vgpu-device-manager";
/// Deploy label of the Kata manager
pub const KATA_MANAGER_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.kata-manager";
/// Deploy label of the confidential computing manager
pub const CC_MANAGER_DEPLOY_LABEL_KEY: &str = "nvidia.com/gpu.deploy.cc-manager";

/// Deploy labels of the `container` workload config
pub const CONTAINER_STATE_LABEL_KEYS: [&str; 8] = [
    DRIVER_DEPLOY_LABEL_KEY,
    GFD_DEPLOY_LABEL_KEY,
    TOOLKIT_DEPLOY_LABEL_KEY,
    DEVICE_PLUGIN_DEPLOY_LABEL_KEY,
    DCGM_DEPLOY_LABEL_KEY,
    DCGM_EXPORTER_DEPLOY_LABEL_KEY,
    NODE_STATUS_EXPORTER_DEPLOY_LABEL_KEY,
    OPERATOR_VALIDATOR_DEPLOY_LABEL_KEY,
];

/// Deploy labels of the `vm-passthrough` workload config, without its
/// sandbox device plugin (selected by sandbox mode).
pub const VM_PASSTHROUGH_STATE_LABEL_KEYS: [&str; 4] = [
    SANDBOX_VALIDATOR_DEPLOY_LABEL_KEY,
    VFIO_MANAGER_DEPLOY_LABEL_KEY,
    KATA_MANAGER_DEPLOY_LABEL_KEY,
    CC_MANAGER_DEPLOY_LABEL_KEY,
];

/// Deploy labels of the `vm-vgpu` workload config
pub const VM_VGPU_STATE_LABEL_KEYS: [&str; 6] = [
    KUBEVIRT_DEVICE_PLUGIN_DEPLOY_LABEL_KEY,
    SANDBOX_VALIDATOR_DEPLOY_LABEL_KEY,
    VGPU_MANAGER_DEPLOY_LABEL_KEY,
    VGPU_DEVICE_MANAGER_DEPLOY_LABEL_KEY,
    KATA_MANAGER_DEPLOY_LABEL_KEY,
    CC_MANAGER_DEPLOY_LABEL_KEY,
];

/// Every deploy label owned by the controller, across all workload configs,
/// both sandbox device plugin flavours and the MIG manager.
pub fn all_gpu_state_label_keys() -> impl Iterator<Item = &'static str> {
    CONTAINER_STATE_LABEL_KEYS
        .into_iter()
        .chain(VM_PASSTHROUGH_STATE_LABEL_KEYS)
        .chain(VM_VGPU_STATE_LABEL_KEYS)
        .chain([KATA_DEVICE_PLUGIN_DEPLOY_LABEL_KEY, MIG_MANAGER_LABEL_KEY])
}
