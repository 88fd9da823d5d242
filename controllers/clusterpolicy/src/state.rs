//! State enablement.
//!
//! A state is an independently deployable operand. Whether it is enabled is
//! decided by one predicate per state in [`STATE_TABLE`]; adding a state means
//! adding a row, never touching existing predicates.

use crate::labels::{
    CONTAINER_STATE_LABEL_KEYS, DEPLOY_LABEL_VALUE, KATA_DEVICE_PLUGIN_DEPLOY_LABEL_KEY,
    KUBEVIRT_DEVICE_PLUGIN_DEPLOY_LABEL_KEY, VM_PASSTHROUGH_STATE_LABEL_KEYS,
    VM_VGPU_STATE_LABEL_KEYS,
};
use crate::workload::{SandboxMode, WorkloadConfig};
use crds::{ClusterPolicySpec, ComponentSpec};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Known operand states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateName {
    Driver,
    ContainerToolkit,
    OperatorValidation,
    DevicePlugin,
    Dcgm,
    DcgmExporter,
    GpuFeatureDiscovery,
    MigManager,
    NodeStatusExporter,
    VgpuManager,
    VgpuDeviceManager,
    SandboxValidation,
    VfioManager,
    SandboxDevicePlugin,
    KataDevicePlugin,
    KataManager,
    CcManager,
}

impl StateName {
    /// Name used for manifest directories and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            StateName::Driver => "state-driver",
            StateName::ContainerToolkit => "state-container-toolkit",
            StateName::OperatorValidation => "state-operator-validation",
            StateName::DevicePlugin => "state-device-plugin",
            StateName::Dcgm => "state-dcgm",
            StateName::DcgmExporter => "state-dcgm-exporter",
            StateName::GpuFeatureDiscovery => "gpu-feature-discovery",
            StateName::MigManager => "state-mig-manager",
            StateName::NodeStatusExporter => "state-node-status-exporter",
            StateName::VgpuManager => "state-vgpu-manager",
            StateName::VgpuDeviceManager => "state-vgpu-device-manager",
            StateName::SandboxValidation => "state-sandbox-validation",
            StateName::VfioManager => "state-vfio-manager",
            StateName::SandboxDevicePlugin => "state-sandbox-device-plugin",
            StateName::KataDevicePlugin => "state-kata-device-plugin",
            StateName::KataManager => "state-kata-manager",
            StateName::CcManager => "state-cc-manager",
        }
    }

    /// ClusterPolicy settings of the component deployed by this state.
    /// Validation states have none.
    pub fn component(self, spec: &ClusterPolicySpec) -> Option<&ComponentSpec> {
        let component = match self {
            StateName::Driver => &spec.driver,
            StateName::ContainerToolkit => &spec.toolkit,
            StateName::OperatorValidation | StateName::SandboxValidation => return None,
            StateName::DevicePlugin => &spec.device_plugin,
            StateName::Dcgm => &spec.dcgm,
            StateName::DcgmExporter => &spec.dcgm_exporter,
            StateName::GpuFeatureDiscovery => &spec.gfd,
            StateName::MigManager => &spec.mig_manager,
            StateName::NodeStatusExporter => &spec.node_status_exporter,
            StateName::VgpuManager => &spec.vgpu_manager,
            StateName::VgpuDeviceManager => &spec.vgpu_device_manager,
            StateName::VfioManager => &spec.vfio_manager,
            StateName::SandboxDevicePlugin => &spec.sandbox_device_plugin,
            StateName::KataDevicePlugin => &spec.kata_sandbox_device_plugin,
            StateName::KataManager => &spec.kata_manager,
            StateName::CcManager => &spec.cc_manager,
        };
        Some(component)
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing a name that is not a known state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown state {0:?}")]
pub struct UnknownState(pub String);

impl FromStr for StateName {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        STATE_TABLE
            .iter()
            .map(|(state, _)| *state)
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// Inputs to the enablement predicates for one ClusterPolicy pass.
#[derive(Debug, Clone, Copy)]
pub struct EnablementContext<'a> {
    pub spec: &'a ClusterPolicySpec,
    /// Sandbox workloads master switch
    pub sandbox_enabled: bool,
}

type StatePredicate = fn(&EnablementContext<'_>) -> bool;

/// Every known state with its enablement predicate, in deployment order.
pub const STATE_TABLE: &[(StateName, StatePredicate)] = &[
    (StateName::Driver, |ctx| ctx.spec.driver.is_enabled()),
    (StateName::ContainerToolkit, |ctx| ctx.spec.toolkit.is_enabled()),
    (StateName::OperatorValidation, |_| true),
    (StateName::DevicePlugin, |ctx| ctx.spec.device_plugin.is_enabled()),
    (StateName::Dcgm, |ctx| ctx.spec.dcgm.is_enabled()),
    (StateName::DcgmExporter, |ctx| ctx.spec.dcgm_exporter.is_enabled()),
    (StateName::GpuFeatureDiscovery, |ctx| ctx.spec.gfd.is_enabled()),
    (StateName::MigManager, |ctx| ctx.spec.mig_manager.is_enabled()),
    (StateName::NodeStatusExporter, |ctx| ctx.spec.node_status_exporter.is_enabled()),
    (StateName::VgpuManager, |ctx| {
        ctx.sandbox_enabled && ctx.spec.vgpu_manager.is_enabled()
    }),
    (StateName::VgpuDeviceManager, |ctx| {
        ctx.sandbox_enabled && ctx.spec.vgpu_device_manager.is_enabled()
    }),
    (StateName::SandboxValidation, |ctx| ctx.sandbox_enabled),
    (StateName::VfioManager, |ctx| {
        ctx.sandbox_enabled && ctx.spec.vfio_manager.is_enabled()
    }),
    (StateName::SandboxDevicePlugin, |ctx| {
        ctx.sandbox_enabled
            && ctx.sandbox_mode() == Some(SandboxMode::KubeVirt)
            && ctx.spec.sandbox_device_plugin.is_enabled()
    }),
    (StateName::KataDevicePlugin, |ctx| {
        ctx.sandbox_enabled
            && ctx.sandbox_mode() == Some(SandboxMode::Kata)
            && ctx.spec.kata_sandbox_device_plugin.is_enabled()
    }),
    (StateName::KataManager, |ctx| {
        ctx.sandbox_enabled && ctx.spec.kata_manager.is_enabled()
    }),
    (StateName::CcManager, |ctx| {
        ctx.sandbox_enabled && ctx.spec.cc_manager.is_enabled()
    }),
];

impl<'a> EnablementContext<'a> {
    /// Context with the sandbox switch taken from the ClusterPolicy.
    pub fn new(spec: &'a ClusterPolicySpec) -> Self {
        Self {
            spec,
            sandbox_enabled: spec.sandbox_workloads.is_enabled(),
        }
    }

    pub fn sandbox_mode(&self) -> Option<SandboxMode> {
        SandboxMode::parse(self.spec.sandbox_workloads.mode())
    }

    /// Whether `state` should be deployed. Any missing precondition yields
    /// `false`.
    pub fn is_state_enabled(&self, state: StateName) -> bool {
        STATE_TABLE
            .iter()
            .find(|(s, _)| *s == state)
            .is_some_and(|(_, predicate)| predicate(self))
    }

    /// Enabled states in table order.
    pub fn enabled_states(&self) -> Vec<StateName> {
        STATE_TABLE
            .iter()
            .map(|(state, _)| *state)
            .filter(|state| self.is_state_enabled(*state))
            .collect()
    }
}

/// Deploy labels asserted on a node running `workload`.
///
/// For `vm-passthrough` the sandbox mode picks exactly one device plugin
/// flavour; an unset mode selects the KubeVirt one. The mode is ignored for
/// the other workload configs.
pub fn get_effective_state_labels(
    workload: WorkloadConfig,
    mode: Option<SandboxMode>,
) -> BTreeMap<String, String> {
    let keys: Vec<&str> = match workload {
        WorkloadConfig::Container => CONTAINER_STATE_LABEL_KEYS.to_vec(),
        WorkloadConfig::VmVgpu => VM_VGPU_STATE_LABEL_KEYS.to_vec(),
        WorkloadConfig::VmPassthrough => {
            let device_plugin = match mode {
                Some(SandboxMode::Kata) => KATA_DEVICE_PLUGIN_DEPLOY_LABEL_KEY,
                Some(SandboxMode::KubeVirt) | None => KUBEVIRT_DEVICE_PLUGIN_DEPLOY_LABEL_KEY,
            };
            std::iter::once(device_plugin)
                .chain(VM_PASSTHROUGH_STATE_LABEL_KEYS)
                .collect()
        }
    };
    keys.into_iter()
        .map(|k| (k.to_string(), DEPLOY_LABEL_VALUE.to_string()))
        .collect()
}
