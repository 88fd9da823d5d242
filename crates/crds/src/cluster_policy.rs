//! ClusterPolicy CRD
//!
//! Cluster-scoped resource describing which GPU components ("states") the
//! operator deploys and how GPU access is exposed to workloads.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default workload configuration when neither the node nor the policy selects one
pub const DEFAULT_WORKLOAD_CONFIG: &str = "container";

/// ClusterPolicySpec defines the desired GPU stack for the whole cluster
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "nvidia.com",
    version = "v1",
    kind = "ClusterPolicy",
    shortname = "cp",
    status = "ClusterPolicyStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPolicySpec {
    /// Operator-wide settings
    #[serde(default)]
    pub operator: OperatorSpec,

    /// GPU driver
    #[serde(default)]
    pub driver: ComponentSpec,

    /// Container toolkit
    #[serde(default)]
    pub toolkit: ComponentSpec,

    /// Device plugin for container workloads
    #[serde(default)]
    pub device_plugin: ComponentSpec,

    /// DCGM host engine
    #[serde(default)]
    pub dcgm: ComponentSpec,

    /// DCGM exporter
    #[serde(default)]
    pub dcgm_exporter: ComponentSpec,

    /// GPU feature discovery
    #[serde(default)]
    pub gfd: ComponentSpec,

    /// MIG manager
    #[serde(default)]
    pub mig_manager: ComponentSpec,

    /// Node status exporter
    #[serde(default)]
    pub node_status_exporter: ComponentSpec,

    /// vGPU manager (vm-vgpu workloads)
    #[serde(default)]
    pub vgpu_manager: ComponentSpec,

    /// vGPU device manager (vm-vgpu workloads)
    #[serde(default)]
    pub vgpu_device_manager: ComponentSpec,

    /// VFIO manager (vm-passthrough workloads)
    #[serde(default)]
    pub vfio_manager: ComponentSpec,

    /// KubeVirt sandbox device plugin
    #[serde(default)]
    pub sandbox_device_plugin: ComponentSpec,

    /// Kata sandbox device plugin
    #[serde(default)]
    pub kata_sandbox_device_plugin: ComponentSpec,

    /// Kata manager
    #[serde(default)]
    pub kata_manager: ComponentSpec,

    /// Confidential computing manager
    #[serde(default)]
    pub cc_manager: ComponentSpec,

    /// Sandbox (VM) workload settings
    #[serde(default)]
    pub sandbox_workloads: SandboxWorkloadsSpec,

    /// Container Device Interface settings
    #[serde(default)]
    pub cdi: CDIConfigSpec,

    /// MIG settings
    #[serde(default)]
    pub mig: MIGSpec,
}

/// Settings shared by every deployable component.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Deploy this component. Unset means disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Image repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Image name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Image tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Extra environment variables for the component's main container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<ComponentEnvVar>>,
}

impl ComponentSpec {
    /// Whether the component is explicitly enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    /// Fully qualified image reference, when enough of it is set
    pub fn image_path(&self) -> Option<String> {
        let image = self.image.as_deref()?;
        let mut path = match self.repository.as_deref() {
            Some(repo) if !repo.is_empty() => format!("{}/{}", repo.trim_end_matches('/'), image),
            _ => image.to_string(),
        };
        if let Some(version) = self.version.as_deref().filter(|v| !v.is_empty()) {
            // Digests are appended with '@', tags with ':'
            if version.starts_with("sha256:") {
                path = format!("{}@{}", path, version);
            } else {
                path = format!("{}:{}", path, version);
            }
        }
        Some(path)
    }
}

/// Plain name/value environment variable
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentEnvVar {
    /// Variable name
    pub name: String,

    /// Variable value
    #[serde(default)]
    pub value: String,
}

/// Operator-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperatorSpec {
    /// Runtime assumed when no GPU node reports a recognizable container runtime
    #[serde(default)]
    pub default_runtime: Runtime,
}

/// Sandbox (VM) workload settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SandboxWorkloadsSpec {
    /// Master switch for sandbox workloads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Workload config applied to nodes without an explicit
    /// `nvidia.com/gpu.workload.config` label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_workload: Option<String>,

    /// Sandbox technology: "kubevirt" or "kata"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl SandboxWorkloadsSpec {
    /// Whether sandbox workloads are enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    /// Configured default workload, falling back to `container`
    pub fn default_workload(&self) -> &str {
        self.default_workload
            .as_deref()
            .filter(|w| !w.is_empty())
            .unwrap_or(DEFAULT_WORKLOAD_CONFIG)
    }

    /// Raw mode string ("" when unset)
    pub fn mode(&self) -> &str {
        self.mode.as_deref().unwrap_or_default()
    }
}

/// Container Device Interface settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CDIConfigSpec {
    /// Generate CDI specs for GPUs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Make CDI the default injection mechanism
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,

    /// Deploy the NRI plugin (requires CDI)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nri_plugin_enabled: Option<bool>,
}

impl CDIConfigSpec {
    /// Whether CDI is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    /// Whether the NRI plugin is enabled
    pub fn is_nri_plugin_enabled(&self) -> bool {
        self.nri_plugin_enabled.unwrap_or(false)
    }
}

/// MIG settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MIGSpec {
    /// How MIG devices are advertised
    #[serde(default)]
    pub strategy: MIGStrategy,
}

/// MIG device advertisement strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MIGStrategy {
    /// One MIG profile per node
    #[default]
    Single,

    /// Mixed MIG profiles
    Mixed,
}

/// Container runtime running on the nodes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    /// Docker engine
    Docker,

    /// containerd
    #[default]
    Containerd,

    /// CRI-O
    Crio,
}

impl Runtime {
    /// Name passed to operands
    pub fn as_str(self) -> &'static str {
        match self {
            Runtime::Docker => "docker",
            Runtime::Containerd => "containerd",
            Runtime::Crio => "crio",
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall state reported on a ClusterPolicy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PolicyState {
    /// All enabled states are applied
    Ready,

    /// Reconciliation did not complete
    #[default]
    NotReady,

    /// Another ClusterPolicy is authoritative
    Ignored,
}

/// ClusterPolicyStatus defines the observed state of a ClusterPolicy
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPolicyStatus {
    /// Current state
    pub state: PolicyState,

    /// Namespace operands are deployed into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Error message if reconciliation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Last time the state changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_flags_are_disabled() {
        let spec = ClusterPolicySpec::default();
        assert!(!spec.driver.is_enabled());
        assert!(!spec.sandbox_workloads.is_enabled());
        assert!(!spec.cdi.is_enabled());
        assert!(!spec.cdi.is_nri_plugin_enabled());
        assert_eq!(spec.sandbox_workloads.default_workload(), "container");
        assert_eq!(spec.sandbox_workloads.mode(), "");
    }

    #[test]
    fn test_spec_deserializes_camel_case() {
        let spec: ClusterPolicySpec = serde_json::from_value(serde_json::json!({
            "sandboxWorkloads": {"enabled": true, "mode": "kata", "defaultWorkload": "vm-passthrough"},
            "kataSandboxDevicePlugin": {"enabled": true},
            "cdi": {"enabled": true, "nriPluginEnabled": true},
            "operator": {"defaultRuntime": "crio"}
        }))
        .unwrap();
        assert!(spec.sandbox_workloads.is_enabled());
        assert_eq!(spec.sandbox_workloads.mode(), "kata");
        assert_eq!(spec.sandbox_workloads.default_workload(), "vm-passthrough");
        assert!(spec.kata_sandbox_device_plugin.is_enabled());
        assert!(spec.cdi.is_nri_plugin_enabled());
        assert_eq!(spec.operator.default_runtime, Runtime::Crio);
    }

    #[test]
    fn test_image_path() {
        let spec = ComponentSpec {
            repository: Some("nvcr.io/nvidia/".to_string()),
            image: Some("k8s-device-plugin".to_string()),
            version: Some("v0.17.0".to_string()),
            ..Default::default()
        };
        assert_eq!(spec.image_path().as_deref(), Some("nvcr.io/nvidia/k8s-device-plugin:v0.17.0"));

        let digest = ComponentSpec {
            image: Some("driver".to_string()),
            version: Some("sha256:abcd".to_string()),
            ..Default::default()
        };
        assert_eq!(digest.image_path().as_deref(), Some("driver@sha256:abcd"));
        assert_eq!(ComponentSpec::default().image_path(), None);
    }
}
