//! Workload config resolution, ClusterPolicy validation and container
//! runtime detection.

use crate::error::ValidationError;
use crate::labels::GPU_WORKLOAD_CONFIG_LABEL_KEY;
use crate::node_classifier::{NodeLabels, has_common_gpu_label, has_gpu_labels};
use crds::{ClusterPolicySpec, Runtime};
use k8s_openapi::api::core::v1::Node;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// How GPUs on a node are exposed to workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadConfig {
    /// GPUs consumed directly by containers
    Container,
    /// Whole GPUs passed through to VMs
    VmPassthrough,
    /// Mediated vGPU devices handed to VMs
    VmVgpu,
}

impl WorkloadConfig {
    pub const ALL: [WorkloadConfig; 3] = [
        WorkloadConfig::Container,
        WorkloadConfig::VmPassthrough,
        WorkloadConfig::VmVgpu,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadConfig::Container => "container",
            WorkloadConfig::VmPassthrough => "vm-passthrough",
            WorkloadConfig::VmVgpu => "vm-vgpu",
        }
    }
}

impl fmt::Display for WorkloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadConfig {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkloadConfig::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidWorkloadConfig {
                value: s.to_string(),
                source_name: "workload config".to_string(),
            })
    }
}

/// True only for the three known workload config strings.
pub fn is_valid_workload_config(value: &str) -> bool {
    WorkloadConfig::ALL.iter().any(|w| w.as_str() == value)
}

/// Sandbox technology used for VM workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxMode {
    KubeVirt,
    Kata,
}

impl SandboxMode {
    /// Parses a mode string. Unknown or empty strings are unset.
    pub fn parse(value: &str) -> Option<Self> {
        [SandboxMode::KubeVirt, SandboxMode::Kata]
            .into_iter()
            .find(|mode| mode.as_str() == value)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SandboxMode::KubeVirt => "kubevirt",
            SandboxMode::Kata => "kata",
        }
    }
}

/// Rejects field combinations that cannot be deployed.
///
/// Unset CDI counts as disabled.
pub fn validate_cluster_policy_spec(spec: &ClusterPolicySpec) -> Result<(), ValidationError> {
    if spec.cdi.is_nri_plugin_enabled() && !spec.cdi.is_enabled() {
        return Err(ValidationError::NriPluginWithoutCdi);
    }
    Ok(())
}

/// Workload config effective on a node.
///
/// With sandbox workloads disabled every node runs container workloads. A
/// node label overrides the ClusterPolicy default. Invalid values from
/// either source are rejected, never defaulted.
pub fn resolve_workload_config(
    labels: &NodeLabels,
    spec: &ClusterPolicySpec,
    sandbox_enabled: bool,
) -> Result<WorkloadConfig, ValidationError> {
    if !sandbox_enabled {
        return Ok(WorkloadConfig::Container);
    }
    if let Some(value) = labels.get(GPU_WORKLOAD_CONFIG_LABEL_KEY) {
        let source = format!("node label {}", GPU_WORKLOAD_CONFIG_LABEL_KEY);
        return parse_workload_config(value, &source);
    }
    parse_workload_config(
        spec.sandbox_workloads.default_workload(),
        "ClusterPolicy sandboxWorkloads.defaultWorkload",
    )
}

fn parse_workload_config(value: &str, source_name: &str) -> Result<WorkloadConfig, ValidationError> {
    if !is_valid_workload_config(value) {
        return Err(ValidationError::InvalidWorkloadConfig {
            value: value.to_string(),
            source_name: source_name.to_string(),
        });
    }
    value.parse()
}

/// Container runtime reported by the node, from its
/// `<name>://<version>` runtime version string. The version is discarded.
/// Unrecognized or missing values are unset.
pub fn get_runtime_string(node: &Node) -> Option<Runtime> {
    let version = node
        .status
        .as_ref()?
        .node_info
        .as_ref()?
        .container_runtime_version
        .as_str();
    let (name, _) = version.split_once("://")?;
    match name {
        "docker" => Some(Runtime::Docker),
        "containerd" => Some(Runtime::Containerd),
        "cri-o" => Some(Runtime::Crio),
        _ => None,
    }
}

/// Runtime of the first GPU node that reports a recognizable one, else
/// `default`.
pub fn cluster_runtime(nodes: &[Node], default: Runtime) -> Runtime {
    for node in nodes {
        let labels = node.metadata.labels.clone().unwrap_or_default();
        if !has_gpu_labels(&labels) && !has_common_gpu_label(&labels) {
            continue;
        }
        let name = node.metadata.name.as_deref().unwrap_or_default();
        match get_runtime_string(node) {
            Some(runtime) => {
                debug!("Detected container runtime {} on node {}", runtime, name);
                return runtime;
            }
            None => {
                let reported = node
                    .status
                    .as_ref()
                    .and_then(|s| s.node_info.as_ref())
                    .map(|i| i.container_runtime_version.as_str())
                    .unwrap_or_default();
                warn!("Unrecognized container runtime {:?} on node {}", reported, name);
            }
        }
    }
    default
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{gpu_node, labels, node_with_runtime};
    use crds::{CDIConfigSpec, SandboxWorkloadsSpec};

    #[test]
    fn test_get_runtime_string() {
        let cases = [
            ("containerd", "containerd://1.0.0", Some(Runtime::Containerd)),
            ("docker", "docker://1.0.0", Some(Runtime::Docker)),
            ("crio", "cri-o://1.0.0", Some(Runtime::Crio)),
            ("unknown", "unknown://1.0.0", None),
            ("no separator", "containerd", None),
            ("empty", "", None),
        ];
        for (description, version, expected) in cases {
            let node = node_with_runtime("node-1", labels(&[]), version);
            assert_eq!(get_runtime_string(&node), expected, "{description}");
        }
        assert_eq!(get_runtime_string(&Node::default()), None);
    }

    #[test]
    fn test_cluster_runtime_uses_first_gpu_node() {
        let nodes = vec![
            node_with_runtime("cpu-node", labels(&[]), "docker://24.0.0"),
            gpu_node("gpu-unknown", "unknown://1.0"),
            gpu_node("gpu-crio", "cri-o://1.29.0"),
            gpu_node("gpu-containerd", "containerd://1.7.0"),
        ];
        assert_eq!(cluster_runtime(&nodes, Runtime::Containerd), Runtime::Crio);
    }

    #[test]
    fn test_cluster_runtime_falls_back_to_default() {
        let nodes = vec![node_with_runtime("cpu-node", labels(&[]), "docker://24.0.0")];
        assert_eq!(cluster_runtime(&nodes, Runtime::Containerd), Runtime::Containerd);
        assert_eq!(cluster_runtime(&[], Runtime::Docker), Runtime::Docker);
    }

    #[test]
    fn test_is_valid_workload_config() {
        let cases = [
            ("container", true),
            ("vm-passthrough", true),
            ("vm-vgpu", true),
            ("invalid", false),
            ("", false),
            ("Container", false),
        ];
        for (value, want) in cases {
            assert_eq!(is_valid_workload_config(value), want, "{value:?}");
        }
    }

    #[test]
    fn test_sandbox_mode_parse() {
        assert_eq!(SandboxMode::parse("kubevirt"), Some(SandboxMode::KubeVirt));
        assert_eq!(SandboxMode::parse("kata"), Some(SandboxMode::Kata));
        assert_eq!(SandboxMode::parse("firecracker"), None);
        assert_eq!(SandboxMode::parse(""), None);
    }

    #[test]
    fn test_validate_cluster_policy_spec() {
        let valid = ClusterPolicySpec {
            cdi: CDIConfigSpec {
                enabled: Some(true),
                nri_plugin_enabled: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(validate_cluster_policy_spec(&valid), Ok(()));

        let invalid = ClusterPolicySpec {
            cdi: CDIConfigSpec {
                enabled: Some(false),
                nri_plugin_enabled: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = validate_cluster_policy_spec(&invalid).unwrap_err();
        assert_eq!(err.to_string(), "the NRI Plugin cannot be enabled when CDI is disabled");

        let unset_cdi = ClusterPolicySpec {
            cdi: CDIConfigSpec {
                nri_plugin_enabled: Some(true),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            validate_cluster_policy_spec(&unset_cdi),
            Err(ValidationError::NriPluginWithoutCdi)
        );

        assert_eq!(validate_cluster_policy_spec(&ClusterPolicySpec::default()), Ok(()));
    }

    fn sandbox_spec(default_workload: Option<&str>) -> ClusterPolicySpec {
        ClusterPolicySpec {
            sandbox_workloads: SandboxWorkloadsSpec {
                enabled: Some(true),
                default_workload: default_workload.map(str::to_string),
                mode: Some("kubevirt".to_string()),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_workload_config_sandbox_disabled() {
        let node = labels(&[(GPU_WORKLOAD_CONFIG_LABEL_KEY, "vm-vgpu")]);
        let resolved = resolve_workload_config(&node, &sandbox_spec(Some("vm-passthrough")), false);
        assert_eq!(resolved, Ok(WorkloadConfig::Container));
    }

    #[test]
    fn test_resolve_workload_config_node_label_wins() {
        let node = labels(&[(GPU_WORKLOAD_CONFIG_LABEL_KEY, "vm-vgpu")]);
        let resolved = resolve_workload_config(&node, &sandbox_spec(Some("vm-passthrough")), true);
        assert_eq!(resolved, Ok(WorkloadConfig::VmVgpu));
    }

    #[test]
    fn test_resolve_workload_config_policy_default() {
        let resolved =
            resolve_workload_config(&labels(&[]), &sandbox_spec(Some("vm-passthrough")), true);
        assert_eq!(resolved, Ok(WorkloadConfig::VmPassthrough));

        let unset = resolve_workload_config(&labels(&[]), &sandbox_spec(None), true);
        assert_eq!(unset, Ok(WorkloadConfig::Container));
    }

    #[test]
    fn test_resolve_workload_config_rejects_invalid_values() {
        let node = labels(&[(GPU_WORKLOAD_CONFIG_LABEL_KEY, "bogus")]);
        match resolve_workload_config(&node, &sandbox_spec(None), true) {
            Err(ValidationError::InvalidWorkloadConfig { value, source_name }) => {
                assert_eq!(value, "bogus");
                assert!(source_name.contains(GPU_WORKLOAD_CONFIG_LABEL_KEY), "{source_name}");
            }
            other => panic!("expected invalid workload config, got {other:?}"),
        }

        let empty_label = labels(&[(GPU_WORKLOAD_CONFIG_LABEL_KEY, "")]);
        assert!(resolve_workload_config(&empty_label, &sandbox_spec(None), true).is_err());

        let bad_default = resolve_workload_config(&labels(&[]), &sandbox_spec(Some("vm")), true);
        assert!(bad_default.is_err());
    }
}
