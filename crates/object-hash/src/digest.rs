//! Drift detection for operand DaemonSets.
//!
//! A desired DaemonSet is reduced to a [`DaemonSetConfig`] projection that
//! lists exactly the fields whose change should trigger a re-apply. The
//! sparse digest of that projection is stored on the live object under
//! [`LAST_APPLIED_HASH_ANNOTATION`] and compared on the next pass.

use crate::config::{
    EnvVar, VolumeConfig, VolumeMountConfig, extract_env_vars, extract_volume_mounts,
    extract_volumes,
};
use crate::hash::{HashError, object_hash_ignore_empty_keys};
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, PodSecurityContext, ResourceRequirements, SecurityContext,
    Toleration,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Annotation holding the fingerprint of the last applied desired object.
/// Only the operator writes it.
pub const LAST_APPLIED_HASH_ANNOTATION: &str = "nvidia.com/last-applied-hash";

/// Container fields tracked for drift.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    /// Container name
    pub name: String,
    /// Image reference
    pub image: Option<String>,
    /// Image pull policy
    pub image_pull_policy: Option<String>,
    /// Entrypoint override
    pub command: Option<Vec<String>>,
    /// Arguments to the entrypoint
    pub args: Option<Vec<String>>,
    /// Direct env vars, sorted
    pub env: Option<Vec<EnvVar>>,
    /// Exposed ports
    pub ports: Option<Vec<ContainerPort>>,
    /// Volume mounts, sorted
    pub volume_mounts: Option<Vec<VolumeMountConfig>>,
    /// Requests and limits
    pub resources: Option<ResourceRequirements>,
    /// Container security context
    pub security_context: Option<SecurityContext>,
}

/// DaemonSet fields tracked for drift.
///
/// New fields must serialize to a zero value when unset so that adding them
/// does not change the fingerprint of existing objects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonSetConfig {
    /// DaemonSet name
    pub name: String,
    /// DaemonSet namespace
    pub namespace: Option<String>,
    /// DaemonSet labels
    pub labels: Option<BTreeMap<String, String>>,
    /// Rollout strategy
    pub update_strategy: Option<DaemonSetUpdateStrategy>,
    /// Pod template labels
    pub template_labels: Option<BTreeMap<String, String>>,
    /// Pod template annotations
    pub template_annotations: Option<BTreeMap<String, String>>,
    /// Pod node selector
    pub node_selector: Option<BTreeMap<String, String>>,
    /// Pod affinity rules
    pub affinity: Option<Affinity>,
    /// Pod tolerations
    pub tolerations: Option<Vec<Toleration>>,
    /// Pod priority class
    pub priority_class_name: Option<String>,
    /// Pod runtime class
    pub runtime_class_name: Option<String>,
    /// Pod service account
    pub service_account_name: Option<String>,
    /// Pod runs in the host network namespace
    pub host_network: bool,
    /// Pod runs in the host PID namespace
    pub host_pid: bool,
    /// Pod security context
    pub pod_security_context: Option<PodSecurityContext>,
    /// Pod volumes, sorted
    pub volumes: Option<Vec<VolumeConfig>>,
    /// Init containers in declaration order
    pub init_containers: Option<Vec<ContainerConfig>>,
    /// Containers in declaration order
    pub containers: Option<Vec<ContainerConfig>>,
}

impl ContainerConfig {
    fn from_container(container: &Container) -> Self {
        Self {
            name: container.name.clone(),
            image: container.image.clone(),
            image_pull_policy: container.image_pull_policy.clone(),
            command: container.command.clone(),
            args: container.args.clone(),
            env: extract_env_vars(container.env.as_deref()),
            ports: container.ports.clone(),
            volume_mounts: extract_volume_mounts(container.volume_mounts.as_deref()),
            resources: container.resources.clone(),
            security_context: container.security_context.clone(),
        }
    }
}

impl DaemonSetConfig {
    /// Projects a DaemonSet onto its tracked fields.
    pub fn from_daemonset(ds: &DaemonSet) -> Self {
        let spec = ds.spec.as_ref();
        let template = spec.map(|s| &s.template);
        let template_meta = template.and_then(|t| t.metadata.as_ref());
        let pod = template.and_then(|t| t.spec.as_ref());

        let containers = pod
            .map(|p| p.containers.iter().map(ContainerConfig::from_container).collect::<Vec<_>>())
            .filter(|c| !c.is_empty());
        let init_containers = pod
            .and_then(|p| p.init_containers.as_ref())
            .map(|c| c.iter().map(ContainerConfig::from_container).collect::<Vec<_>>())
            .filter(|c| !c.is_empty());

        Self {
            name: ds.metadata.name.clone().unwrap_or_default(),
            namespace: ds.metadata.namespace.clone(),
            labels: ds.metadata.labels.clone(),
            update_strategy: spec.and_then(|s| s.update_strategy.clone()),
            template_labels: template_meta.and_then(|m| m.labels.clone()),
            template_annotations: template_meta.and_then(|m| m.annotations.clone()),
            node_selector: pod.and_then(|p| p.node_selector.clone()),
            affinity: pod.and_then(|p| p.affinity.clone()),
            tolerations: pod.and_then(|p| p.tolerations.clone()),
            priority_class_name: pod.and_then(|p| p.priority_class_name.clone()),
            runtime_class_name: pod.and_then(|p| p.runtime_class_name.clone()),
            service_account_name: pod.and_then(|p| p.service_account_name.clone()),
            host_network: pod.and_then(|p| p.host_network).unwrap_or(false),
            host_pid: pod.and_then(|p| p.host_pid).unwrap_or(false),
            pod_security_context: pod.and_then(|p| p.security_context.clone()),
            volumes: extract_volumes(pod.and_then(|p| p.volumes.as_deref())),
            init_containers,
            containers,
        }
    }
}

/// Fingerprint of the tracked fields of `ds`.
pub fn daemonset_fingerprint(ds: &DaemonSet) -> Result<String, HashError> {
    object_hash_ignore_empty_keys(&DaemonSetConfig::from_daemonset(ds))
}

/// Computes the fingerprint of `ds` and records it in its annotations.
pub fn stamp_fingerprint(ds: &mut DaemonSet) -> Result<String, HashError> {
    let hash = daemonset_fingerprint(ds)?;
    ds.metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(LAST_APPLIED_HASH_ANNOTATION.to_string(), hash.clone());
    Ok(hash)
}

/// Whether a desired object must be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyDecision {
    /// Live object is missing or differs
    Apply,
    /// Live object already carries the desired fingerprint
    Skip,
}

/// Compares the desired fingerprint with the one recorded on the live object.
///
/// `live_annotations` is `None` when the live object does not exist.
pub fn decide(desired_hash: &str, live_annotations: Option<&BTreeMap<String, String>>) -> ApplyDecision {
    let recorded = live_annotations.and_then(|a| a.get(LAST_APPLIED_HASH_ANNOTATION));
    match recorded {
        Some(hash) if hash == desired_hash => ApplyDecision::Skip,
        Some(hash) => {
            debug!("Fingerprint changed: {} -> {}", hash, desired_hash);
            ApplyDecision::Apply
        }
        None => ApplyDecision::Apply,
    }
}
