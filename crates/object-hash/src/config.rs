//! Normalized projections of container and pod fields used for drift detection.
//!
//! Each extractor returns `None` for absent or empty input, so "no entries"
//! always has a single representation in a fingerprint, and sorts its output
//! so that reordering entries in a manifest never reads as a change.

use k8s_openapi::api::core::v1::{
    EnvVar as CoreEnvVar, Volume as CoreVolume, VolumeMount as CoreVolumeMount,
};
use serde::{Deserialize, Serialize};

/// Environment variable with a direct value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Literal value (may be empty)
    pub value: String,
}

/// Volume mount fields that matter for drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMountConfig {
    /// Volume name
    pub name: String,
    /// Path inside the container
    pub mount_path: String,
    /// Sub-path within the volume
    #[serde(default)]
    pub sub_path: String,
    /// Read-only mount
    #[serde(default)]
    pub read_only: bool,
}

/// Volume source projection. Sources other than host-path, config-map and
/// secret contribute only the volume name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeConfig {
    /// Volume name
    pub name: String,
    /// Host path, for host-path volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
    /// ConfigMap name, for config-map volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_name: Option<String>,
    /// Secret name, for secret volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

/// Extracts direct-value environment variables sorted by name.
///
/// Variables sourced from field, secret or config-map references are dropped:
/// their resolved value is not part of the pod template. An empty direct value is
/// kept. Duplicate names are preserved.
pub fn extract_env_vars(env: Option<&[CoreEnvVar]>) -> Option<Vec<EnvVar>> {
    let mut out: Vec<EnvVar> = env?
        .iter()
        .filter(|e| e.value_from.is_none())
        .map(|e| EnvVar {
            name: e.name.clone(),
            value: e.value.clone().unwrap_or_default(),
        })
        .collect();
    if out.is_empty() {
        return None;
    }
    out.sort();
    Some(out)
}

/// Returns a sorted copy of `env`, leaving the input untouched.
pub fn sort_env_vars(env: Option<&[EnvVar]>) -> Option<Vec<EnvVar>> {
    let mut sorted = env?.to_vec();
    sorted.sort();
    Some(sorted)
}

/// Extracts volume mounts sorted by name, then mount path.
pub fn extract_volume_mounts(mounts: Option<&[CoreVolumeMount]>) -> Option<Vec<VolumeMountConfig>> {
    let mounts = mounts.filter(|m| !m.is_empty())?;
    let mut out: Vec<VolumeMountConfig> = mounts
        .iter()
        .map(|m| VolumeMountConfig {
            name: m.name.clone(),
            mount_path: m.mount_path.clone(),
            sub_path: m.sub_path.clone().unwrap_or_default(),
            read_only: m.read_only.unwrap_or(false),
        })
        .collect();
    out.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.mount_path.cmp(&b.mount_path))
    });
    Some(out)
}

/// Extracts volumes sorted by name.
pub fn extract_volumes(volumes: Option<&[CoreVolume]>) -> Option<Vec<VolumeConfig>> {
    let volumes = volumes.filter(|v| !v.is_empty())?;
    let mut out: Vec<VolumeConfig> = volumes.iter().map(volume_config).collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Some(out)
}

fn volume_config(volume: &CoreVolume) -> VolumeConfig {
    let mut config = VolumeConfig {
        name: volume.name.clone(),
        ..Default::default()
    };
    if let Some(host_path) = &volume.host_path {
        config.host_path = Some(host_path.path.clone());
    } else if let Some(config_map) = &volume.config_map {
        config.config_map_name = Some(config_map.name.clone()).filter(|n| !n.is_empty());
    } else if let Some(secret) = &volume.secret {
        config.secret_name = secret.secret_name.clone().filter(|n| !n.is_empty());
    }
    config
}
