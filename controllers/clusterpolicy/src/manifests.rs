//! Desired operand DaemonSets.
//!
//! Manifests live on disk in one directory per state
//! (`<root>/<state-name>/*.yaml`). They are rendered for the cluster by
//! filling in the operator namespace, the detected container runtime and the
//! component's image and env overrides from the ClusterPolicy.

use crate::error::ManifestError;
use crate::state::StateName;
use crds::{ComponentSpec, Runtime};
use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Container, EnvVar};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Env var carrying the container runtime name to every operand container
pub const RUNTIME_ENV_VAR: &str = "RUNTIME";

/// Label marking objects managed by the controller
pub const MANAGED_BY_LABEL_KEY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_LABEL_VALUE: &str = "gpu-operator";

/// Label recording which state an object belongs to
pub const STATE_LABEL_KEY: &str = "nvidia.com/gpu-operator.state";

/// Cluster-specific values substituted into manifests.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub namespace: &'a str,
    pub runtime: Runtime,
    /// ClusterPolicy settings of the state's component, if it has one
    pub component: Option<&'a ComponentSpec>,
}

/// Source of the desired DaemonSets of a state.
pub trait ManifestSource: Send + Sync {
    /// Rendered DaemonSets of `state`. A state without manifests yields none.
    fn desired_daemonsets(
        &self,
        state: StateName,
        ctx: &RenderContext<'_>,
    ) -> Result<Vec<DaemonSet>, ManifestError>;
}

/// Reads manifests from a directory tree.
#[derive(Debug, Clone)]
pub struct ManifestDirSource {
    root: PathBuf,
}

impl ManifestDirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Subdirectories of the root that do not name a known state. Their
    /// manifests are never deployed. A missing root has none.
    pub fn unknown_state_dirs(&self) -> Result<Vec<String>, ManifestError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let io_error = |source| ManifestError::Io {
            path: self.root.clone(),
            source,
        };
        let mut unknown = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            if !entry.file_type().map_err(io_error)?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.parse::<StateName>().is_err() {
                unknown.push(name);
            }
        }
        unknown.sort();
        Ok(unknown)
    }
}

impl ManifestSource for ManifestDirSource {
    fn desired_daemonsets(
        &self,
        state: StateName,
        ctx: &RenderContext<'_>,
    ) -> Result<Vec<DaemonSet>, ManifestError> {
        let dir = self.root.join(state.as_str());
        if !dir.is_dir() {
            debug!("No manifests for {} at {}", state, dir.display());
            return Ok(Vec::new());
        }

        let mut daemonsets = Vec::new();
        for path in get_files_with_suffix(&dir, &[".yaml", ".yml", ".json"])? {
            for mut ds in parse_daemonsets(&path)? {
                render(&mut ds, state, ctx);
                daemonsets.push(ds);
            }
        }
        Ok(daemonsets)
    }
}

/// Files under `base_dir` (recursively) whose name ends with one of
/// `suffixes`, in path order.
pub fn get_files_with_suffix(base_dir: &Path, suffixes: &[&str]) -> Result<Vec<PathBuf>, ManifestError> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(base_dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if suffixes.iter().any(|s| name.ends_with(s)) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// DaemonSet documents of a (possibly multi-document) manifest file. Other
/// kinds are skipped.
fn parse_daemonsets(path: &Path) -> Result<Vec<DaemonSet>, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |source: serde_yaml::Error| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    };

    let mut daemonsets = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&content) {
        let value = serde_yaml::Value::deserialize(document).map_err(parse_error)?;
        if value.is_null() {
            continue;
        }
        let kind = value.get("kind").and_then(serde_yaml::Value::as_str);
        if kind != Some("DaemonSet") {
            debug!("Skipping {:?} document in {}", kind, path.display());
            continue;
        }
        daemonsets.push(serde_yaml::from_value(value).map_err(parse_error)?);
    }
    Ok(daemonsets)
}

fn set_env(container: &mut Container, name: &str, value: &str) {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|e| e.name == name) {
        Some(existing) => {
            existing.value = Some(value.to_string());
            existing.value_from = None;
        }
        None => env.push(EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }),
    }
}

fn render(ds: &mut DaemonSet, state: StateName, ctx: &RenderContext<'_>) {
    ds.metadata.namespace = Some(ctx.namespace.to_string());
    let labels = ds.metadata.labels.get_or_insert_with(Default::default);
    labels.insert(MANAGED_BY_LABEL_KEY.to_string(), MANAGED_BY_LABEL_VALUE.to_string());
    labels.insert(STATE_LABEL_KEY.to_string(), state.as_str().to_string());

    let Some(pod) = ds.spec.as_mut().and_then(|s| s.template.spec.as_mut()) else {
        return;
    };

    let image = ctx.component.and_then(ComponentSpec::image_path);
    if let (Some(image), Some(main)) = (image, pod.containers.first_mut()) {
        main.image = Some(image);
    }
    if let (Some(extra), Some(main)) = (
        ctx.component.and_then(|c| c.env.as_ref()),
        pod.containers.first_mut(),
    ) {
        for var in extra {
            set_env(main, &var.name, &var.value);
        }
    }

    let containers = pod
        .init_containers
        .iter_mut()
        .flatten()
        .chain(pod.containers.iter_mut());
    for container in containers {
        set_env(container, RUNTIME_ENV_VAR, ctx.runtime.as_str());
    }
}
