//! Controller-specific error types.
//!
//! This module defines error types specific to the ClusterPolicy controller
//! that are not covered by upstream library errors.

use kube::Error as KubeError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the ClusterPolicy controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// ClusterPolicy or node configuration rejected
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Operand manifests could not be loaded
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Desired object could not be fingerprinted
    #[error("Fingerprint error: {0}")]
    Hash(#[from] object_hash::HashError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// Rejected ClusterPolicy or node settings. Reconciliation of the affected
/// object stops for the current pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("the NRI Plugin cannot be enabled when CDI is disabled")]
    NriPluginWithoutCdi,

    /// Workload config string outside the known set
    #[error("invalid workload config {value:?} from {source_name}")]
    InvalidWorkloadConfig {
        /// Offending value
        value: String,
        /// Where the value came from (node label or ClusterPolicy field)
        source_name: String,
    },
}

/// Failures reading operand manifests from disk.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to walk manifest directory: {0}")]
    Walk(#[from] walkdir::Error),
}
