//! GPU Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed by the ClusterPolicy controller.

pub mod cluster_policy;

pub use cluster_policy::*;
