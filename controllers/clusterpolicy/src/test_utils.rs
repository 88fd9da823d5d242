//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test nodes, ClusterPolicies and
//! manifest trees.

#[cfg(test)]
use crate::labels::GPU_PCI_LABEL_KEYS;
#[cfg(test)]
use crate::node_classifier::NodeLabels;
#[cfg(test)]
use crds::ClusterPolicy;
#[cfg(test)]
use k8s_openapi::api::core::v1::{Node, NodeStatus, NodeSystemInfo};
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Builds a label map from key/value pairs
#[cfg(test)]
pub fn labels(pairs: &[(&str, &str)]) -> NodeLabels {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Helper to create a test Node reporting `runtime_version`
#[cfg(test)]
pub fn node_with_runtime(name: &str, node_labels: NodeLabels, runtime_version: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(node_labels),
            ..Default::default()
        },
        status: Some(NodeStatus {
            node_info: Some(NodeSystemInfo {
                container_runtime_version: runtime_version.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Helper to create a Node that NFD has discovered an NVIDIA GPU on
#[cfg(test)]
pub fn gpu_node(name: &str, runtime_version: &str) -> Node {
    node_with_runtime(name, labels(&[(GPU_PCI_LABEL_KEYS[0], "true")]), runtime_version)
}

/// Helper to create a test ClusterPolicy from its JSON spec
#[cfg(test)]
pub fn create_test_cluster_policy(
    name: &str,
    creation_timestamp: &str,
    spec: serde_json::Value,
) -> ClusterPolicy {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "nvidia.com/v1",
        "kind": "ClusterPolicy",
        "metadata": {
            "name": name,
            "creationTimestamp": creation_timestamp,
        },
        "spec": spec,
    }))
    .unwrap()
}

/// Writes a minimal DaemonSet manifest for `state` under `root`
#[cfg(test)]
pub fn write_daemonset_manifest(root: &std::path::Path, state: &str, ds_name: &str, image: &str) {
    let dir = root.join(state);
    std::fs::create_dir_all(&dir).unwrap();
    let manifest = format!(
        r#"apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: {ds_name}
spec:
  selector:
    matchLabels:
      app: {ds_name}
  template:
    metadata:
      labels:
        app: {ds_name}
    spec:
      containers:
        - name: {ds_name}
          image: {image}
"#
    );
    std::fs::write(dir.join("0500_daemonset.yaml"), manifest).unwrap();
}
