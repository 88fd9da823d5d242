//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! client, the manifest tree and the reconciler together and runs the
//! ClusterPolicy watcher.

use crate::cluster_client::KubeClusterClient;
use crate::config::Settings;
use crate::error::ControllerError;
use crate::manifests::ManifestDirSource;
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use crds::ClusterPolicy;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Main controller for ClusterPolicy reconciliation.
#[derive(Debug)]
pub struct Controller {
    cluster_policy_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its watcher.
    pub async fn new(settings: Settings) -> Result<Self, ControllerError> {
        info!("Initializing ClusterPolicy Controller");

        let kube_client = Client::try_default().await?;

        if !settings.manifests_dir.is_dir() {
            warn!(
                "Manifest directory {} does not exist, no operands will be deployed",
                settings.manifests_dir.display()
            );
        }
        let manifests = ManifestDirSource::new(&settings.manifests_dir);
        for dir in manifests.unknown_state_dirs()? {
            warn!("Manifest directory {} does not name a known state, ignoring it", dir);
        }

        let reconciler = Arc::new(Reconciler::new(
            KubeClusterClient::new(kube_client.clone()),
            manifests,
            settings.namespace.clone(),
        ));

        let cluster_policy_api: Api<ClusterPolicy> = Api::all(kube_client.clone());
        let node_api: Api<Node> = Api::all(kube_client);
        let watcher = Watcher::new(
            reconciler,
            cluster_policy_api,
            node_api,
            settings.reconcile_interval,
        );

        let cluster_policy_watcher =
            tokio::spawn(async move { watcher.watch_cluster_policies().await });

        Ok(Self {
            cluster_policy_watcher,
        })
    }

    /// Runs until the watcher stops.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("ClusterPolicy Controller running");
        self.cluster_policy_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("ClusterPolicy watcher panicked: {}", e)))?
    }
}
