//! ClusterPolicy Controller
//!
//! Reconciles the cluster-wide ClusterPolicy of the GPU operator:
//! - labels GPU nodes with the deploy labels their workload config calls for
//! - applies the DaemonSets of enabled states, skipping unchanged ones
//! - removes the DaemonSets of disabled states
//! - reports the outcome on the ClusterPolicy status

mod backoff;
mod cluster_client;
mod config;
mod controller;
mod error;
mod labels;
mod manifests;
mod node_classifier;
mod node_labels;
mod reconciler;
mod state;
mod test_utils;
mod watcher;
mod workload;

use crate::config::Settings;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // Configure rustls crypto provider (use ring)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| {
            ControllerError::InvalidConfig("failed to install the rustls ring crypto provider".to_string())
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting ClusterPolicy Controller");

    let settings = Settings::from_env()?;

    info!("Configuration:");
    info!("  Operator namespace: {}", settings.namespace);
    info!("  Manifests: {}", settings.manifests_dir.display());
    info!("  Reconcile interval: {:?}", settings.reconcile_interval);

    let controller = Controller::new(settings).await?;
    controller.run().await?;

    Ok(())
}
