//! Main controller implementation.
//!
//! Wires the Kubernetes client, the store, the reconciler and the metrics
//! server together, then runs until a shutdown signal or until one of the
//! background tasks exits.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics;
use crate::reconciler::Reconciler;
use crate::watcher::watch_host_claims;
use crds::{BareMetalHost, HostClaim};
use kube::{Api, Client};
use metal_store::{HostStoreTrait, KubeHostStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Main controller for HostClaim binding.
pub struct Controller {
    host_claim_watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
    shutdown: CancellationToken,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: &ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing HostClaim Controller");

        let kube_client = Client::try_default().await?;

        let claims: Api<HostClaim> = match config.watch_namespace.as_deref() {
            Some(namespace) => Api::namespaced(kube_client.clone(), namespace),
            None => Api::all(kube_client.clone()),
        };
        // Hosts may live in any namespace a HostDeployPolicy opens up.
        let hosts: Api<BareMetalHost> = Api::all(kube_client.clone());

        let shutdown = CancellationToken::new();
        let store: Arc<dyn HostStoreTrait> = Arc::new(KubeHostStore::new(kube_client));
        let reconciler = Arc::new(Reconciler::new(store, shutdown.child_token()));

        let host_claim_watcher = {
            let shutdown = shutdown.clone();
            let concurrency = config.reconcile_concurrency;
            tokio::spawn(async move {
                watch_host_claims(claims, hosts, reconciler, concurrency, shutdown).await
            })
        };

        let metrics_server = {
            let shutdown = shutdown.clone();
            let addr = config.metrics_bind_address;
            tokio::spawn(async move { metrics::serve(addr, shutdown).await })
        };

        Ok(Self {
            host_claim_watcher,
            metrics_server,
            shutdown,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("HostClaim Controller running");

        tokio::select! {
            result = &mut self.host_claim_watcher => {
                self.shutdown.cancel();
                result.map_err(|e| ControllerError::Watch(format!("HostClaim watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("HostClaim watcher error: {}", e)))?;
            }
            result = &mut self.metrics_server => {
                self.shutdown.cancel();
                result.map_err(|e| ControllerError::Watch(format!("Metrics server panicked: {}", e)))??;
            }
            signal = shutdown_signal() => {
                signal?;
                info!("Shutdown signal received, stopping HostClaim Controller");
                self.shutdown.cancel();
                for (name, task) in [("HostClaim watcher", self.host_claim_watcher), ("metrics server", self.metrics_server)] {
                    match task.await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!("{} exited with error: {}", name, e),
                        Err(e) => error!("{} panicked: {}", name, e),
                    }
                }
            }
        }

        info!("HostClaim Controller stopped");
        Ok(())
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<(), ControllerError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<(), ControllerError> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
