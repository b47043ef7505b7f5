//! HostClaim Controller
//!
//! Binds each `HostClaim` to exactly one `BareMetalHost`. Candidate hosts
//! are found through the claim's label selector, in the namespaces whose
//! `HostDeployPolicy` accepts the claim's namespace, and the binding is
//! committed with an optimistic-concurrency write of the host's
//! `consumerRef`.

mod backoff;
mod conditions;
mod config;
mod controller;
mod error;
mod manager;
mod metrics;
mod policy;
mod reconciler;
mod requeue;
mod selector;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::{ControllerConfig, LogFormat};
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .compact()
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ControllerConfig::from_env()?;
    init_tracing(config.log_format);

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install the rustls ring crypto provider"))?;

    info!("Starting HostClaim Controller");
    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Metrics address: {}", config.metrics_bind_address);
    info!("  Reconcile concurrency: {}", config.reconcile_concurrency);

    let controller = Controller::new(&config).await?;
    controller.run().await?;

    Ok(())
}
