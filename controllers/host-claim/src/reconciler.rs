//! HostClaim reconciliation.
//!
//! One pass over a claim:
//! - paused claims are left alone
//! - deleting claims release their host and drop the finalizer
//! - otherwise the finalizer is ensured and, unless the claim is already
//!   bound, a host is associated
//!
//! The claim is patched at the end of every pass, successful or not, so the
//! conditions written along the way are never lost.

use crate::backoff::BackoffState;
use crate::error::ControllerError;
use crate::manager::{HostManager, is_paused};
use crate::metrics;
use crate::requeue::{AggregateError, is_requeue_after_error};
use crds::{HOST_CLAIM_FINALIZER, HostClaim};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use metal_store::HostStoreTrait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reconciles HostClaims against the BareMetalHost inventory.
pub struct Reconciler {
    pub(crate) store: Arc<dyn HostStoreTrait>,
    pub(crate) cancel: CancellationToken,
    /// Error count tracking per claim (namespace/name -> BackoffState).
    /// Only claims currently failing have an entry.
    pub(crate) backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

fn claim_key(claim: &HostClaim) -> String {
    format!("{}/{}", claim.namespace().unwrap_or_default(), claim.name_any())
}

impl Reconciler {
    /// Creates a new reconciler. In-flight store calls are abandoned once
    /// `cancel` fires.
    pub fn new(store: Arc<dyn HostStoreTrait>, cancel: CancellationToken) -> Self {
        Self {
            store,
            cancel,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reconcile one HostClaim.
    pub async fn reconcile_host_claim(&self, claim: &HostClaim) -> Result<Action, ControllerError> {
        let key = claim_key(claim);
        let started = Instant::now();

        let result = self.reconcile(claim).await;

        metrics::record_reconcile(metrics::outcome(&result), started.elapsed());
        if result.is_ok() {
            self.reset_error(&key);
        }
        result
    }

    async fn reconcile(&self, claim: &HostClaim) -> Result<Action, ControllerError> {
        let key = claim_key(claim);

        if is_paused(claim) {
            info!(hostclaim = %key, "HostClaim is paused, skipping reconciliation");
            return Ok(Action::await_change());
        }

        let mut manager = HostManager::new(self.store.clone(), claim.clone(), self.cancel.clone());

        if claim.metadata.deletion_timestamp.is_some() {
            if !claim.finalizers().iter().any(|f| f == HOST_CLAIM_FINALIZER) {
                debug!(hostclaim = %key, "HostClaim deleting without our finalizer, nothing to do");
                return Ok(Action::await_change());
            }
            manager.release().await?;
            info!(hostclaim = %key, "HostClaim released");
            return Ok(Action::await_change());
        }

        if manager.ensure_finalizer() {
            debug!(hostclaim = %key, "Adding finalizer to HostClaim");
            manager.patch_host_claim().await?;
        }

        let associated = if manager.is_associated() {
            debug!(hostclaim = %key, "HostClaim already associated");
            Ok(())
        } else {
            manager.associate().await
        };
        let patched = manager.patch_host_claim().await;

        match (associated, patched) {
            (Ok(()), Ok(())) => Ok(Action::await_change()),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(associate_err), Err(patch_err)) => {
                let errors: Vec<Box<dyn std::error::Error + Send + Sync>> =
                    vec![Box::new(associate_err), Box::new(patch_err)];
                Err(AggregateError::new(errors).into())
            }
        }
    }

    /// Requeue decision for a failed reconciliation.
    ///
    /// Requeue requests are honored as-is (a zero delay retries at once).
    /// Cancellations wait for the next change. Any other error backs off
    /// along the Fibonacci sequence.
    pub fn error_action(&self, claim: &HostClaim, err: &ControllerError) -> Action {
        let key = claim_key(claim);

        if let Some(delay) = is_requeue_after_error(err) {
            if delay.is_zero() {
                debug!(hostclaim = %key, reason = %err, "Requeuing HostClaim immediately");
            } else {
                info!(hostclaim = %key, delay = ?delay, reason = %err, "Requeuing HostClaim");
            }
            return Action::requeue(delay);
        }

        if err.is_cancelled() {
            debug!(hostclaim = %key, "Reconciliation cancelled");
            return Action::await_change();
        }

        self.increment_error(&key);
        let (backoff, error_count) = self.get_backoff_for_resource(&key);
        error!(
            hostclaim = %key,
            error = %err,
            error_count,
            backoff_seconds = backoff.as_secs(),
            "Failed to reconcile HostClaim"
        );
        Action::requeue(backoff)
    }

    /// Get the Fibonacci backoff duration for a claim based on its error count
    ///
    /// Returns (backoff, error_count)
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (Duration::from_secs(60), 0)
            }
        }
    }

    /// Increment error count for a claim
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new)
                .increment_error();
        }
    }

    /// Forget the error history of a claim (on successful reconciliation).
    /// The next failure starts again from the minimum backoff.
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}
