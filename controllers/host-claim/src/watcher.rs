//! Kubernetes resource watchers.
//!
//! HostClaims are reconciled through `kube_runtime::Controller`, which
//! handles reconnection, deduplication and per-object serialization. Hosts
//! are watched as well: a change to a BareMetalHost bound to a HostClaim
//! triggers that claim.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::requeue::is_requeue_after_error;
use crds::{BareMetalHost, HOST_CLAIM_KIND, HostClaim, METAL3_GROUP};
use futures::StreamExt;
use kube::Api;
use kube_runtime::{
    Controller,
    controller::{self, Action, Config as ControllerConfig},
    reflector::ObjectRef,
    watcher,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Claim bound to `host`, if its consumer reference names a HostClaim.
pub fn claim_for_host(host: &BareMetalHost) -> Option<ObjectRef<HostClaim>> {
    let consumer = host.spec.consumer_ref.as_ref()?;
    if consumer.kind != HOST_CLAIM_KIND || consumer.group() != METAL3_GROUP || consumer.name.is_empty() {
        return None;
    }
    Some(ObjectRef::new(&consumer.name).within(&consumer.namespace))
}

/// True for reconcile failures that are requeue requests or cancellations.
/// `error_action` already logged them at the right level.
fn is_expected_failure(err: &controller::Error<ControllerError, watcher::Error>) -> bool {
    match err {
        controller::Error::ReconcilerFailed(e, _) => is_requeue_after_error(e).is_some() || e.is_cancelled(),
        _ => false,
    }
}

/// Watch HostClaims (and the hosts bound to them) until `shutdown` fires.
pub async fn watch_host_claims(
    claims: Api<HostClaim>,
    hosts: Api<BareMetalHost>,
    reconciler: Arc<Reconciler>,
    concurrency: u16,
    shutdown: CancellationToken,
) -> Result<(), ControllerError> {
    info!("Starting HostClaim watcher");

    let error_policy = |claim: Arc<HostClaim>, error: &ControllerError, ctx: Arc<Reconciler>| -> Action {
        ctx.error_action(&claim, error)
    };

    let reconcile = |claim: Arc<HostClaim>, ctx: Arc<Reconciler>| async move {
        debug!(namespace = ?claim.metadata.namespace, name = ?claim.metadata.name, "Reconciling HostClaim");
        ctx.reconcile_host_claim(&claim).await
    };

    // Debounce batches the status writes of one pass into one event.
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(1))
        .concurrency(concurrency);

    let controller = Controller::new(claims, watcher::Config::default())
        .watches(hosts, watcher::Config::default(), |host| claim_for_host(&host))
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((claim, _)) => debug!(hostclaim = %claim, "Reconciled HostClaim"),
                Err(e) if is_expected_failure(&e) => debug!(reason = %e, "HostClaim requeued"),
                Err(e) => error!("Controller error for HostClaim: {}", e),
            }
        });

    tokio::select! {
        () = controller => {
            return Err(ControllerError::Watch("HostClaim controller stream ended".to_string()));
        }
        () = shutdown.cancelled() => {
            info!("HostClaim watcher stopping");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requeue::{CONFLICT_REQUEUE_DELAY, HOST_CLAIM_REQUEUE_DELAY, RequeueAfterError};
    use crate::test_utils::{create_available_host, create_test_host_claim, host_claim_ref};
    use crds::ConsumerReference;

    fn reconcile_failure(err: ControllerError) -> controller::Error<ControllerError, watcher::Error> {
        let claim = create_test_host_claim("tenant", "web-1");
        controller::Error::ReconcilerFailed(err, ObjectRef::from_obj(&claim).erase())
    }

    #[test]
    fn test_requeues_and_cancellations_are_expected() {
        let no_host = ControllerError::from(RequeueAfterError::new(HOST_CLAIM_REQUEUE_DELAY))
            .context("choosing host for HostClaim tenant/web-1");
        let conflict = ControllerError::from(RequeueAfterError::new(CONFLICT_REQUEUE_DELAY));
        let cancelled = ControllerError::Cancelled("listing HostDeployPolicies".to_string()).context("choosing host");

        assert!(is_expected_failure(&reconcile_failure(no_host)));
        assert!(is_expected_failure(&reconcile_failure(conflict)));
        assert!(is_expected_failure(&reconcile_failure(cancelled)));
    }

    #[test]
    fn test_hard_failures_are_not_expected() {
        let hard = ControllerError::InvalidConfig("broken".to_string()).context("reconciling");
        assert!(!is_expected_failure(&reconcile_failure(hard)));

        let claim = create_test_host_claim("tenant", "web-1");
        let missing = controller::Error::ObjectNotFound(ObjectRef::from_obj(&claim).erase());
        assert!(!is_expected_failure(&missing));
    }

    #[test]
    fn test_bound_host_maps_to_its_claim() {
        let mut host = create_available_host("pool", "h1", &[]);
        host.spec.consumer_ref = Some(host_claim_ref("tenant", "claim-1"));

        let claim = claim_for_host(&host).unwrap();
        assert_eq!(claim.name, "claim-1");
        assert_eq!(claim.namespace.as_deref(), Some("tenant"));
    }

    #[test]
    fn test_unbound_or_foreign_host_maps_to_nothing() {
        let host = create_available_host("pool", "h1", &[]);
        assert!(claim_for_host(&host).is_none());

        let mut machine = create_available_host("pool", "h2", &[]);
        machine.spec.consumer_ref = Some(ConsumerReference::new(
            "infrastructure.cluster.x-k8s.io/v1beta1",
            "Metal3Machine",
            "tenant",
            "m-1",
        ));
        assert!(claim_for_host(&machine).is_none());
    }
}
