//! Host manager.
//!
//! Binds one HostClaim to one BareMetalHost:
//! 1. computes the namespaces the claim may draw hosts from (see `policy`)
//! 2. lists the hosts matching the claim's selector and drops the ones that
//!    cannot be bound
//! 3. picks one at random, preferring the claim's failure domain
//! 4. commits the binding: `spec.consumerRef` on the host first, then the
//!    `metal3.io/BareMetalHost` annotation on the claim
//!
//! A host whose consumer reference already names the claim is returned
//! before any other is considered, so a binding committed by an earlier,
//! partially failed reconcile is always picked up again.

use crate::conditions::{set_condition_false, set_condition_true, set_summary_condition};
use crate::error::ControllerError;
use crate::metrics;
use crate::requeue::{
    HOST_CLAIM_REQUEUE_DELAY, RequeueAfterError, hide_conflict_error, is_conflict_error,
    is_not_found_error, is_requeue_after_error,
};
use crate::selector::{build_selector, failure_domain_selector};
use crds::{
    ASSOCIATED_CONDITION, BARE_METAL_HOST_ANNOTATION, BARE_METAL_HOST_ASSOCIATED_REASON,
    BARE_METAL_HOST_NOT_SYNCHRONIZED_REASON, BareMetalHost, ConsumerReference,
    HOST_CLAIM_ANNOTATION_NOT_SET_REASON, HOST_CLAIM_DELETING_REASON,
    HOST_CLAIM_DELETION_FAILED_REASON, HOST_CLAIM_FINALIZER, HOST_CLAIM_KIND, HostClaim,
    METAL3_API_VERSION, METAL3_GROUP, NO_BARE_METAL_HOST_REASON, NODE_REUSE_LABEL,
    PAUSED_ANNOTATION, UNHEALTHY_ANNOTATION,
};
use kube::ResourceExt;
use metal_store::{HostStoreTrait, LabelSelector, StoreError};
use rand::Rng;
use rand::rngs::OsRng;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Held for the whole of [`HostManager::associate`]: within one process,
/// selection and commit of a host never interleave. Across replicas the
/// conditional host patch is what keeps a host bound to a single claim.
static ASSOCIATE_HOST_MUTEX: Mutex<()> = Mutex::const_new(());

/// Selection and binding of a BareMetalHost for one HostClaim.
pub struct HostManager {
    pub(crate) store: Arc<dyn HostStoreTrait>,
    pub(crate) host_claim: HostClaim,
    /// Claim as last read from or written to the store
    persisted: HostClaim,
    pub(crate) cancel: CancellationToken,
}

impl HostManager {
    /// Creates a manager for `host_claim`. Every store call is abandoned
    /// once `cancel` fires.
    pub fn new(store: Arc<dyn HostStoreTrait>, host_claim: HostClaim, cancel: CancellationToken) -> Self {
        Self {
            store,
            persisted: host_claim.clone(),
            host_claim,
            cancel,
        }
    }

    /// The claim, with any in-memory changes.
    pub fn host_claim(&self) -> &HostClaim {
        &self.host_claim
    }

    pub(crate) fn claim_namespace(&self) -> &str {
        self.host_claim.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub(crate) fn claim_name(&self) -> &str {
        self.host_claim.metadata.name.as_deref().unwrap_or_default()
    }

    pub(crate) fn claim_key(&self) -> String {
        format!("{}/{}", self.claim_namespace(), self.claim_name())
    }

    /// Run a store call, giving up when the manager is cancelled.
    pub(crate) async fn cancellable<T, F>(&self, what: &str, call: F) -> Result<T, ControllerError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ControllerError::Cancelled(what.to_string())),
            result = call => result.map_err(|e| ControllerError::from(e).context(what)),
        }
    }

    /// Consumer reference identifying this claim.
    pub fn consumer_ref(&self) -> ConsumerReference {
        ConsumerReference::new(
            METAL3_API_VERSION,
            HOST_CLAIM_KIND,
            self.claim_namespace(),
            self.claim_name(),
        )
    }

    /// True when the claim is bound: Associated is True and the bound host
    /// is recorded in the annotation.
    pub fn is_associated(&self) -> bool {
        self.host_claim
            .condition(ASSOCIATED_CONDITION)
            .is_some_and(|c| c.is_true())
            && self.host_claim.annotations().contains_key(BARE_METAL_HOST_ANNOTATION)
    }

    /// Adds the finalizer. Returns false when it was already present.
    pub fn ensure_finalizer(&mut self) -> bool {
        if self.host_claim.finalizers().iter().any(|f| f == HOST_CLAIM_FINALIZER) {
            return false;
        }
        self.host_claim.finalizers_mut().push(HOST_CLAIM_FINALIZER.to_string());
        true
    }

    fn remove_finalizer(&mut self) {
        self.host_claim.finalizers_mut().retain(|f| f != HOST_CLAIM_FINALIZER);
    }

    fn remove_host_annotation(&mut self) {
        if let Some(annotations) = self.host_claim.metadata.annotations.as_mut() {
            annotations.remove(BARE_METAL_HOST_ANNOTATION);
        }
    }

    /// Bind the claim to a host.
    ///
    /// Returns a [`RequeueAfterError`] when no host is available or when the
    /// host patch lost a race with another writer.
    pub async fn associate(&mut self) -> Result<(), ControllerError> {
        let result = self.associate_locked().await;
        metrics::record_associate(&result);
        result
    }

    async fn associate_locked(&mut self) -> Result<(), ControllerError> {
        let _guard = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                return Err(ControllerError::Cancelled(format!(
                    "waiting to associate HostClaim {}",
                    self.claim_key()
                )));
            }
            guard = ASSOCIATE_HOST_MUTEX.lock() => guard,
        };

        let claim_key = self.claim_key();
        info!(hostclaim = %claim_key, "Associating host");

        let mut host = match self.choose_host().await {
            Ok(Some(host)) => host,
            Ok(None) => {
                info!(hostclaim = %claim_key, "No available host found. Requeuing.");
                set_condition_false(
                    &mut self.host_claim,
                    ASSOCIATED_CONDITION,
                    NO_BARE_METAL_HOST_REASON,
                    "No available host found: requeuing.",
                );
                return Err(RequeueAfterError::new(HOST_CLAIM_REQUEUE_DELAY).into());
            }
            Err(e) => {
                if is_requeue_after_error(&e).is_none() {
                    set_condition_false(
                        &mut self.host_claim,
                        ASSOCIATED_CONDITION,
                        NO_BARE_METAL_HOST_REASON,
                        "Failed to pick a BaremetalHost for the Host",
                    );
                }
                return Err(e.context(format!("choosing host for HostClaim {}", claim_key)));
            }
        };

        let host_key = format!("{}/{}", host.namespace().unwrap_or_default(), host.name_any());
        info!(hostclaim = %claim_key, baremetalhost = %host_key, "Associating HostClaim with host");

        // First record the association on the host. On failure the whole
        // selection runs again on the next attempt.
        if consumer_ref_matches(host.spec.consumer_ref.as_ref(), &self.host_claim) {
            debug!(baremetalhost = %host_key, "Host already carries the consumerRef of this HostClaim");
        } else {
            host.spec.consumer_ref = Some(self.consumer_ref());
            let what = format!("setting consumerRef on BareMetalHost {}", host_key);
            if let Err(e) = self.cancellable(&what, self.store.patch_bare_metal_host(&host)).await {
                if is_conflict_error(&e) {
                    info!(baremetalhost = %host_key, "BareMetalHost changed while binding it, requeuing");
                } else {
                    error!(baremetalhost = %host_key, error = %e, "Error while patching the consumerRef on BareMetalHost");
                }
                self.remove_host_annotation();
                set_condition_false(
                    &mut self.host_claim,
                    ASSOCIATED_CONDITION,
                    BARE_METAL_HOST_NOT_SYNCHRONIZED_REASON,
                    "Failed to set consumer Reference on BareMetalHost",
                );
                return Err(hide_conflict_error(e));
            }
        }

        // Then record the commitment on the claim. The host stays bound if
        // this fails and is found again by the next selection.
        self.host_claim
            .annotations_mut()
            .insert(BARE_METAL_HOST_ANNOTATION.to_string(), host_key.clone());
        if let Err(e) = self.patch_host_claim().await {
            error!(hostclaim = %claim_key, baremetalhost = %host_key, error = %e, "Failed to annotate the HostClaim");
            set_condition_false(
                &mut self.host_claim,
                ASSOCIATED_CONDITION,
                HOST_CLAIM_ANNOTATION_NOT_SET_REASON,
                "Failed to annotate the hostclaim",
            );
            return Err(e.context(format!("annotating HostClaim {} with BareMetalHost {}", claim_key, host_key)));
        }

        set_condition_true(&mut self.host_claim, ASSOCIATED_CONDITION, BARE_METAL_HOST_ASSOCIATED_REASON);
        info!(hostclaim = %claim_key, baremetalhost = %host_key, "HostClaim associated");
        Ok(())
    }

    /// Find a host for the claim.
    ///
    /// `Ok(None)` means no host can be bound right now: no namespace is
    /// reachable or no candidate survived filtering.
    pub async fn choose_host(&self) -> Result<Option<BareMetalHost>, ControllerError> {
        let namespaces = self
            .acceptable_namespaces(&self.host_claim.spec.host_selector.in_namespace)
            .await?;
        if namespaces.is_empty() {
            info!(hostclaim = %self.claim_key(), "No namespace with a HostDeployPolicy accepting the HostClaim");
            return Ok(None);
        }

        let selector = build_selector(&self.host_claim.spec.host_selector)?;

        let mut available = Vec::new();
        for namespace in &namespaces {
            debug!(namespace = %namespace, selector = %selector, "Testing in namespace");
            let what = format!("listing BareMetalHosts in {}", namespace);
            let hosts = self
                .cancellable(&what, self.store.list_bare_metal_hosts(namespace, &selector))
                .await?;
            for host in hosts {
                if consumer_ref_matches(host.spec.consumer_ref.as_ref(), &self.host_claim) {
                    info!(baremetalhost = %host.name_any(), namespace = %namespace, "Found host with existing ConsumerRef");
                    return Ok(Some(host));
                }
                if let Some(reason) = host_disqualification(&host) {
                    debug!(baremetalhost = %host.name_any(), namespace = %namespace, reason, "Skipping host");
                    continue;
                }
                debug!(baremetalhost = %host.name_any(), namespace = %namespace, "Host matched hostSelector, adding it to available hosts");
                available.push(host);
            }
        }

        info!(hostcount = available.len(), "Host count available while choosing host for HostClaim");
        self.pick_host(available)
    }

    /// Pick one of `available` uniformly at random. When the claim names a
    /// failure domain and some hosts are labeled with it, only those are
    /// considered.
    pub fn pick_host(&self, available: Vec<BareMetalHost>) -> Result<Option<BareMetalHost>, ControllerError> {
        let failure_domain = self.host_claim.spec.failure_domain.as_str();
        let mut pool = available;

        if !failure_domain.is_empty() {
            let in_domain = failure_domain_selector(failure_domain)?;
            let (preferred, others): (Vec<_>, Vec<_>) =
                pool.into_iter().partition(|host| in_domain.matches(host.labels()));
            pool = if preferred.is_empty() {
                info!(failure_domain, "No available hosts in FailureDomain, choosing from other available hosts");
                others
            } else {
                preferred
            };
        }

        if pool.is_empty() {
            return Ok(None);
        }
        let index = OsRng.gen_range(0..pool.len());
        Ok(Some(pool.swap_remove(index)))
    }

    /// Refresh the Ready summary and persist the claim when its annotations,
    /// finalizers or conditions changed.
    pub async fn patch_host_claim(&mut self) -> Result<(), ControllerError> {
        set_summary_condition(&mut self.host_claim);

        if self.host_claim.annotations() == self.persisted.annotations()
            && self.host_claim.finalizers() == self.persisted.finalizers()
            && self.host_claim.conditions() == self.persisted.conditions()
        {
            debug!(hostclaim = %self.claim_key(), "HostClaim unchanged, skipping patch");
            return Ok(());
        }

        let what = format!("patching HostClaim {}", self.claim_key());
        let patched = self
            .cancellable(&what, self.store.patch_host_claim(&self.host_claim))
            .await?;
        self.persisted = patched.clone();
        self.host_claim = patched;
        Ok(())
    }

    /// Release the bound host of a deleted claim, then drop the annotation
    /// and the finalizer.
    pub async fn release(&mut self) -> Result<(), ControllerError> {
        let claim_key = self.claim_key();
        info!(hostclaim = %claim_key, "Releasing host");

        if let Some(mut host) = self.bound_host().await? {
            let host_key = format!("{}/{}", host.namespace().unwrap_or_default(), host.name_any());
            host.spec.consumer_ref = None;
            let what = format!("clearing consumerRef on BareMetalHost {}", host_key);
            if let Err(e) = self.cancellable(&what, self.store.patch_bare_metal_host(&host)).await {
                if !is_conflict_error(&e) {
                    error!(baremetalhost = %host_key, error = %e, "Failed to release BareMetalHost");
                }
                set_condition_false(
                    &mut self.host_claim,
                    ASSOCIATED_CONDITION,
                    HOST_CLAIM_DELETION_FAILED_REASON,
                    "Failed to release the BareMetalHost",
                );
                return Err(hide_conflict_error(e));
            }
            info!(hostclaim = %claim_key, baremetalhost = %host_key, "Released BareMetalHost");
        }

        self.remove_host_annotation();
        self.remove_finalizer();
        set_condition_false(
            &mut self.host_claim,
            ASSOCIATED_CONDITION,
            HOST_CLAIM_DELETING_REASON,
            "HostClaim is being deleted",
        );
        self.patch_host_claim()
            .await
            .map_err(|e| e.context(format!("removing finalizer from HostClaim {}", claim_key)))
    }

    /// The host bound to this claim, if any.
    ///
    /// The annotation is trusted when present. Without it the reachable
    /// namespaces are searched for a host whose consumer reference names
    /// the claim.
    async fn bound_host(&self) -> Result<Option<BareMetalHost>, ControllerError> {
        let annotated = self
            .host_claim
            .annotations()
            .get(BARE_METAL_HOST_ANNOTATION)
            .and_then(|value| value.split_once('/'));

        if let Some((namespace, name)) = annotated {
            let what = format!("reading BareMetalHost {}/{}", namespace, name);
            return match self.cancellable(&what, self.store.get_bare_metal_host(namespace, name)).await {
                Ok(host) if consumer_ref_matches(host.spec.consumer_ref.as_ref(), &self.host_claim) => {
                    Ok(Some(host))
                }
                Ok(_) => {
                    info!(baremetalhost = %name, namespace = %namespace, "BareMetalHost is not bound to this HostClaim, leaving it untouched");
                    Ok(None)
                }
                Err(e) if is_not_found_error(&e) => {
                    info!(baremetalhost = %name, namespace = %namespace, "BareMetalHost already gone");
                    Ok(None)
                }
                Err(e) => Err(e),
            };
        }

        let namespaces = self
            .acceptable_namespaces(&self.host_claim.spec.host_selector.in_namespace)
            .await?;
        let everything = LabelSelector::everything();
        for namespace in &namespaces {
            let what = format!("listing BareMetalHosts in {}", namespace);
            let hosts = self
                .cancellable(&what, self.store.list_bare_metal_hosts(namespace, &everything))
                .await?;
            if let Some(host) = hosts
                .into_iter()
                .find(|host| consumer_ref_matches(host.spec.consumer_ref.as_ref(), &self.host_claim))
            {
                return Ok(Some(host));
            }
        }
        Ok(None)
    }
}

/// True when `consumer` identifies `claim`: same kind, API group, namespace
/// and name.
pub fn consumer_ref_matches(consumer: Option<&ConsumerReference>, claim: &HostClaim) -> bool {
    let Some(consumer) = consumer else {
        return false;
    };
    Some(consumer.name.as_str()) == claim.metadata.name.as_deref()
        && Some(consumer.namespace.as_str()) == claim.metadata.namespace.as_deref()
        && consumer.kind == HOST_CLAIM_KIND
        && consumer.group() == METAL3_GROUP
}

/// Why `host` cannot be bound, or `None` when it is a candidate.
pub fn host_disqualification(host: &BareMetalHost) -> Option<&'static str> {
    // Node reuse is not handled for HostClaims, but reservations made by
    // others are honored.
    if host.spec.consumer_ref.is_some() {
        return Some("consumed by another object");
    }
    if host.labels().contains_key(NODE_REUSE_LABEL) {
        return Some("reserved for node reuse");
    }
    if host.metadata.deletion_timestamp.is_some() {
        return Some("being deleted");
    }
    if !host.error_message().is_empty() {
        return Some("in error");
    }
    if host.annotations().contains_key(PAUSED_ANNOTATION) {
        return Some("paused");
    }
    if host.annotations().contains_key(UNHEALTHY_ANNOTATION) {
        return Some("unhealthy");
    }
    if !host.provisioning_state().is_assignable() {
        return Some("not ready or available");
    }
    None
}

/// True when reconciliation of the claim is paused.
pub fn is_paused(claim: &HostClaim) -> bool {
    claim.annotations().contains_key(PAUSED_ANNOTATION)
}
