//! HostStoreTrait for mocking
//!
//! This trait abstracts the object store to enable mocking in unit tests.
//! [`crate::KubeHostStore`] implements it against the Kubernetes API server,
//! and tests use [`crate::MockHostStore`].

use crate::error::StoreError;
use crate::selector::LabelSelector;
use crds::{BareMetalHost, HostClaim, HostDeployPolicy};
use std::collections::BTreeMap;

/// Trait for HostClaim binding store operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait HostStoreTrait: Send + Sync {
    /// Labels of a namespace. A namespace without labels yields an empty map.
    async fn get_namespace_labels(&self, namespace: &str) -> Result<BTreeMap<String, String>, StoreError>;

    /// List deploy policies in one namespace, or in every namespace when `None`.
    async fn list_host_deploy_policies(&self, namespace: Option<&str>) -> Result<Vec<HostDeployPolicy>, StoreError>;

    /// List the hosts of a namespace whose labels match `selector`.
    async fn list_bare_metal_hosts(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<BareMetalHost>, StoreError>;

    /// Get a single host.
    async fn get_bare_metal_host(&self, namespace: &str, name: &str) -> Result<BareMetalHost, StoreError>;

    /// Write `spec.consumerRef` of `host`, conditional on its
    /// `metadata.resourceVersion`. Returns the stored host.
    ///
    /// A stale version fails with [`StoreError::Conflict`].
    async fn patch_bare_metal_host(&self, host: &BareMetalHost) -> Result<BareMetalHost, StoreError>;

    /// Get a single claim.
    async fn get_host_claim(&self, namespace: &str, name: &str) -> Result<HostClaim, StoreError>;

    /// Persist the annotations, finalizers and status of `claim`.
    /// Returns the stored claim.
    async fn patch_host_claim(&self, claim: &HostClaim) -> Result<HostClaim, StoreError>;
}
