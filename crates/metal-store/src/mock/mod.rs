//! Mock HostStore for unit testing
//!
//! Keeps namespaces, policies, hosts and claims in memory. Every stored
//! object gets a `resourceVersion` from a shared counter, and host patches
//! are checked against it the way the API server does, so optimistic
//! concurrency can be exercised without a cluster.
//!
//! Faults can be queued per operation with [`MockHostStore::fail_next`] to
//! simulate API errors, a racing writer or a hung request.

use crate::error::StoreError;
use crate::selector::LabelSelector;
use crate::store_trait::HostStoreTrait;
use crds::{BareMetalHost, ConsumerReference, HostClaim, HostDeployPolicy};
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

type Key = (String, String);

/// Store operation a fault can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    GetNamespaceLabels,
    ListHostDeployPolicies,
    ListBareMetalHosts,
    GetBareMetalHost,
    PatchBareMetalHost,
    GetHostClaim,
    PatchHostClaim,
}

/// Injected failure, consumed by the next call of its operation
#[derive(Debug, Clone)]
pub enum MockFault {
    /// Fail with a 409 conflict
    Conflict,
    /// Fail with a 404
    NotFound,
    /// Fail with a 503 from the API server
    Unavailable,
    /// Another writer binds the host to `ConsumerReference` just before
    /// this patch lands, so the patch carries a stale version
    ConcurrentBind(ConsumerReference),
    /// Never complete
    Hang,
}

/// Mock HostStore for testing
#[derive(Clone, Default)]
pub struct MockHostStore {
    pub(crate) namespaces: Arc<Mutex<HashMap<String, BTreeMap<String, String>>>>,
    pub(crate) policies: Arc<Mutex<HashMap<Key, HostDeployPolicy>>>,
    pub(crate) hosts: Arc<Mutex<HashMap<Key, BareMetalHost>>>,
    pub(crate) claims: Arc<Mutex<HashMap<Key, HostClaim>>>,
    pub(crate) faults: Arc<Mutex<HashMap<MockOperation, VecDeque<MockFault>>>>,
    pub(crate) host_patches: Arc<Mutex<usize>>,
    pub(crate) claim_patches: Arc<Mutex<usize>>,
    // Counter for generating resource versions
    pub(crate) next_version: Arc<Mutex<u64>>,
}

fn key_of<K: ResourceExt>(object: &K) -> Key {
    (object.namespace().unwrap_or_default(), object.name_any())
}

impl MockHostStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_version(&self) -> String {
        let mut next = self.next_version.lock().unwrap();
        *next += 1;
        next.to_string()
    }

    /// Add (or replace) a namespace with its labels
    pub fn add_namespace(&self, name: &str, labels: &[(&str, &str)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.namespaces.lock().unwrap().insert(name.to_string(), labels);
    }

    /// Add (or replace) a deploy policy
    pub fn add_policy(&self, mut policy: HostDeployPolicy) {
        policy.metadata.resource_version = Some(self.bump_version());
        self.policies.lock().unwrap().insert(key_of(&policy), policy);
    }

    /// Add (or replace) a host, assigning a fresh resourceVersion
    pub fn add_host(&self, mut host: BareMetalHost) {
        host.metadata.resource_version = Some(self.bump_version());
        self.hosts.lock().unwrap().insert(key_of(&host), host);
    }

    /// Add (or replace) a claim, assigning a fresh resourceVersion
    pub fn add_claim(&self, mut claim: HostClaim) {
        claim.metadata.resource_version = Some(self.bump_version());
        self.claims.lock().unwrap().insert(key_of(&claim), claim);
    }

    /// Snapshot of a stored host
    pub fn host(&self, namespace: &str, name: &str) -> Option<BareMetalHost> {
        self.hosts
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Snapshot of a stored claim
    pub fn claim(&self, namespace: &str, name: &str) -> Option<HostClaim> {
        self.claims
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Bump a host's resourceVersion as if another writer touched it.
    pub fn touch_host(&self, namespace: &str, name: &str) {
        let version = self.bump_version();
        if let Some(host) = self
            .hosts
            .lock()
            .unwrap()
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            host.metadata.resource_version = Some(version);
        }
    }

    /// Queue a fault for the next call of `operation`
    pub fn fail_next(&self, operation: MockOperation, fault: MockFault) {
        self.faults
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(fault);
    }

    /// Number of successful host patches
    pub fn host_patch_count(&self) -> usize {
        *self.host_patches.lock().unwrap()
    }

    /// Number of successful claim patches
    pub fn claim_patch_count(&self) -> usize {
        *self.claim_patches.lock().unwrap()
    }

    fn take_fault(&self, operation: MockOperation) -> Option<MockFault> {
        self.faults
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
    }

    /// Apply the queued fault of `operation`, if any.
    async fn inject(&self, operation: MockOperation, what: &str, target: Option<&Key>) -> Result<(), StoreError> {
        let Some(fault) = self.take_fault(operation) else {
            return Ok(());
        };
        match fault {
            MockFault::Conflict => Err(StoreError::Conflict(format!(
                "{}: the object has been modified; please apply your changes to the latest version and try again",
                what
            ))),
            MockFault::NotFound => Err(StoreError::NotFound(what.to_string())),
            MockFault::Unavailable => Err(StoreError::Kube(kube::Error::Api(
                kube::error::ErrorResponse {
                    status: "Failure".to_string(),
                    message: format!("{}: service unavailable", what),
                    reason: "ServiceUnavailable".to_string(),
                    code: 503,
                },
            ))),
            MockFault::ConcurrentBind(consumer) => {
                let version = self.bump_version();
                if let Some(key) = target {
                    if let Some(host) = self.hosts.lock().unwrap().get_mut(key) {
                        host.spec.consumer_ref = Some(consumer);
                        host.metadata.resource_version = Some(version);
                    }
                }
                Ok(())
            }
            MockFault::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl HostStoreTrait for MockHostStore {
    async fn get_namespace_labels(&self, namespace: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let what = format!("get Namespace {}", namespace);
        self.inject(MockOperation::GetNamespaceLabels, &what, None).await?;
        self.namespaces
            .lock()
            .unwrap()
            .get(namespace)
            .cloned()
            .ok_or(StoreError::NotFound(what))
    }

    async fn list_host_deploy_policies(&self, namespace: Option<&str>) -> Result<Vec<HostDeployPolicy>, StoreError> {
        self.inject(MockOperation::ListHostDeployPolicies, "list HostDeployPolicy", None)
            .await?;
        let mut policies: Vec<HostDeployPolicy> = self
            .policies
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns))
            .map(|(_, policy)| policy.clone())
            .collect();
        policies.sort_by_key(key_of);
        Ok(policies)
    }

    async fn list_bare_metal_hosts(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<BareMetalHost>, StoreError> {
        let what = format!("list BareMetalHost in {}", namespace);
        self.inject(MockOperation::ListBareMetalHosts, &what, None).await?;
        let mut hosts: Vec<BareMetalHost> = self
            .hosts
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), host)| ns == namespace && selector.matches(host.labels()))
            .map(|(_, host)| host.clone())
            .collect();
        hosts.sort_by_key(key_of);
        Ok(hosts)
    }

    async fn get_bare_metal_host(&self, namespace: &str, name: &str) -> Result<BareMetalHost, StoreError> {
        let what = format!("get BareMetalHost {}/{}", namespace, name);
        self.inject(MockOperation::GetBareMetalHost, &what, None).await?;
        self.host(namespace, name).ok_or(StoreError::NotFound(what))
    }

    async fn patch_bare_metal_host(&self, host: &BareMetalHost) -> Result<BareMetalHost, StoreError> {
        let key = key_of(host);
        let what = format!("patch BareMetalHost {}/{}", key.0, key.1);
        self.inject(MockOperation::PatchBareMetalHost, &what, Some(&key)).await?;

        let expected = host.resource_version().ok_or_else(|| {
            StoreError::InvalidObject(format!("{}: missing metadata.resourceVersion", what))
        })?;
        let version = self.bump_version();
        let mut hosts = self.hosts.lock().unwrap();
        let stored = hosts
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(what.clone()))?;
        if stored.resource_version().as_deref() != Some(expected.as_str()) {
            return Err(StoreError::Conflict(format!(
                "{}: the object has been modified; please apply your changes to the latest version and try again",
                what
            )));
        }
        stored.spec.consumer_ref = host.spec.consumer_ref.clone();
        stored.metadata.resource_version = Some(version);
        *self.host_patches.lock().unwrap() += 1;
        Ok(stored.clone())
    }

    async fn get_host_claim(&self, namespace: &str, name: &str) -> Result<HostClaim, StoreError> {
        let what = format!("get HostClaim {}/{}", namespace, name);
        self.inject(MockOperation::GetHostClaim, &what, None).await?;
        self.claim(namespace, name).ok_or(StoreError::NotFound(what))
    }

    async fn patch_host_claim(&self, claim: &HostClaim) -> Result<HostClaim, StoreError> {
        let key = key_of(claim);
        let what = format!("patch HostClaim {}/{}", key.0, key.1);
        self.inject(MockOperation::PatchHostClaim, &what, Some(&key)).await?;

        let version = self.bump_version();
        let mut claims = self.claims.lock().unwrap();
        let stored = claims
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(what.clone()))?;
        stored.metadata.annotations = claim.metadata.annotations.clone();
        stored.metadata.finalizers = claim.metadata.finalizers.clone();
        stored.status = claim.status.clone().map(|mut status| {
            status.last_updated = Some(chrono::Utc::now());
            status
        });
        stored.metadata.resource_version = Some(version);
        let patched = stored.clone();

        // The API server removes a deleting object once its finalizers are gone.
        if patched.metadata.deletion_timestamp.is_some() && patched.finalizers().is_empty() {
            claims.remove(&key);
        }
        *self.claim_patches.lock().unwrap() += 1;
        Ok(patched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{Operator, Requirement};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

    fn host(namespace: &str, name: &str, labels: &[(&str, &str)]) -> BareMetalHost {
        BareMetalHost {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        }
    }

    fn claim(namespace: &str, name: &str) -> HostClaim {
        HostClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        }
    }

    fn consumer(name: &str) -> ConsumerReference {
        ConsumerReference::new("metal3.io/v1alpha1", "HostClaim", "ns", name)
    }

    #[tokio::test]
    async fn test_list_hosts_filters_namespace_and_labels() {
        let store = MockHostStore::new();
        store.add_host(host("pool", "h1", &[("tier", "edge")]));
        store.add_host(host("pool", "h2", &[("tier", "core")]));
        store.add_host(host("other", "h3", &[("tier", "edge")]));

        let selector = LabelSelector::from_requirements(vec![
            Requirement::new("tier", Operator::Equals, vec!["edge".to_string()]).unwrap(),
        ]);
        let hosts = store.list_bare_metal_hosts("pool", &selector).await.unwrap();
        let names: Vec<String> = hosts.iter().map(|h| h.name_any()).collect();
        assert_eq!(names, vec!["h1"]);
    }

    #[tokio::test]
    async fn test_patch_host_bumps_version() {
        let store = MockHostStore::new();
        store.add_host(host("pool", "h1", &[]));

        let mut read = store.get_bare_metal_host("pool", "h1").await.unwrap();
        read.spec.consumer_ref = Some(consumer("c1"));
        let patched = store.patch_bare_metal_host(&read).await.unwrap();

        assert_ne!(patched.resource_version(), read.resource_version());
        assert_eq!(patched.spec.consumer_ref, Some(consumer("c1")));
        assert_eq!(store.host_patch_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_host_patch_conflicts() {
        let store = MockHostStore::new();
        store.add_host(host("pool", "h1", &[]));

        let mut read = store.get_bare_metal_host("pool", "h1").await.unwrap();
        store.touch_host("pool", "h1");
        read.spec.consumer_ref = Some(consumer("c1"));

        let err = store.patch_bare_metal_host(&read).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(store.host("pool", "h1").unwrap().spec.consumer_ref.is_none());
        assert_eq!(store.host_patch_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_bind_fault_wins_the_race() {
        let store = MockHostStore::new();
        store.add_host(host("pool", "h1", &[]));
        store.fail_next(MockOperation::PatchBareMetalHost, MockFault::ConcurrentBind(consumer("rival")));

        let mut read = store.get_bare_metal_host("pool", "h1").await.unwrap();
        read.spec.consumer_ref = Some(consumer("c1"));

        let err = store.patch_bare_metal_host(&read).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.host("pool", "h1").unwrap().spec.consumer_ref, Some(consumer("rival")));
    }

    #[tokio::test]
    async fn test_faults_are_consumed_once() {
        let store = MockHostStore::new();
        store.add_namespace("ns", &[("team", "a")]);
        store.fail_next(MockOperation::GetNamespaceLabels, MockFault::Unavailable);

        assert!(matches!(store.get_namespace_labels("ns").await, Err(StoreError::Kube(_))));
        let labels = store.get_namespace_labels("ns").await.unwrap();
        assert_eq!(labels.get("team").map(String::as_str), Some("a"));
    }

    #[tokio::test]
    async fn test_list_policies_by_namespace() {
        let store = MockHostStore::new();
        for (ns, name) in [("ns1", "p1"), ("ns2", "p2")] {
            store.add_policy(HostDeployPolicy {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(ns.to_string()),
                    ..Default::default()
                },
                spec: Default::default(),
            });
        }
        assert_eq!(store.list_host_deploy_policies(None).await.unwrap().len(), 2);
        let in_ns2 = store.list_host_deploy_policies(Some("ns2")).await.unwrap();
        assert_eq!(in_ns2.len(), 1);
        assert_eq!(in_ns2[0].name_any(), "p2");
    }

    #[tokio::test]
    async fn test_deleting_claim_without_finalizers_is_removed() {
        let store = MockHostStore::new();
        let mut c = claim("ns", "c1");
        c.metadata.finalizers = Some(vec!["metal3.io/hostclaim".to_string()]);
        c.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        store.add_claim(c.clone());

        c.metadata.finalizers = Some(vec![]);
        store.patch_host_claim(&c).await.unwrap();
        assert!(store.claim("ns", "c1").is_none());
    }

    #[tokio::test]
    async fn test_patch_claim_sets_last_updated() {
        let store = MockHostStore::new();
        let mut c = claim("ns", "c1");
        store.add_claim(c.clone());

        c.status = Some(Default::default());
        let patched = store.patch_host_claim(&c).await.unwrap();
        assert!(patched.status.unwrap().last_updated.is_some());
        assert_eq!(store.claim_patch_count(), 1);
    }
}
