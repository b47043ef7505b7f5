//! Kubernetes-backed store
//!
//! Reads go straight to the API server. Host writes are JSON merge patches
//! that carry `metadata.resourceVersion`, so the API server rejects a write
//! based on a stale read with HTTP 409.

use crate::error::StoreError;
use crate::selector::LabelSelector;
use crate::store_trait::HostStoreTrait;
use crds::{BareMetalHost, HostClaim, HostDeployPolicy};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

const FIELD_MANAGER: &str = "hostclaim-controller";

/// Store backed by a kube-rs [`Client`]
#[derive(Clone)]
pub struct KubeHostStore {
    client: Client,
}

impl KubeHostStore {
    /// Create a new store
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn identity<K: ResourceExt>(object: &K, kind: &str) -> Result<(String, String), StoreError> {
        let name = object.meta().name.clone().ok_or_else(|| {
            StoreError::InvalidObject(format!("{} without metadata.name", kind))
        })?;
        let namespace = object.namespace().ok_or_else(|| {
            StoreError::InvalidObject(format!("{} {} without metadata.namespace", kind, name))
        })?;
        Ok((namespace, name))
    }
}

#[async_trait::async_trait]
impl HostStoreTrait for KubeHostStore {
    async fn get_namespace_labels(&self, namespace: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = api
            .get(namespace)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("get Namespace {}", namespace)))?;
        Ok(ns.metadata.labels.unwrap_or_default())
    }

    async fn list_host_deploy_policies(&self, namespace: Option<&str>) -> Result<Vec<HostDeployPolicy>, StoreError> {
        let api: Api<HostDeployPolicy> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::from_kube(e, "list HostDeployPolicy"))?;
        debug!(
            namespace = namespace.unwrap_or("*"),
            count = list.items.len(),
            "Listed HostDeployPolicies"
        );
        Ok(list.items)
    }

    async fn list_bare_metal_hosts(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<BareMetalHost>, StoreError> {
        let api: Api<BareMetalHost> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_string());
        }
        let list = api
            .list(&params)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("list BareMetalHost in {}", namespace)))?;

        // The API server already filtered; re-check so both stores agree on
        // selector semantics.
        let hosts: Vec<BareMetalHost> = list
            .items
            .into_iter()
            .filter(|host| selector.matches(host.labels()))
            .collect();
        debug!(
            namespace = namespace,
            selector = %selector,
            count = hosts.len(),
            "Listed BareMetalHosts"
        );
        Ok(hosts)
    }

    async fn get_bare_metal_host(&self, namespace: &str, name: &str) -> Result<BareMetalHost, StoreError> {
        let api: Api<BareMetalHost> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("get BareMetalHost {}/{}", namespace, name)))
    }

    async fn patch_bare_metal_host(&self, host: &BareMetalHost) -> Result<BareMetalHost, StoreError> {
        let (namespace, name) = Self::identity(host, "BareMetalHost")?;
        let resource_version = host.resource_version().ok_or_else(|| {
            StoreError::InvalidObject(format!(
                "BareMetalHost {}/{} without metadata.resourceVersion",
                namespace, name
            ))
        })?;

        let patch = json!({
            "metadata": { "resourceVersion": resource_version },
            "spec": { "consumerRef": host.spec.consumer_ref },
        });
        let api: Api<BareMetalHost> = Api::namespaced(self.client.clone(), &namespace);
        let patched = api
            .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("patch BareMetalHost {}/{}", namespace, name)))?;
        debug!(
            baremetalhost = %name,
            namespace = %namespace,
            resource_version = %patched.resource_version().unwrap_or_default(),
            "Patched BareMetalHost consumerRef"
        );
        Ok(patched)
    }

    async fn get_host_claim(&self, namespace: &str, name: &str) -> Result<HostClaim, StoreError> {
        let api: Api<HostClaim> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| StoreError::from_kube(e, &format!("get HostClaim {}/{}", namespace, name)))
    }

    async fn patch_host_claim(&self, claim: &HostClaim) -> Result<HostClaim, StoreError> {
        let (namespace, name) = Self::identity(claim, "HostClaim")?;
        let api: Api<HostClaim> = Api::namespaced(self.client.clone(), &namespace);
        let what = format!("patch HostClaim {}/{}", namespace, name);

        // A merge patch only adds map keys; removed annotations are sent as null.
        let current = api
            .get(&name)
            .await
            .map_err(|e| StoreError::from_kube(e, &what))?;
        let mut annotations: Map<String, Value> = claim
            .annotations()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        for key in current.annotations().keys() {
            if !claim.annotations().contains_key(key) {
                annotations.insert(key.clone(), Value::Null);
            }
        }

        let metadata_patch = json!({
            "metadata": {
                "annotations": annotations,
                "finalizers": claim.finalizers(),
            }
        });
        let mut patched = api
            .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&metadata_patch))
            .await
            .map_err(|e| StoreError::from_kube(e, &what))?;

        // Status is a subresource and needs its own request. A deleted
        // claim whose finalizers were just cleared may already be gone.
        if let Some(status) = &claim.status {
            let mut status = status.clone();
            status.last_updated = Some(chrono::Utc::now());
            let status_patch = json!({ "status": status });
            match api
                .patch_status(&name, &PatchParams::default(), &Patch::Merge(&status_patch))
                .await
                .map_err(|e| StoreError::from_kube(e, &what))
            {
                Ok(updated) => patched = updated,
                Err(e) if e.is_not_found() && claim.finalizers().is_empty() => {
                    debug!(hostclaim = %name, namespace = %namespace, "HostClaim removed before status update");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(hostclaim = %name, namespace = %namespace, "Patched HostClaim");
        Ok(patched)
    }
}
