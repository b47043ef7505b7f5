//! Test utilities for unit testing the host manager and reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
#[cfg(test)]
use metal_store::MockHostStore;
#[cfg(test)]
use std::collections::BTreeMap;

#[cfg(test)]
fn string_map(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
    if pairs.is_empty() {
        return None;
    }
    Some(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

/// Helper to create test HostClaim CRD
#[cfg(test)]
pub fn create_test_host_claim(namespace: &str, name: &str) -> HostClaim {
    HostClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: HostClaimSpec::default(),
        status: None,
    }
}

/// Helper to create test HostClaim CRD with a host selector
#[cfg(test)]
pub fn create_test_host_claim_with_selector(
    namespace: &str,
    name: &str,
    match_labels: &[(&str, &str)],
    in_namespace: &str,
) -> HostClaim {
    let mut claim = create_test_host_claim(namespace, name);
    claim.spec.host_selector = HostSelector {
        match_labels: string_map(match_labels).unwrap_or_default(),
        match_expressions: vec![],
        in_namespace: in_namespace.to_string(),
    };
    claim
}

/// Helper to create a selector expression
#[cfg(test)]
pub fn expression(key: &str, operator: &str, values: &[&str]) -> HostSelectorRequirement {
    HostSelectorRequirement {
        key: key.to_string(),
        operator: operator.to_string(),
        values: values.iter().map(|v| v.to_string()).collect(),
    }
}

/// Helper to create test BareMetalHost CRD in a given provisioning state
#[cfg(test)]
pub fn create_test_bare_metal_host(
    namespace: &str,
    name: &str,
    labels: &[(&str, &str)],
    state: ProvisioningState,
) -> BareMetalHost {
    BareMetalHost {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: string_map(labels),
            ..Default::default()
        },
        spec: BareMetalHostSpec::default(),
        status: Some(BareMetalHostStatus {
            provisioning: ProvisionStatus { state },
            error_message: String::new(),
            powered_on: false,
        }),
    }
}

/// Helper to create an available test BareMetalHost
#[cfg(test)]
pub fn create_available_host(namespace: &str, name: &str, labels: &[(&str, &str)]) -> BareMetalHost {
    create_test_bare_metal_host(namespace, name, labels, ProvisioningState::Available)
}

/// Helper to add annotations to a host
#[cfg(test)]
pub fn with_annotations(mut host: BareMetalHost, annotations: &[(&str, &str)]) -> BareMetalHost {
    host.metadata.annotations = string_map(annotations);
    host
}

/// Helper to mark a host as being deleted
#[cfg(test)]
pub fn deleting(mut host: BareMetalHost) -> BareMetalHost {
    host.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    host.metadata.finalizers = Some(vec!["baremetalhost.metal3.io".to_string()]);
    host
}

/// Helper to create a consumer reference pointing at a HostClaim
#[cfg(test)]
pub fn host_claim_ref(namespace: &str, name: &str) -> ConsumerReference {
    ConsumerReference::new(METAL3_API_VERSION, HOST_CLAIM_KIND, namespace, name)
}

/// Helper to create test HostDeployPolicy CRD
#[cfg(test)]
pub fn create_test_policy(
    namespace: &str,
    name: &str,
    constraints: Option<HostClaimNamespaces>,
) -> HostDeployPolicy {
    HostDeployPolicy {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: HostDeployPolicySpec {
            host_claim_namespaces: constraints,
        },
    }
}

/// Helper to create policy constraints allow-listing namespace names
#[cfg(test)]
pub fn names_constraint(names: &[&str]) -> HostClaimNamespaces {
    HostClaimNamespaces {
        names: Some(names.iter().map(|n| n.to_string()).collect()),
        ..Default::default()
    }
}

/// Helper to create a mock store holding the claim namespace and a policy
/// in every pool namespace accepting it
#[cfg(test)]
pub fn create_test_store(claim_namespace: &str, pool_namespaces: &[&str]) -> MockHostStore {
    let store = MockHostStore::new();
    store.add_namespace(claim_namespace, &[]);
    for pool in pool_namespaces {
        store.add_namespace(pool, &[]);
        store.add_policy(create_test_policy(
            pool,
            "policy",
            Some(names_constraint(&[claim_namespace])),
        ));
    }
    store
}
