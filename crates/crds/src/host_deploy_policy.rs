//! HostDeployPolicy CRD
//!
//! Lives next to BareMetalHosts and constrains which HostClaim namespaces
//! may bind them.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal3.io",
    version = "v1alpha1",
    kind = "HostDeployPolicy",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct HostDeployPolicySpec {
    /// Constraints on the namespaces of HostClaims allowed to bind the
    /// BareMetalHosts in the namespace of this policy. A policy without
    /// constraints accepts no namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_claim_namespaces: Option<HostClaimNamespaces>,
}

/// Every present field must pass for a namespace to be accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostClaimNamespaces {
    /// Namespace names where the HostClaim is authorized to reside
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,

    /// Regular expression that must match the namespace of the HostClaim
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name_matches: String,

    /// Labels the namespace must carry. When a value is given it must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_labels: Option<Vec<NameValuePair>>,
}

/// Label name and optional expected value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NameValuePair {
    /// Name of the expected label
    pub name: String,

    /// If specified, expected value of the label
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}
