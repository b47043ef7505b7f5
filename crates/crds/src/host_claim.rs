//! HostClaim CRD
//!
//! Requests a dedicated bare-metal host matching a label selector.

use crate::conditions::Condition;
use crate::references::{ConsumerReference, SecretReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind name used in consumer references written by the binding engine.
pub const HOST_CLAIM_KIND: &str = "HostClaim";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal3.io",
    version = "v1alpha1",
    kind = "HostClaim",
    namespaced,
    status = "HostClaimStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct HostClaimSpec {
    /// Should the compute resource be powered on?
    #[serde(default)]
    pub powered_on: bool,

    /// Image to provision once the claim is bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,

    /// Secret containing the user data passed to the config drive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<SecretReference>,

    /// Secret containing the network configuration passed to the config drive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_data: Option<SecretReference>,

    /// Secret containing host metadata passed to the config drive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<SecretReference>,

    /// Matching criteria for labels on BareMetalHosts
    #[serde(default)]
    pub host_selector: HostSelector,

    /// Object using the host once bound (e.g. a Cluster API machine)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_ref: Option<ConsumerReference>,

    /// Preferred failure domain, matched against the
    /// `infrastructure.cluster.x-k8s.io/failure-domain` host label
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub failure_domain: String,
}

/// Image to write on the host disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// URL of the image
    pub url: String,

    /// Checksum of the image (or URL of the checksum file)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Disk format of the image (raw, qcow2, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_format: Option<String>,
}

/// Matching criteria for labels on BareMetalHosts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostSelector {
    /// Key/value pairs of labels that must exist on a chosen BareMetalHost
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Label match expressions that must be true on a chosen BareMetalHost
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<HostSelectorRequirement>,

    /// Single namespace where the BareMetalHost should reside. When empty,
    /// every namespace with a compliant HostDeployPolicy is searched.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub in_namespace: String,
}

/// A label requirement: key, operator and values.
///
/// The operator is matched case-insensitively ("In", "in" and "IN" are the
/// same operator).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostSelectorRequirement {
    /// Label key the requirement applies to
    pub key: String,

    /// Operator: In, NotIn, Exists, =, ==, !=, !, Gt, Lt
    pub operator: String,

    /// Values compared against the label value
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct HostClaimStatus {
    /// When this status was last observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<chrono::DateTime<chrono::Utc>>,

    /// Current service state of the HostClaim
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// HardwareData bound alongside the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_data: Option<HardwareReference>,

    /// Currently detected power state of the host
    #[serde(default)]
    pub powered_on: bool,
}

/// Reference to a HardwareData object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HardwareReference {
    /// Namespace of the HardwareData
    pub namespace: String,
    /// Name of the HardwareData
    pub name: String,
}

impl HostClaim {
    /// Conditions of this claim (empty when the status is unset).
    pub fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    /// Mutable access to the conditions, creating the status if needed.
    pub fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.get_or_insert_with(HostClaimStatus::default).conditions
    }

    /// Look up a condition by type.
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions().iter().find(|c| c.r#type == condition_type)
    }
}
