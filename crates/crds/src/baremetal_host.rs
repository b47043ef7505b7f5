//! BareMetalHost CRD
//!
//! Thin view of the host inventory object. The provisioning lifecycle is
//! owned by a separate controller; the binding engine only writes
//! `spec.consumerRef` and reads the rest.

use crate::references::ConsumerReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "metal3.io",
    version = "v1alpha1",
    kind = "BareMetalHost",
    namespaced,
    status = "BareMetalHostStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostSpec {
    /// Object using the host. When set, the host is considered in use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_ref: Option<ConsumerReference>,

    /// Should the server be online?
    #[serde(default)]
    pub online: bool,

    /// Free-form description of the host
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct BareMetalHostStatus {
    /// Provisioner state of the host
    #[serde(default)]
    pub provisioning: ProvisionStatus,

    /// Details of the last error reported by the provisioning subsystem
    #[serde(default)]
    pub error_message: String,

    /// Whether the host is powered on
    #[serde(default)]
    pub powered_on: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionStatus {
    /// What the provisioner is doing with the host
    #[serde(default)]
    pub state: ProvisioningState,
}

/// Provisioning states reported by the host lifecycle controller.
///
/// Serializes as the lowercase, space separated strings used on the wire
/// ("ready", "provisioning error", ...). Unrecognized states deserialize to
/// [`ProvisioningState::Unknown`] so a newer lifecycle controller never
/// breaks listing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ProvisioningState {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "unmanaged")]
    Unmanaged,
    #[serde(rename = "registration error")]
    RegistrationError,
    #[serde(rename = "registering")]
    Registering,
    #[serde(rename = "match profile")]
    MatchProfile,
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "available")]
    Available,
    #[serde(rename = "provisioning")]
    Provisioning,
    #[serde(rename = "provisioning error")]
    ProvisioningError,
    #[serde(rename = "provisioned")]
    Provisioned,
    #[serde(rename = "externally provisioned")]
    ExternallyProvisioned,
    #[serde(rename = "deprovisioning")]
    Deprovisioning,
    #[serde(rename = "inspecting")]
    Inspecting,
    #[serde(rename = "power management error")]
    PowerManagementError,
    #[serde(rename = "deleting")]
    Deleting,
    #[serde(other)]
    Unknown,
}

impl ProvisioningState {
    /// Only `ready` and `available` hosts may be bound to a claim.
    pub fn is_assignable(&self) -> bool {
        matches!(self, Self::Ready | Self::Available)
    }
}

impl BareMetalHost {
    /// Provisioning state, `None` when the status has not been written yet.
    pub fn provisioning_state(&self) -> ProvisioningState {
        self.status
            .as_ref()
            .map(|s| s.provisioning.state.clone())
            .unwrap_or_default()
    }

    /// Last error reported by the lifecycle controller, empty when healthy.
    pub fn error_message(&self) -> &str {
        self.status.as_ref().map_or("", |s| s.error_message.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_state_wire_format() {
        let state: ProvisioningState = serde_json::from_str("\"provisioning error\"").unwrap();
        assert_eq!(state, ProvisioningState::ProvisioningError);
        assert_eq!(serde_json::to_string(&ProvisioningState::Available).unwrap(), "\"available\"");
    }

    #[test]
    fn test_unrecognized_state_is_unknown() {
        let state: ProvisioningState = serde_json::from_str("\"detached\"").unwrap();
        assert_eq!(state, ProvisioningState::Unknown);
        assert!(!state.is_assignable());
    }

    #[test]
    fn test_only_ready_and_available_are_assignable() {
        assert!(ProvisioningState::Ready.is_assignable());
        assert!(ProvisioningState::Available.is_assignable());
        assert!(!ProvisioningState::Registering.is_assignable());
        assert!(!ProvisioningState::Provisioned.is_assignable());
        assert!(!ProvisioningState::None.is_assignable());
    }
}
