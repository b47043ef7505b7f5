//! Status conditions for HostClaim
//!
//! Condition types and reasons follow Kubernetes conventions: types and
//! reasons are CamelCase programmatic identifiers, the message is free text.
//!
//! ```yaml
//! status:
//!   conditions:
//!     - type: Ready
//!       status: "False"
//!       reason: NoBareMetalHost
//!       message: "Associated: No available host found: requeuing."
//!     - type: Associated
//!       status: "False"
//!       reason: NoBareMetalHost
//!       message: "No available host found: requeuing."
//! ```

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Aggregate condition summarizing the owned conditions.
pub const READY_CONDITION: &str = "Ready";

/// Status of the association of a HostClaim with a BareMetalHost.
pub const ASSOCIATED_CONDITION: &str = "Associated";

/// Status of the transfer of information from the HostClaim to the BareMetalHost.
pub const SYNCHRONIZED_CONDITION: &str = "Synchronized";

/// Provisioning status of the bound host, as seen from the claim.
pub const PROVISIONED_CONDITION: &str = "Provisioned";

/// Conditions summarized into [`READY_CONDITION`].
pub const SUMMARIZED_CONDITIONS: [&str; 3] = [
    ASSOCIATED_CONDITION,
    SYNCHRONIZED_CONDITION,
    PROVISIONED_CONDITION,
];

// ============================================================================
// Association Reasons
// ============================================================================

/// The HostClaim is associated with a BareMetalHost.
pub const BARE_METAL_HOST_ASSOCIATED_REASON: &str = "BareMetalHostAssociated";

/// No BareMetalHost matching the constraints is available.
pub const NO_BARE_METAL_HOST_REASON: &str = "NoBareMetalHost";

/// The annotation recording the bound host could not be written on the claim.
pub const HOST_CLAIM_ANNOTATION_NOT_SET_REASON: &str = "HostClaimAnnotationNotSet";

/// The claim is being deleted.
pub const HOST_CLAIM_DELETING_REASON: &str = "HostClaimDeleting";

/// Releasing the bound host failed during deletion.
pub const HOST_CLAIM_DELETION_FAILED_REASON: &str = "HostClaimDeletionFailed";

// ============================================================================
// Synchronization Reasons
// ============================================================================

/// Writing to the BareMetalHost failed.
pub const BARE_METAL_HOST_NOT_SYNCHRONIZED_REASON: &str = "BareMetalHostNotSynchronized";

/// Configuration was transferred to the BareMetalHost.
pub const CONFIGURATION_SYNCED_REASON: &str = "ConfigurationSynced";

// ============================================================================
// Summary Reasons
// ============================================================================

/// Every summarized condition is True.
pub const READY_REASON: &str = "Ready";

/// At least one summarized condition is missing or Unknown.
pub const UNKNOWN_REASON: &str = "Unknown";

/// Condition status values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    /// The condition holds
    True,
    /// The condition does not hold
    False,
    /// The controller cannot tell yet
    #[default]
    Unknown,
}

/// Condition represents an observation of a resource's current state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g. "Associated")
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown
    pub status: ConditionStatus,

    /// CamelCase reason for the condition's last transition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message indicating details about the transition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Generation of the object this condition was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last time the condition transitioned from one status to another
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// True when the condition status is [`ConditionStatus::True`].
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}
