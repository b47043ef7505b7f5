//! Kubernetes object references for HostClaim CRDs
//!
//! Provides the `consumerRef` pointer a `BareMetalHost` carries while it is
//! bound. Follows the Kubernetes `ObjectReference` shape with `apiVersion`,
//! `kind`, `namespace` and `name`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the object consuming a host.
///
/// When set on a `BareMetalHost` the host is considered in use. The binding
/// engine writes references of kind `HostClaim`; other controllers may write
/// their own kinds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerReference {
    /// `group/version` of the referenced object (e.g. "metal3.io/v1alpha1")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    /// Kind of the referenced object (e.g. "HostClaim")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    /// Name of the referenced object
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Namespace of the referenced object
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

impl ConsumerReference {
    /// Create a new reference with apiVersion, kind, namespace and name
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// API group of the reference, parsed from `apiVersion`.
    ///
    /// `"metal3.io/v1alpha1"` yields `"metal3.io"`; a bare version such as
    /// `"v1"` belongs to the core group and yields `""`.
    pub fn group(&self) -> &str {
        match self.api_version.split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }
}

/// Reference to a Secret holding cloud-init style data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the Secret
    pub name: String,

    /// Namespace of the Secret (defaults to the namespace of the referencing object)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}
