//! HostClaim CRD Definitions
//!
//! Kubernetes Custom Resource Definitions shared by the HostClaim binding
//! engine: the claim itself, the bare-metal hosts it binds to, and the
//! per-namespace deploy policies that gate cross-namespace binding.

pub mod annotations;
pub mod baremetal_host;
pub mod conditions;
pub mod host_claim;
pub mod host_deploy_policy;
pub mod references;

pub use annotations::*;
pub use baremetal_host::*;
pub use conditions::*;
pub use host_claim::*;
pub use host_deploy_policy::*;
pub use references::*;

/// API group of every CRD in this crate.
pub const METAL3_GROUP: &str = "metal3.io";

/// API version of every CRD in this crate.
pub const METAL3_VERSION: &str = "v1alpha1";

/// `group/version` identifier written into consumer references.
pub const METAL3_API_VERSION: &str = "metal3.io/v1alpha1";
