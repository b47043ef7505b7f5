//! Well-known labels, annotations and finalizers
//!
//! Keys read or written by the binding engine on `HostClaim` and
//! `BareMetalHost` objects. Markers documented as presence-only are matched
//! on the key alone; their value is ignored.

/// Finalizer placed on HostClaims so the bound host is released before the
/// claim disappears.
pub const HOST_CLAIM_FINALIZER: &str = "metal3.io/hostclaim";

/// Annotation on a HostClaim recording the bound host as `namespace/name`.
pub const BARE_METAL_HOST_ANNOTATION: &str = "metal3.io/BareMetalHost";

/// Pauses reconciliation of the annotated object (presence-only on hosts).
pub const PAUSED_ANNOTATION: &str = "baremetalhost.metal3.io/paused";

/// Value of [`PAUSED_ANNOTATION`] set by the host manager when it pauses a
/// HostClaim itself.
pub const PAUSED_ANNOTATION_KEY: &str = "metal3.io/hostmgr";

/// Set by the health remediation controller on unhealthy hosts (presence-only).
pub const UNHEALTHY_ANNOTATION: &str = "capi.metal3.io/unhealthy";

/// Legacy node-reuse reservation label (presence-only).
pub const NODE_REUSE_LABEL: &str = "infrastructure.cluster.x-k8s.io/node-reuse";

/// Failure-domain label compared against `HostClaimSpec::failure_domain`.
pub const FAILURE_DOMAIN_LABEL: &str = "infrastructure.cluster.x-k8s.io/failure-domain";
