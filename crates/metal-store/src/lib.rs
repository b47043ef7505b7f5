//! Metal Store
//!
//! Read/list/patch access to the objects the HostClaim binding engine works
//! on: `HostClaim`, `BareMetalHost`, `HostDeployPolicy` and the labels of
//! core `Namespace` objects.
//!
//! # Example
//!
//! ```no_run
//! use metal_store::{HostStoreTrait, KubeHostStore, LabelSelector, Operator, Requirement};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = KubeHostStore::new(kube::Client::try_default().await?);
//!
//! let selector = LabelSelector::from_requirements(vec![
//!     Requirement::new("tier", Operator::Equals, vec!["edge".to_string()])?,
//! ]);
//! let hosts = store.list_bare_metal_hosts("metal-pool", &selector).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Optimistic concurrency**: host patches are conditional on the
//!   `resourceVersion` last read; a stale write fails with
//!   [`StoreError::Conflict`]
//! - **Label queries**: [`LabelSelector`] renders to the API server selector
//!   syntax and also evaluates client-side
//! - **Mocking**: `MockHostStore` (feature `test-util`) keeps objects in memory

pub mod client;
pub mod error;
pub mod selector;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeHostStore;
pub use error::StoreError;
pub use selector::{LabelSelector, Operator, Requirement, SelectorError};
pub use store_trait::HostStoreTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockHostStore;
