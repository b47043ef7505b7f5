//! Controller-specific error types.
//!
//! This module defines error types specific to the HostClaim Controller
//! that are not covered by upstream library errors.

use crate::requeue::{AggregateError, RequeueAfterError};
use kube::Error as KubeError;
use metal_store::{SelectorError, StoreError};
use thiserror::Error;

/// Errors that can occur in the HostClaim Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Store error (API access, conflicts, missing objects)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Malformed host selector
    #[error("Invalid host selector: {0}")]
    Selector(#[from] SelectorError),

    /// Malformed `nameMatches` expression in a HostDeployPolicy
    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),

    /// Try again later
    #[error("{0}")]
    Requeue(#[from] RequeueAfterError),

    /// Several failures in one reconciliation
    #[error("{0}")]
    Aggregate(#[from] AggregateError),

    /// Error annotated with the phase and object it happened in
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ControllerError>,
    },

    /// Work abandoned because the controller is shutting down
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics server I/O error
    #[error("Metrics server error: {0}")]
    Server(#[from] std::io::Error),
}

impl ControllerError {
    /// Wrap this error with a description of what was being done.
    pub fn context(self, context: impl Into<String>) -> Self {
        ControllerError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True when the error, or any error it wraps or aggregates, is a
    /// cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ControllerError::Cancelled(_) => true,
            ControllerError::Context { source, .. } => source.is_cancelled(),
            ControllerError::Aggregate(aggregate) => aggregate.errors().iter().any(|inner| {
                (**inner)
                    .downcast_ref::<ControllerError>()
                    .is_some_and(ControllerError::is_cancelled)
            }),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_behind_context() {
        let err = ControllerError::Cancelled("listing HostDeployPolicies".to_string())
            .context("choosing host")
            .context("associating HostClaim ns/c1");
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_cancellation_inside_aggregate() {
        let errors: Vec<Box<dyn std::error::Error + Send + Sync>> = vec![
            Box::new(ControllerError::Cancelled("listing HostDeployPolicies".to_string()).context("choosing host")),
            Box::new(ControllerError::Cancelled("patching HostClaim ns/c1".to_string())),
        ];
        let err = ControllerError::from(AggregateError::new(errors)).context("reconciling");
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_other_errors_are_not_cancellations() {
        let errors: Vec<Box<dyn std::error::Error + Send + Sync>> = vec![
            Box::new(ControllerError::InvalidConfig("bad".to_string())),
            Box::new(RequeueAfterError::new(std::time::Duration::from_secs(30))),
        ];
        assert!(!ControllerError::from(AggregateError::new(errors)).is_cancelled());
        assert!(!ControllerError::Watch("stream ended".to_string()).is_cancelled());
    }
}
