//! Requeue signalling.
//!
//! A [`RequeueAfterError`] tells the reconcile loop to try again after a
//! delay instead of treating the failure as a hard error. It is found by
//! walking the `source()` chain and downcasting each link, so it survives
//! any number of context wraps and multi-error aggregates.

use metal_store::StoreError;
use std::error::Error;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::error::ControllerError;

/// A requeue after zero is an immediate retry, without backoff.
pub const TERMINAL_REQUEUE_DELAY: Duration = Duration::ZERO;

/// Standard delay when waiting for hosts to settle.
pub const HOST_CLAIM_REQUEUE_DELAY: Duration = Duration::from_secs(30);

/// Small delay after an optimistic-concurrency conflict.
pub const CONFLICT_REQUEUE_DELAY: Duration = Duration::from_millis(100);

/// Retry the reconciliation after `requeue_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("requeue in: {requeue_after:?}")]
pub struct RequeueAfterError {
    /// Delay before the next attempt
    pub requeue_after: Duration,
}

impl RequeueAfterError {
    /// Requeue after `requeue_after`.
    pub fn new(requeue_after: Duration) -> Self {
        Self { requeue_after }
    }
}

/// Several errors reported as one.
#[derive(Debug)]
pub struct AggregateError(Vec<Box<dyn Error + Send + Sync + 'static>>);

impl AggregateError {
    /// Aggregate `errors`.
    pub fn new(errors: Vec<Box<dyn Error + Send + Sync + 'static>>) -> Self {
        Self(errors)
    }

    /// The aggregated errors, in the order they were reported.
    pub fn errors(&self) -> &[Box<dyn Error + Send + Sync + 'static>] {
        &self.0
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [only] = self.0.as_slice() {
            return write!(f, "{}", only);
        }
        let messages: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", messages.join(", "))
    }
}

impl Error for AggregateError {}

/// Walk `err` and its sources (descending into aggregates) and return the
/// first link for which `probe` yields a value.
fn find_in_chain<T>(err: &(dyn Error + 'static), probe: &dyn Fn(&(dyn Error + 'static)) -> Option<T>) -> Option<T> {
    let mut current = Some(err);
    while let Some(link) = current {
        if let Some(found) = probe(link) {
            return Some(found);
        }
        if let Some(aggregate) = link.downcast_ref::<AggregateError>() {
            for inner in aggregate.errors() {
                let inner: &(dyn Error + 'static) = &**inner;
                if let Some(found) = find_in_chain(inner, probe) {
                    return Some(found);
                }
            }
        }
        current = link.source();
    }
    None
}

/// Delay carried by a [`RequeueAfterError`] anywhere in the chain of `err`.
pub fn is_requeue_after_error(err: &(dyn Error + 'static)) -> Option<Duration> {
    find_in_chain(err, &|link| {
        link.downcast_ref::<RequeueAfterError>()
            .map(|requeue| requeue.requeue_after)
    })
}

/// True when an optimistic-concurrency conflict appears anywhere in the
/// chain of `err`.
pub fn is_conflict_error(err: &(dyn Error + 'static)) -> bool {
    find_in_chain(err, &|link| {
        let conflict = link
            .downcast_ref::<StoreError>()
            .is_some_and(StoreError::is_conflict)
            || matches!(link.downcast_ref::<kube::Error>(), Some(kube::Error::Api(ae)) if ae.code == 409);
        conflict.then_some(())
    })
    .is_some()
}

/// True when a missing object appears anywhere in the chain of `err`.
pub fn is_not_found_error(err: &(dyn Error + 'static)) -> bool {
    find_in_chain(err, &|link| {
        let missing = link
            .downcast_ref::<StoreError>()
            .is_some_and(StoreError::is_not_found)
            || matches!(link.downcast_ref::<kube::Error>(), Some(kube::Error::Api(ae)) if ae.code == 404);
        missing.then_some(())
    })
    .is_some()
}

/// Turn a conflict into a short requeue; other errors pass through.
pub fn hide_conflict_error(err: ControllerError) -> ControllerError {
    if is_conflict_error(&err) {
        RequeueAfterError::new(CONFLICT_REQUEUE_DELAY).into()
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict() -> StoreError {
        StoreError::Conflict("patch BareMetalHost ns/h1: the object has been modified".to_string())
    }

    #[test]
    fn test_requeue_error_is_caught() {
        let duration = Duration::from_secs(20);
        let err = RequeueAfterError::new(duration);
        assert_eq!(is_requeue_after_error(&err), Some(duration));
    }

    #[test]
    fn test_requeue_error_behind_two_wrappers() {
        let duration = Duration::from_secs(30);
        let err = ControllerError::from(RequeueAfterError::new(duration))
            .context("choosing host")
            .context("associating HostClaim ns/c1");
        assert_eq!(is_requeue_after_error(&err), Some(duration));
    }

    #[test]
    fn test_requeue_error_behind_anyhow_context() {
        let duration = Duration::from_millis(100);
        let err = anyhow::Error::new(RequeueAfterError::new(duration)).context("wrapped error");
        assert_eq!(is_requeue_after_error(err.as_ref()), Some(duration));
    }

    #[test]
    fn test_requeue_error_inside_aggregate() {
        let err = AggregateError::new(vec![
            Box::new(ControllerError::InvalidConfig("other".to_string())),
            Box::new(ControllerError::from(RequeueAfterError::new(CONFLICT_REQUEUE_DELAY)).context("patching")),
        ]);
        let wrapped = ControllerError::from(err).context("reconciling");
        assert_eq!(is_requeue_after_error(&wrapped), Some(CONFLICT_REQUEUE_DELAY));
    }

    #[test]
    fn test_other_errors_are_not_caught() {
        let err = ControllerError::InvalidConfig("other".to_string()).context("wrapped error");
        assert_eq!(is_requeue_after_error(&err), None);
    }

    #[test]
    fn test_zero_delay_is_still_a_requeue() {
        let err = ControllerError::from(RequeueAfterError::new(TERMINAL_REQUEUE_DELAY));
        assert_eq!(is_requeue_after_error(&err), Some(Duration::ZERO));
    }

    #[test]
    fn test_hide_conflict_error_through_two_layers() {
        let err = ControllerError::from(conflict())
            .context("patching BareMetalHost ns/h1")
            .context("committing binding");
        let hidden = hide_conflict_error(err);
        assert_eq!(is_requeue_after_error(&hidden), Some(CONFLICT_REQUEUE_DELAY));
    }

    #[test]
    fn test_hide_conflict_error_finds_kube_409_in_aggregate() {
        let api_conflict = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        });
        let err = ControllerError::from(AggregateError::new(vec![Box::new(api_conflict)]));
        let hidden = hide_conflict_error(err);
        assert_eq!(is_requeue_after_error(&hidden), Some(CONFLICT_REQUEUE_DELAY));
    }

    #[test]
    fn test_hide_conflict_error_keeps_hard_errors() {
        let err = ControllerError::from(StoreError::InvalidObject("no name".to_string()));
        let kept = hide_conflict_error(err);
        assert!(is_requeue_after_error(&kept).is_none());
        assert!(matches!(kept, ControllerError::Store(_)));
    }

    #[test]
    fn test_not_found_detection() {
        let err = ControllerError::from(StoreError::NotFound("get BareMetalHost ns/h1".to_string()))
            .context("releasing host");
        assert!(is_not_found_error(&err));
        assert!(!is_conflict_error(&err));
    }
}
