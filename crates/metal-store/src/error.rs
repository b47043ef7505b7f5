//! Metal store errors

use thiserror::Error;

/// Errors that can occur when reading or writing the object store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Kubernetes API error that is neither a conflict nor a not-found
    #[error("Kubernetes error: {0}")]
    Kube(#[source] kube::Error),

    /// Conditional write rejected because the stored version moved on
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object is missing a field the store needs (name, namespace, ...)
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl StoreError {
    /// Classify a kube error, mapping HTTP 409 to [`StoreError::Conflict`]
    /// and HTTP 404 to [`StoreError::NotFound`].
    pub fn from_kube(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 409 => {
                StoreError::Conflict(format!("{}: {}", what, ae.message))
            }
            kube::Error::Api(ae) if ae.code == 404 => {
                StoreError::NotFound(format!("{}: {}", what, ae.message))
            }
            other => StoreError::Kube(other),
        }
    }

    /// True for optimistic-concurrency conflicts.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// True when the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code,
        })
    }

    #[test]
    fn test_409_is_conflict() {
        let err = StoreError::from_kube(api_error(409), "patch BareMetalHost ns/h1");
        assert!(err.is_conflict());
        assert!(err.to_string().contains("ns/h1"));
    }

    #[test]
    fn test_404_is_not_found() {
        let err = StoreError::from_kube(api_error(404), "get BareMetalHost ns/h1");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_other_codes_stay_kube_errors() {
        let err = StoreError::from_kube(api_error(500), "list BareMetalHost");
        assert!(matches!(err, StoreError::Kube(_)));
    }
}
