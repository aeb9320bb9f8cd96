//! Error types for caravan-kube

use thiserror::Error;

/// Result type for caravan-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur during Kubernetes operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Resource kind not served by the cluster
    #[error("unknown resource type: {api_version}/{kind}")]
    UnknownKind { api_version: String, kind: String },

    /// A resource did not become ready before the deadline
    #[error("resource not ready, name: {name}, kind: {kind}, status: {status}")]
    ResourceNotReady {
        name: String,
        kind: String,
        status: String,
    },

    /// A resource reached a terminal failure state
    #[error("resource failed: {name} ({kind}): {message}")]
    ResourceFailed {
        name: String,
        kind: String,
        message: String,
    },

    /// The wait deadline elapsed
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Several wait failures reported as one
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<KubeError>),

    /// Hook execution failed
    #[error("hook '{name}' failed during {event}: {message}")]
    HookFailed {
        name: String,
        event: String,
        message: String,
    },

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Chart or manifest planning error
    #[error("chart error: {0}")]
    Chart(String),
}

fn join_errors(errors: &[KubeError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<caravan_core::CoreError> for KubeError {
    fn from(e: caravan_core::CoreError) -> Self {
        KubeError::Chart(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }

    /// Check if this is an authorization error (403)
    pub fn is_forbidden(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 403)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> KubeError {
        KubeError::Api(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn test_status_code_classification() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(404).is_forbidden());
        assert!(api_error(409).is_conflict());
        assert!(api_error(403).is_forbidden());
        assert!(!KubeError::DeadlineExceeded.is_not_found());
    }

    #[test]
    fn test_aggregate_joins_lines() {
        let err = KubeError::Aggregate(vec![
            KubeError::ResourceNotReady {
                name: "web".to_string(),
                kind: "Deployment".to_string(),
                status: "InProgress".to_string(),
            },
            KubeError::DeadlineExceeded,
        ]);
        let text = err.to_string();
        assert_eq!(
            text,
            "resource not ready, name: web, kind: Deployment, status: InProgress\ncontext deadline exceeded"
        );
    }
}
