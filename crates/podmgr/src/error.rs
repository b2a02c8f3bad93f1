//! Error types for pod container operations.

use kube::Error as KubeError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PodmgrError>;

/// Errors that can occur while attaching auxiliary containers to a pod.
///
/// Errors from the cluster client propagate unchanged to the CLI boundary.
/// Use [`PodmgrError::is_retryable`] to decide whether re-running the whole
/// operation is safe.
#[derive(Error, Debug)]
pub enum PodmgrError {
    /// Credentials could not be located, parsed, or obtained.
    #[error("Kubernetes configuration error: {0}")]
    Config(String),

    /// The request was malformed; no cluster call was made.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The target pod does not exist.
    #[error("Pod not found: {namespace}/{name}")]
    NotFound { namespace: String, name: String },

    /// The pod changed between fetch and submit.
    #[error(
        "Conflict updating pod {namespace}/{name}: resource version {expected_version} is stale"
    )]
    Conflict {
        namespace: String,
        name: String,
        expected_version: String,
    },

    /// Network failure, timeout, or a server-side condition worth retrying.
    #[error("Transient error during {operation}: {message}")]
    Transient { operation: String, message: String },

    /// The API server refused the request for another reason (403, 422, ...).
    #[error("Kubernetes API rejected {operation} ({code}): {message}")]
    Rejected {
        operation: String,
        code: u16,
        message: String,
    },

    /// A request body could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PodmgrError {
    /// Whether re-invoking the full operation from the fetch step is safe and
    /// may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Transient { .. })
    }

    pub(crate) fn timeout(operation: &str, after: std::time::Duration) -> Self {
        Self::Transient {
            operation: operation.to_string(),
            message: format!("deadline of {after:?} exceeded"),
        }
    }

    /// Classify a `kube::Error` returned while talking to `namespace/name`.
    ///
    /// 404 and 409 map to [`PodmgrError::NotFound`] and
    /// [`PodmgrError::Conflict`]; throttling and 5xx responses as well as any
    /// transport-level failure are [`PodmgrError::Transient`].
    pub(crate) fn from_kube(
        err: KubeError,
        operation: &str,
        namespace: &str,
        name: &str,
        expected_version: Option<&str>,
    ) -> Self {
        match err {
            KubeError::Api(ae) if ae.code == 404 => Self::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            KubeError::Api(ae) if ae.code == 409 => Self::Conflict {
                namespace: namespace.to_string(),
                name: name.to_string(),
                expected_version: expected_version.unwrap_or_default().to_string(),
            },
            KubeError::Api(ae) if ae.code == 429 || ae.code >= 500 => Self::Transient {
                operation: operation.to_string(),
                message: ae.message,
            },
            KubeError::Api(ae) => Self::Rejected {
                operation: operation.to_string(),
                code: ae.code,
                message: ae.message,
            },
            other => Self::Transient {
                operation: operation.to_string(),
                message: other.to_string(),
            },
        }
    }
}
