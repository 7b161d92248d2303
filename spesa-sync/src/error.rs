//! Error types for the sync layer.

use spesa_core::ApiFailure;
use thiserror::Error;

use crate::transport::{ResponseBody, TransportError};

/// Message shown for connectivity failures; the underlying cause stays in logs.
pub const NETWORK_FAILURE_MESSAGE: &str = "Unable to reach the server";

/// Every failure a query or mutation can settle with.
///
/// Errors are `Clone` so that one in-flight fetch can hand the same failure
/// to every caller that joined it.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("API error: {0}")]
    Api(ApiFailure),

    #[error("Validation error: {0}")]
    Validation(ApiFailure),

    #[error("Failed to decode {kind} response: {reason}")]
    Decode { kind: String, reason: String },

    #[error("Failed to encode request for {kind}: {reason}")]
    Encode { kind: String, reason: String },

    #[error("Cache consistency violated for {key}: {reason}")]
    CacheConsistency { key: String, reason: String },

    #[error("Credential store error: {reason}")]
    Credentials { reason: String },
}

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Classify a normalized API failure.
    pub fn from_failure(failure: ApiFailure) -> Self {
        if failure.is_validation() {
            Self::Validation(failure)
        } else {
            Self::Api(failure)
        }
    }

    pub fn decode(kind: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            kind: kind.into(),
            reason: err.to_string(),
        }
    }

    pub fn encode(kind: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            kind: kind.into(),
            reason: err.to_string(),
        }
    }

    /// One display string, suitable for a toast.
    pub fn message(&self) -> String {
        match self {
            Self::Network { .. } => NETWORK_FAILURE_MESSAGE.to_string(),
            Self::Api(failure) | Self::Validation(failure) => failure.message.clone(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(failure) | Self::Validation(failure) => Some(failure.status),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Api(failure) | Self::Validation(failure) => failure.is_unauthorized(),
            _ => false,
        }
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(reason) => Self::Network { reason },
            TransportError::Api { status, body } => {
                let failure = match body {
                    ResponseBody::Json(value) => ApiFailure::from_json(status, &value),
                    ResponseBody::Text(text) => ApiFailure::from_body(status, &text),
                    ResponseBody::Empty => ApiFailure::from_body(status, ""),
                };
                Self::from_failure(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn network_errors_use_generic_message() {
        let err = SyncError::from(TransportError::Network("dns failure".into()));
        assert!(err.is_network());
        assert_eq!(err.message(), NETWORK_FAILURE_MESSAGE);
        assert!(err.to_string().contains("dns failure"));
    }

    #[test]
    fn json_error_body_is_normalized() {
        let err = SyncError::from(TransportError::Api {
            status: 400,
            body: ResponseBody::Json(json!({"message": "Invalid name"})),
        });
        assert_eq!(err.status(), Some(400));
        assert_eq!(err.message(), "Invalid name");
        assert!(matches!(err, SyncError::Api(_)));
    }

    #[test]
    fn field_errors_become_validation() {
        let err = SyncError::from(TransportError::Api {
            status: 400,
            body: ResponseBody::Json(json!({"errors": [{"msg": "a"}, {"msg": "b"}]})),
        });
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(err.message(), "a; b");
    }

    #[test]
    fn text_body_is_kept_verbatim() {
        let err = SyncError::from(TransportError::Api {
            status: 503,
            body: ResponseBody::Text("Service Unavailable".into()),
        });
        assert_eq!(err.message(), "Service Unavailable");
    }

    #[test]
    fn unauthorized_is_detected() {
        let err = SyncError::from(TransportError::Api {
            status: 401,
            body: ResponseBody::Empty,
        });
        assert!(err.is_unauthorized());
    }
}
