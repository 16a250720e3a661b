//! Error types for the chatter client
//!
//! Transport failures are classified once, at the gateway boundary, into
//! the three kinds the engine understands: network, API and malformed
//! response. The engine wraps them in [`FeedError`] together with its own
//! validation and authorization outcomes.

use std::time::Duration;
use thiserror::Error;

/// Result type for engine and form operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Coarse failure classes reported by the remote feed gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request never produced an HTTP response
    Network,
    /// The server answered with a non-success status
    Api,
    /// The server answered with success but an unexpected payload
    Malformed,
}

/// Failures raised by a [`crate::gateway::FeedGateway`] implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Connection refused, DNS failure, reset, ...
    #[error("Network failure: {0}")]
    Network(String),

    /// No response within the configured request timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success status with the server's `{ message }` payload
    #[error("API failure ({status}): {message}")]
    Api { status: u16, message: String },

    /// Success status but the body did not match the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) | Self::Timeout(_) => FailureKind::Network,
            Self::Api { .. } => FailureKind::Api,
            Self::MalformedResponse(_) => FailureKind::Malformed,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::MalformedResponse(err.to_string())
    }
}

/// Outcome of a failed engine or form operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Draft rejected before reaching the gateway
    #[error("Validation error: {0}")]
    Validation(String),

    /// Identity is anonymous or does not own the target post
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Target post is not in the current feed
    #[error("Post not found: {0}")]
    NotFound(String),

    /// The engine was shut down before the operation completed
    #[error("Feed engine is closed")]
    Closed,
}

impl FeedError {
    /// Whether re-invoking the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Gateway(e) => matches!(e.kind(), FailureKind::Network)
                || matches!(e, GatewayError::Api { status, .. } if *status >= 500),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::Api {
            status: 500,
            message: "Failed to fetch data".to_string(),
        };
        assert_eq!(err.to_string(), "API failure (500): Failed to fetch data");

        let err = FeedError::NotFound("p1".to_string());
        assert_eq!(err.to_string(), "Post not found: p1");
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            GatewayError::Network("refused".into()).kind(),
            FailureKind::Network
        );
        assert_eq!(
            GatewayError::Timeout(Duration::from_secs(10)).kind(),
            FailureKind::Network
        );
        assert_eq!(
            GatewayError::MalformedResponse("missing _id".into()).kind(),
            FailureKind::Malformed
        );
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err: GatewayError = json_err.into();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }

    #[test]
    fn test_transient_classification() {
        let server = FeedError::Gateway(GatewayError::Api {
            status: 503,
            message: "down".into(),
        });
        let client = FeedError::Gateway(GatewayError::Api {
            status: 400,
            message: "bad".into(),
        });
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(!FeedError::Validation("empty".into()).is_transient());
    }
}
