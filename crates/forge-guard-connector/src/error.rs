//! Connector error types with transient/permanent classification.

use thiserror::Error;

/// Error from a member source operation.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Failed to reach or bind to the provider.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider rejected the credentials.
    #[error("authentication failed: status {status}")]
    AuthenticationFailed { status: u16 },

    /// The provider answered with an unexpected status.
    #[error("non-200 status code received: {status}")]
    UnexpectedStatus { status: u16 },

    /// The response body could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Transport-level failure.
    #[error("request failed: {message}")]
    RequestFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectorError {
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn request_failed(message: impl Into<String>) -> Self {
        ConnectorError::RequestFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn request_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::RequestFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether retrying without operator intervention can help.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. } | ConnectorError::RequestFailed { .. }
        )
    }
}

/// Result type for member source operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ConnectorError::connection_failed("down").is_transient());
        assert!(ConnectorError::request_failed("timeout").is_transient());
        assert!(!ConnectorError::AuthenticationFailed { status: 401 }.is_transient());
        assert!(!ConnectorError::UnexpectedStatus { status: 500 }.is_transient());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ConnectorError::UnexpectedStatus { status: 503 }.to_string(),
            "non-200 status code received: 503"
        );
        assert_eq!(
            ConnectorError::AuthenticationFailed { status: 403 }.to_string(),
            "authentication failed: status 403"
        );
    }
}
