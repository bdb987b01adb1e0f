//! Forge client error types.

use thiserror::Error;

/// Error from a forge API call.
///
/// Rate limiting is not a dedicated variant: the forge reports it inside
/// error message bodies, and the reconcilers detect it by parsing the
/// rendered error string. `Api` therefore preserves the response body.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// The API answered with an unexpected status.
    #[error("forge api error: status {status}: {message}")]
    Api { status: u16, message: String },

    /// The target user does not exist on the forge (404 on membership add).
    #[error("user not found on forge")]
    MemberNotFound,

    /// Authentication or token exchange failed.
    #[error("forge authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure.
    #[error("forge request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be decoded.
    #[error("forge response decode failed: {0}")]
    Decode(String),
}

impl ForgeError {
    /// API error helper preserving the response body for string matching.
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        ForgeError::Api {
            status,
            message: message.into(),
        }
    }
}

/// Result type for forge operations.
pub type ForgeResult<T> = Result<T, ForgeError>;
