//! Error types for the authenticated request pipeline.

use thiserror::Error;

/// Why a token renewal failed.
///
/// Cloned to every caller waiting on the same renewal, so it carries plain
/// data only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    /// No stored credential, so nothing to renew with
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// The refresh endpoint answered with a non-success status
    #[error("Refresh token rejected: HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The refresh endpoint could not be reached
    #[error("Refresh endpoint unreachable: {0}")]
    Unreachable(String),

    /// The refresh endpoint answered with something we cannot use
    #[error("Malformed refresh response: {0}")]
    MalformedResponse(String),
}

impl RenewalError {
    /// Classify a gateway error for fan-out to waiters.
    pub fn from_gateway(err: AuthError) -> Self {
        match err {
            AuthError::Api { status, message } => Self::Rejected { status, message },
            AuthError::InvalidCredentials(message) => Self::Rejected {
                status: 401,
                message,
            },
            AuthError::InvalidResponse(reason) => Self::MalformedResponse(reason),
            AuthError::Json(err) => Self::MalformedResponse(err.to_string()),
            other => Self::Unreachable(other.to_string()),
        }
    }
}

/// Authentication pipeline error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Invalid email or password
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Renewal failed; the session has been torn down
    #[error("Authentication failed: {0}")]
    AuthFailure(#[from] RenewalError),

    /// Transport failure reaching the backend
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success response from a JSON endpoint
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body could not be used
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request could not be built (bad header value, body encoding, ...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// OAuth callback flow error
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Invalid state transition in the session FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AuthError::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            AuthError::InvalidRequest(err.to_string())
        } else {
            AuthError::Network(err.to_string())
        }
    }
}

impl AuthError {
    /// Returns true if this error means the session is gone and the user has
    /// to log in again.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, AuthError::AuthFailure(_))
    }
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;
