// Error handling module
// Defines the error taxonomy and response classification

use thiserror::Error;

use crate::http::HttpResponse;

/// Error returned by the remote API for a non-2xx response
///
/// Every variant carries the numeric status and the raw response body so
/// callers can surface the upstream failure verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 401 Unauthorized or 403 Forbidden
    #[error("Authorization error: {status} - {body}")]
    Authorization { status: u16, body: String },

    /// 404 Not Found
    #[error("Not found: {status} - {body}")]
    NotFound { status: u16, body: String },

    /// 429 Too Many Requests
    #[error("Rate limit exceeded: {status} - {body}")]
    RateLimit { status: u16, body: String },

    /// Any 5xx status
    #[error("Server error: {status} - {body}")]
    Server { status: u16, body: String },

    /// Every other non-success status
    #[error("API error: {status} - {body}")]
    Other { status: u16, body: String },
}

impl ApiError {
    /// Classify a status code and body into the matching variant
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 | 403 => ApiError::Authorization { status, body },
            404 => ApiError::NotFound { status, body },
            429 => ApiError::RateLimit { status, body },
            500..=u16::MAX => ApiError::Server { status, body },
            _ => ApiError::Other { status, body },
        }
    }

    /// HTTP status code of the failed response
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Authorization { status, .. }
            | ApiError::NotFound { status, .. }
            | ApiError::RateLimit { status, .. }
            | ApiError::Server { status, .. }
            | ApiError::Other { status, .. } => *status,
        }
    }

    /// Raw response body text
    pub fn body(&self) -> &str {
        match self {
            ApiError::Authorization { body, .. }
            | ApiError::NotFound { body, .. }
            | ApiError::RateLimit { body, .. }
            | ApiError::Server { body, .. }
            | ApiError::Other { body, .. } => body,
        }
    }
}

/// Token store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Token store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token store data is invalid: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Credential or token acquisition failures
#[derive(Error, Debug)]
pub enum AuthError {
    /// Token endpoint answered with a non-2xx status
    #[error("Token endpoint rejected the request: {0}")]
    Rejected(#[source] ApiError),

    /// Token endpoint could not be reached
    #[error("Token request failed: {0}")]
    Transport(#[source] anyhow::Error),

    /// Loading or persisting the token failed
    #[error("Token persistence failed: {0}")]
    Store(#[from] StoreError),

    /// Configuration lacks what the selected grant needs
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

/// Errors surfaced by the client
#[derive(Error, Debug)]
pub enum Error {
    /// Credential/token acquisition failed
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The API answered with a non-2xx status
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The caller's cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// A response was malformed or incomplete
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Network-level failure (timeout, connection error)
    #[error("Transport error: {0}")]
    Transport(#[source] anyhow::Error),

    /// Request payload could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns the API error when the failure came from an HTTP response,
    /// including responses from the token endpoint
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) | Error::Auth(AuthError::Rejected(e)) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Shared success/failure check every resource client applies before decoding
///
/// Passes 2xx responses through untouched and converts anything else into
/// the matching [`ApiError`] variant.
pub fn ensure_success(response: HttpResponse) -> std::result::Result<HttpResponse, ApiError> {
    if response.is_success() {
        return Ok(response);
    }

    let error = ApiError::from_status(response.status, response.text());
    tracing::warn!(
        status = error.status(),
        response_body = %error.body(),
        "API request failed with error response"
    );
    Err(error)
}
