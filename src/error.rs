use thiserror::Error;

/// Type alias for Result with SorterError
pub type Result<T> = std::result::Result<T, SorterError>;

/// Error types for the mail sorter
///
/// Nothing in the crate recovers from these locally except the classifier,
/// which skips messages that fail with [`SorterError::InvalidMessageFormat`].
#[derive(Error, Debug)]
pub enum SorterError {
    /// Gmail API returned an error not covered by a more specific variant
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed (bad client secret, declined consent, refresh failure)
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A label with the same name already exists (409)
    #[error("Label conflict: {0}")]
    LabelConflict(String),

    /// Quota or rate limit exceeded (429)
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Network-related error (connection issues, TLS, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Message payload is missing something the classifier needs
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Label-related errors
    #[error("Label error: {0}")]
    LabelError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl SorterError {
    /// Map an HTTP status code returned by the Gmail API to an error
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => SorterError::BadRequest(message),
            401 => SorterError::AuthError(message),
            403 => SorterError::Forbidden(message),
            404 => SorterError::NotFound(message),
            409 => SorterError::LabelConflict(message),
            429 => SorterError::QuotaExceeded(message),
            500..=599 => SorterError::ServerError { status, message },
            _ => SorterError::ApiError(format!("HTTP {}: {}", status, message)),
        }
    }
}

impl From<google_gmail1::Error> for SorterError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            // Non-success response whose body was not JSON
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                SorterError::from_status(
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown").to_string(),
                )
            }
            // Non-success response with a JSON error body: {"error": {"code": 409, "message": ...}}
            google_gmail1::Error::BadRequest(ref body) => {
                let code = body
                    .pointer("/error/code")
                    .and_then(|c| c.as_u64())
                    .and_then(|c| u16::try_from(c).ok());
                let message = body
                    .pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| body.to_string());

                match code {
                    Some(code) => SorterError::from_status(code, message),
                    None => SorterError::BadRequest(message),
                }
            }
            google_gmail1::Error::HttpError(ref err) => {
                SorterError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => SorterError::NetworkError(err.to_string()),
            _ => SorterError::ApiError(error.to_string()),
        }
    }
}
