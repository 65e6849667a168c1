//! Errors of the backend client.

use http::StatusCode;
use memescan::analysis::AnalysisError;

/// Errors that can occur while talking to the analysis backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// Invalid header value.
    #[error("invalid header value: {context}")]
    InvalidHeader {
        /// Human-readable context.
        context: &'static str,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The backend declined the request with a client error.
    #[error("{context} rejected with {status}: {message}")]
    Rejected {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The backend's `error` message, or the raw body.
        message: String,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl From<BackendClientError> for AnalysisError {
    fn from(error: BackendClientError) -> Self {
        match error {
            BackendClientError::Rejected {
                status, message, ..
            } => Self::Rejected {
                status: Some(status.as_u16()),
                message,
            },
            other => Self::Transient(other.to_string()),
        }
    }
}
