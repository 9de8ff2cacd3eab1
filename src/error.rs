//! Error types for the Overseerr provider.

use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors raised by the Overseerr HTTP client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The configured base URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The API key cannot be sent as a header value.
    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    /// The server rejected the API key.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// The server answered with a non-success status.
    #[error("Overseerr API error (HTTP {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message taken from the response body, or the status text.
        message: String,
    },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization {
        /// What went wrong, with a short body preview.
        message: String,
        /// The full response body.
        body: String,
    },
}

/// Errors that can occur while serving provider requests.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal SDK error occurred.
    #[error("SDK error: {0}")]
    Sdk(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// A call to the remote service failed.
    #[error("{summary}: {detail}")]
    Client {
        /// Short summary shown to the user.
        summary: String,
        /// The underlying remote error text.
        detail: String,
    },

    /// Invalid request from the host.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Build a [`ProviderError::Client`] with the standard `Client Error` summary.
    ///
    /// # Examples
    ///
    /// ```
    /// use overseerr_provider::ProviderError;
    ///
    /// let err = ProviderError::client("Unable to read config, got error: boom");
    /// assert_eq!(err.to_string(), "Client Error: Unable to read config, got error: boom");
    /// ```
    pub fn client(detail: impl Into<String>) -> Self {
        Self::Client {
            summary: "Client Error".to_string(),
            detail: detail.into(),
        }
    }

    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(msg) => msg,
            Self::Sdk(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Transport(_err) => "transport error (see Debug output)",
            Self::Client { detail, .. } => detail,
            Self::InvalidRequest(msg) => msg,
        }
    }

    /// Convert this error into the diagnostic reported to the host.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Client { summary, detail } => {
                Diagnostic::error(summary.clone()).with_detail(detail.clone())
            }
            other => Diagnostic::error(other.to_string()),
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Sdk(msg) => tonic::Status::internal(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            }
            ProviderError::Transport(err) => {
                tonic::Status::unavailable(format!("Transport error: {}", err))
            }
            ProviderError::Client { summary, detail } => {
                tonic::Status::unavailable(format!("{}: {}", summary, detail))
            }
            ProviderError::InvalidRequest(msg) => tonic::Status::invalid_argument(msg),
        }
    }
}
