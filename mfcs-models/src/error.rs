//! Error types for embedding backends.

use mfcs_core::EmbedderError;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to an embedding backend.
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials not found for provider.
    #[error("credentials not found for provider: {0}")]
    CredentialsNotFound(String),

    /// Provider API returned a non-success status.
    #[error("provider API error: {status}: {body}")]
    ProviderApi { status: u16, body: String },

    /// Request failed before a response arrived.
    #[error("request failed: {0}")]
    Request(String),

    /// Response did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Request(error.to_string())
    }
}

impl From<Error> for EmbedderError {
    fn from(error: Error) -> Self {
        match error {
            Error::ProviderApi { status, body } => EmbedderError::Api {
                status,
                message: body,
            },
            Error::InvalidResponse(message) => EmbedderError::InvalidResponse(message),
            Error::Serialization(e) => EmbedderError::InvalidResponse(e.to_string()),
            other => EmbedderError::Request(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats_correctly() {
        let err = Error::ProviderApi {
            status: 404,
            body: "model not found".to_string(),
        };
        assert_eq!(err.to_string(), "provider API error: 404: model not found");
    }

    #[test]
    fn error_from_serde_json() {
        let json_err: serde_json::Error = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn provider_api_maps_to_embedder_api() {
        let err: EmbedderError = Error::ProviderApi {
            status: 500,
            body: "boom".to_string(),
        }
        .into();
        assert!(matches!(err, EmbedderError::Api { status: 500, .. }));
    }

    #[test]
    fn request_maps_to_embedder_request() {
        let err: EmbedderError = Error::Request("connection refused".to_string()).into();
        assert!(err.to_string().contains("connection refused"));
    }
}
