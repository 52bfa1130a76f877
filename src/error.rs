//! Error types for the generation safety pipeline.
//!
//! Policy outcomes (risky input, exhausted budget, rejected output) are not
//! errors. They come back as typed decisions. The enums here cover broken
//! configuration, model-client failures, and persistence failures.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid request for {provider}: {reason}")]
    InvalidRequest { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RequestFailed { .. }
            | LlmError::RateLimited { .. }
            | LlmError::Timeout(_) => true,
            LlmError::InvalidRequest { .. }
            | LlmError::InvalidResponse { .. }
            | LlmError::AuthFailed { .. }
            | LlmError::Json(_) => false,
        }
    }
}

/// Persistence errors for the ledger, history, and seen-item stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error on {path}: {source}")]
    Serialization {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_errors_convert_into_error() {
        let err: Error = ConfigError::MissingEnvVar("GROQ_API_KEY".into()).into();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("GROQ_API_KEY"));
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(
            !LlmError::InvalidRequest {
                provider: "groq".into(),
                reason: "no user message".into(),
            }
            .is_retryable()
        );
    }
}
