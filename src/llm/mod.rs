//! Model client.
//!
//! The pipeline only needs "system prompt + user prompt in, text out". The
//! [`LlmProvider`] trait is that seam. HTTP transport comes from rig-core, and
//! [`RigAdapter`] bridges rig's `CompletionModel` to our trait:
//! - **Groq** (default): `llama-3.3-70b-versatile`
//! - **OpenAI**

pub mod output;
pub mod provider;
pub(crate) mod retry;
mod rig_adapter;

pub use output::{cap_temperature, clean_model_output};
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};
pub use rig_adapter::RigAdapter;

use std::sync::Arc;
use std::time::Duration;

use rig::client::CompletionClient;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{ConfigError, LlmError};

pub const GROQ_MODEL: &str = "llama-3.3-70b-versatile";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Groq,
    OpenAi,
}

impl LlmBackend {
    pub fn name(&self) -> &'static str {
        match self {
            LlmBackend::Groq => "groq",
            LlmBackend::OpenAi => "openai",
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            LlmBackend::Groq => "GROQ_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            LlmBackend::Groq => GROQ_MODEL,
            LlmBackend::OpenAi => OPENAI_MODEL,
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(LlmBackend::Groq),
            "openai" => Ok(LlmBackend::OpenAi),
            other => Err(ConfigError::invalid(
                "POST_GUARD_LLM_BACKEND",
                format!("unknown backend '{other}' (expected groq or openai)"),
            )),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub model: String,
    pub api_key: SecretString,
    pub temperature: f32,
    pub temperature_ceiling: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
    /// Total time one `complete` call may spend across retries.
    pub call_budget: Duration,
}

impl LlmConfig {
    /// Defaults for `backend` with the given key.
    pub fn new(backend: LlmBackend, api_key: SecretString) -> Self {
        Self {
            backend,
            model: backend.default_model().to_string(),
            api_key,
            temperature: 1.2,
            temperature_ceiling: output::DEFAULT_TEMPERATURE_CEILING,
            max_tokens: 200,
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: Duration::from_secs(2),
            call_budget: Duration::from_secs(30),
        }
    }

    /// Read `POST_GUARD_LLM_BACKEND` (default groq), the backend's key
    /// (`GROQ_API_KEY` or `OPENAI_API_KEY`), and optional `POST_GUARD_LLM_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("POST_GUARD_LLM_BACKEND") {
            Some(raw) => raw.parse()?,
            None => LlmBackend::Groq,
        };
        let api_key = lookup(backend.key_var())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(backend.key_var().to_string()))?;
        let mut config = Self::new(backend, SecretString::from(api_key));

        if let Some(model) = lookup("POST_GUARD_LLM_MODEL") {
            config.model = model;
        }
        config.temperature = lookup("POST_GUARD_LLM_TEMPERATURE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.temperature);
        config.max_tokens = lookup("POST_GUARD_LLM_MAX_TOKENS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(config.max_tokens);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("llm.model", "must not be empty"));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::invalid("llm.max_tokens", "must be > 0"));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::invalid("llm.max_retries", "must be > 0"));
        }
        if self.call_budget.is_zero() {
            return Err(ConfigError::invalid("llm.call_budget", "must be > 0"));
        }
        Ok(())
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Groq => create_groq_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_groq_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::groq;

    let client: groq::Client =
        groq::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "groq".to_string(),
                reason: format!("Failed to create Groq client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Groq (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, config)))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_reported() {
        let err = LlmConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "GROQ_API_KEY"));
    }

    #[test]
    fn overrides_are_applied() {
        let config = LlmConfig::from_lookup(|key: &str| match key {
            "GROQ_API_KEY" => Some("gsk_test".to_string()),
            "POST_GUARD_LLM_MODEL" => Some("llama-3.1-8b-instant".to_string()),
            "POST_GUARD_LLM_MAX_TOKENS" => Some("120".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.backend, LlmBackend::Groq);
        assert_eq!(config.model, "llama-3.1-8b-instant");
        assert_eq!(config.max_tokens, 120);
    }

    #[test]
    fn openai_backend_reads_its_own_key() {
        let config = LlmConfig::from_lookup(|key: &str| match key {
            "POST_GUARD_LLM_BACKEND" => Some("OpenAI".to_string()),
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.backend, LlmBackend::OpenAi);
        assert_eq!(config.model, OPENAI_MODEL);

        let err = LlmConfig::from_lookup(|key: &str| match key {
            "POST_GUARD_LLM_BACKEND" => Some("openai".to_string()),
            "GROQ_API_KEY" => Some("gsk_test".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "OPENAI_API_KEY"));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = LlmConfig::from_lookup(|key: &str| match key {
            "POST_GUARD_LLM_BACKEND" => Some("mistral".to_string()),
            _ => Some("key".to_string()),
        })
        .unwrap_err();
        assert!(err.to_string().contains("mistral"));
    }

    #[test]
    fn test_create_groq_provider() {
        // rig-core clients accept any string as API key at construction time.
        // The actual auth failure happens when making a request.
        let config = LlmConfig::new(LlmBackend::Groq, SecretString::from("gsk_test"));
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), GROQ_MODEL);
    }

    #[test]
    fn test_create_openai_provider() {
        let config = LlmConfig::new(LlmBackend::OpenAi, SecretString::from("sk-test"));
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), OPENAI_MODEL);
    }
}
