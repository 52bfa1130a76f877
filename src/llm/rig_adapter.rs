//! Bridges rig's `CompletionModel` to our [`LlmProvider`] trait.

use std::time::Duration;

use async_trait::async_trait;
use rig::completion::message::{AssistantContent, Message};
use rig::completion::{CompletionError, CompletionModel};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::LlmConfig;
use crate::llm::output::cap_temperature;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};
use crate::llm::retry::{RetryPolicy, with_retry};

/// Wraps any rig completion model with our defaults, temperature cap and retry.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: String,
    temperature: f32,
    temperature_ceiling: f32,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, config: &LlmConfig) -> Self {
        Self {
            model,
            model_name: config.model.clone(),
            provider: config.backend.name().to_string(),
            temperature: config.temperature,
            temperature_ceiling: config.temperature_ceiling,
            max_tokens: config.max_tokens,
            retry: RetryPolicy {
                max_attempts: config.max_retries,
                base_delay: config.backoff,
                attempt_timeout: config.request_timeout,
                budget: config.call_budget,
            },
        }
    }
}

/// The parts of a rig request: preamble, earlier turns, and the prompt.
struct RigMessages {
    preamble: Option<String>,
    history: Vec<Message>,
    prompt: Message,
}

fn to_rig_messages(provider: &str, messages: &[ChatMessage]) -> Result<RigMessages, LlmError> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let mut turns: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != Role::System).collect();

    let prompt = match turns.pop() {
        Some(last) if last.role == Role::User => Message::user(last.content.clone()),
        _ => {
            return Err(LlmError::InvalidRequest {
                provider: provider.to_string(),
                reason: "request must end with a user message".to_string(),
            });
        }
    };
    let history = turns
        .into_iter()
        .map(|m| match m.role {
            Role::Assistant => Message::assistant(m.content.clone()),
            _ => Message::user(m.content.clone()),
        })
        .collect();

    Ok(RigMessages {
        preamble: (!system.is_empty()).then(|| system.join("\n\n")),
        history,
        prompt,
    })
}

/// rig reports provider failures as text. Pick out the cases the retry loop
/// treats differently.
fn map_completion_error(provider: &str, error: CompletionError) -> LlmError {
    let provider = provider.to_string();
    match error {
        CompletionError::JsonError(e) => LlmError::Json(e),
        CompletionError::ResponseError(reason) => LlmError::InvalidResponse { provider, reason },
        CompletionError::ProviderError(reason) => {
            let lower = reason.to_lowercase();
            if lower.contains("rate limit") || lower.contains("429") {
                LlmError::RateLimited {
                    provider,
                    retry_after: None,
                }
            } else if lower.contains("401")
                || lower.contains("invalid api key")
                || lower.contains("unauthorized")
            {
                LlmError::AuthFailed { provider }
            } else {
                LlmError::RequestFailed { provider, reason }
            }
        }
        other => LlmError::RequestFailed {
            provider,
            reason: other.to_string(),
        },
    }
}

fn saturating_u32(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let messages = to_rig_messages(&self.provider, &request.messages)?;
        let temperature = cap_temperature(
            request.temperature.unwrap_or(self.temperature),
            self.temperature_ceiling,
        );
        let max_tokens = request.max_tokens.unwrap_or(self.max_tokens);

        let response = with_retry(self.retry, &self.provider, |timeout: Duration| {
            let mut builder = self
                .model
                .completion_request(messages.prompt.clone())
                .messages(messages.history.clone())
                .temperature(f64::from(temperature))
                .max_tokens(u64::from(max_tokens));
            if let Some(preamble) = &messages.preamble {
                builder = builder.preamble(preamble.clone());
            }
            async move {
                match tokio::time::timeout(timeout, builder.send()).await {
                    Ok(result) => result.map_err(|e| map_completion_error(&self.provider, e)),
                    Err(_) => Err(LlmError::Timeout(timeout)),
                }
            }
        })
        .await?;

        let mut content = String::new();
        let mut finish_reason = FinishReason::Stop;
        for part in response.choice.iter() {
            match part {
                AssistantContent::Text(text) => content.push_str(&text.text),
                _ => finish_reason = FinishReason::Unknown,
            }
        }
        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.provider.clone(),
                reason: "empty completion".to_string(),
            });
        }

        debug!(
            model = %self.model_name,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Completion received"
        );
        Ok(CompletionResponse {
            content,
            input_tokens: saturating_u32(response.usage.input_tokens),
            output_tokens: saturating_u32(response.usage.output_tokens),
            finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_become_the_preamble() {
        let messages = vec![
            ChatMessage::system("Eres un boricua."),
            ChatMessage::system("SECURITY RULES"),
            ChatMessage::user("¿Qué hay?"),
            ChatMessage::assistant("Na, aquí."),
            ChatMessage::user("¿Y la luz?"),
        ];
        let split = to_rig_messages("groq", &messages).unwrap();
        assert_eq!(
            split.preamble.as_deref(),
            Some("Eres un boricua.\n\nSECURITY RULES")
        );
        assert_eq!(split.history.len(), 2);
    }

    #[test]
    fn request_without_trailing_user_message_is_rejected() {
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("hola"),
            ChatMessage::assistant("dime"),
        ];
        assert!(matches!(
            to_rig_messages("groq", &messages),
            Err(LlmError::InvalidRequest { .. })
        ));
        assert!(to_rig_messages("groq", &[ChatMessage::system("sys")]).is_err());
    }

    #[test]
    fn provider_errors_are_classified() {
        let rate = map_completion_error(
            "groq",
            CompletionError::ProviderError("429 Too Many Requests: rate limit reached".into()),
        );
        assert!(matches!(rate, LlmError::RateLimited { .. }));
        assert!(rate.is_retryable());

        let auth =
            map_completion_error("groq", CompletionError::ProviderError("Invalid API Key".into()));
        assert!(matches!(auth, LlmError::AuthFailed { .. }));
        assert!(!auth.is_retryable());

        let server =
            map_completion_error("groq", CompletionError::ProviderError("503 overloaded".into()));
        assert!(server.is_retryable());

        let bad = map_completion_error("groq", CompletionError::ResponseError("no choices".into()));
        assert!(!bad.is_retryable());
    }

    #[test]
    fn token_counts_saturate() {
        assert_eq!(saturating_u32(12), 12);
        assert_eq!(saturating_u32(u64::MAX), u32::MAX);
    }
}
