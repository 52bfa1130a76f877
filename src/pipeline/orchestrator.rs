//! Generation orchestrator: retry until a candidate is valid and new.
//!
//! The orchestrator never touches the interaction budget or the input
//! sanitizer. Callers reserve a reply before asking for a generation, so a
//! failed or timed-out attempt costs nothing extra.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::{ConfigError, LlmError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, clean_model_output};
use crate::output::validator::smart_truncate;
use crate::output::{OutputValidator, RejectionReason, ValidationResult, redact_secrets};
use crate::pipeline::history::History;
use crate::pipeline::similarity::max_similarity;
use crate::safety::harden_system_prompt;
use crate::stats::Stats;
use crate::text::char_len;

/// Why one generator call did not produce the result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptFailure {
    Generator { error: String },
    Timeout,
    Rejected { reason: RejectionReason },
    Duplicate { similarity: f64 },
}

/// What [`Orchestrator::generate_safe`] hands back. Always carries some text,
/// possibly empty if the generator never produced anything.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub text: String,
    /// The text passed validation (and, outside the fallback, the novelty check).
    pub accepted: bool,
    /// The text came from the extra call after all attempts were used.
    pub from_fallback: bool,
    /// Generator calls made, fallback included.
    pub attempts: usize,
    pub failures: Vec<AttemptFailure>,
    /// Validation of the returned text, when it was validated.
    pub validation: Option<ValidationResult>,
}

/// Build a chat request with the defensive block appended to `system_prompt`.
pub fn build_request(system_prompt: &str, user_prompt: &str) -> CompletionRequest {
    CompletionRequest::new(vec![
        ChatMessage::system(harden_system_prompt(system_prompt)),
        ChatMessage::user(user_prompt),
    ])
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    validator: OutputValidator,
    stats: Arc<Stats>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, stats: Arc<Stats>) -> Result<Self, ConfigError> {
        config.validate()?;
        let validator = OutputValidator::new(config.validator, Arc::clone(&stats))?;
        Ok(Self {
            config,
            validator,
            stats,
        })
    }

    /// Call `generator` until a candidate passes validation and is not too
    /// close to the recent history, then fall back to one validator-only
    /// call, then to the redacted, truncated raw text. Never fails.
    pub async fn generate_safe<F, Fut>(&self, mut generator: F, history: &History) -> GenerationOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, LlmError>>,
    {
        let recent = history.recent_texts(self.config.recent_window);
        let mut failures = Vec::new();
        let mut last_raw: Option<String> = None;

        for attempt in 1..=self.config.max_attempts {
            let raw = match self.call(&mut generator).await {
                Ok(raw) => raw,
                Err(failure) => {
                    failures.push(failure);
                    continue;
                }
            };

            let result = self.validator.validate(&raw);
            last_raw = Some(raw);
            if let Some(reason) = result.rejection_reason {
                debug!(attempt, reason = %reason, "Attempt rejected");
                failures.push(AttemptFailure::Rejected { reason });
                continue;
            }

            let similarity = max_similarity(&result.text, &recent);
            if similarity >= self.config.similarity_threshold {
                self.stats.record_duplicate();
                warn!(attempt, similarity, "Generation too close to recent history");
                failures.push(AttemptFailure::Duplicate { similarity });
                continue;
            }

            info!(attempt, chars = char_len(&result.text), "Generation accepted");
            return GenerationOutcome {
                text: result.text.clone(),
                accepted: true,
                from_fallback: false,
                attempts: attempt,
                failures,
                validation: Some(result),
            };
        }

        self.stats.record_fallback();
        warn!(
            attempts = self.config.max_attempts,
            "All attempts used, trying one fallback generation"
        );
        let attempts = self.config.max_attempts + 1;

        match self.call(&mut generator).await {
            Ok(raw) => {
                let result = self.validator.validate(&raw);
                if result.accepted {
                    info!(chars = char_len(&result.text), "Fallback generation accepted");
                    return GenerationOutcome {
                        text: result.text.clone(),
                        accepted: true,
                        from_fallback: true,
                        attempts,
                        failures,
                        validation: Some(result),
                    };
                }
                if let Some(reason) = result.rejection_reason {
                    failures.push(AttemptFailure::Rejected { reason });
                }
                let text = self.last_resort(&raw);
                warn!(chars = char_len(&text), "Fallback rejected, returning raw text");
                GenerationOutcome {
                    text,
                    accepted: false,
                    from_fallback: true,
                    attempts,
                    failures,
                    validation: Some(result),
                }
            }
            Err(failure) => {
                failures.push(failure);
                let text = last_raw
                    .as_deref()
                    .map(|raw| self.last_resort(raw))
                    .unwrap_or_default();
                warn!(chars = char_len(&text), "Fallback failed, returning last raw candidate");
                GenerationOutcome {
                    text,
                    accepted: false,
                    from_fallback: true,
                    attempts,
                    failures,
                    validation: None,
                }
            }
        }
    }

    /// [`generate_safe`](Self::generate_safe) over a chat model, cleaning each
    /// completion before it is validated.
    pub async fn generate_with_llm(
        &self,
        provider: &dyn LlmProvider,
        request: CompletionRequest,
        history: &History,
    ) -> GenerationOutcome {
        self.generate_safe(
            move || {
                let request = request.clone();
                async move {
                    provider
                        .complete(request)
                        .await
                        .map(|response| clean_model_output(&response.content))
                }
            },
            history,
        )
        .await
    }

    async fn call<F, Fut>(&self, generator: &mut F) -> Result<String, AttemptFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, LlmError>>,
    {
        self.stats.record_attempt();
        match tokio::time::timeout(self.config.call_timeout, generator()).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                self.stats.record_generator_failure();
                warn!(error = %e, "Generator failed");
                Err(AttemptFailure::Generator {
                    error: e.to_string(),
                })
            }
            Err(_) => {
                self.stats.record_generator_failure();
                warn!(timeout = ?self.config.call_timeout, "Generator timed out");
                Err(AttemptFailure::Timeout)
            }
        }
    }

    fn last_resort(&self, raw: &str) -> String {
        smart_truncate(&redact_secrets(raw.trim()), self.config.validator.max_chars)
    }
}
