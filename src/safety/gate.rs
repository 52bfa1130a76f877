//! Inbound gate: risk policy first, then the interaction budget.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::budget::{Denial, InteractionBudget};
use crate::safety::sanitizer::{InputDecision, InputSanitizer};

/// A piece of external text addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundText {
    pub text: String,
    pub subject_id: String,
    pub subject_label: String,
    pub source_platform: String,
}

impl InboundText {
    pub fn new(
        text: impl Into<String>,
        subject_id: impl Into<String>,
        subject_label: impl Into<String>,
        source_platform: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            subject_id: subject_id.into(),
            subject_label: subject_label.into(),
            source_platform: source_platform.into(),
        }
    }
}

/// What the caller may do with an inbound text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateDecision {
    /// Too risky to use at all. No budget was consumed.
    Blocked {
        risk_score: u32,
        matched_patterns: Vec<String>,
    },
    /// Usable, but the subject or the bot is out of replies.
    OverBudget {
        reason: String,
        denial: Option<Denial>,
    },
    /// A reply was reserved; embed `prompt_fragment` in the prompt.
    Admitted {
        prompt_fragment: String,
        risk_score: u32,
        guarded: bool,
    },
}

impl GateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, GateDecision::Admitted { .. })
    }
}

/// Sanitizer and budget, applied in that order.
pub struct InboundGate {
    sanitizer: InputSanitizer,
    budget: Arc<InteractionBudget>,
}

impl InboundGate {
    pub fn new(sanitizer: InputSanitizer, budget: Arc<InteractionBudget>) -> Self {
        Self { sanitizer, budget }
    }

    /// Screen `inbound` and, if usable, reserve a reply for its subject.
    pub fn admit(&self, inbound: &InboundText) -> GateDecision {
        let (assessment, decision) = self
            .sanitizer
            .screen(&inbound.text, &inbound.source_platform);

        let (prompt_fragment, risk_score, guarded) = match decision {
            InputDecision::Blocked { risk_score } => {
                return GateDecision::Blocked {
                    risk_score,
                    matched_patterns: assessment.matched_patterns,
                };
            }
            InputDecision::Guarded {
                prompt_fragment,
                risk_score,
            } => (prompt_fragment, risk_score, true),
            InputDecision::Clean {
                prompt_fragment,
                risk_score,
            } => (prompt_fragment, risk_score, false),
        };

        let budget = self
            .budget
            .check_and_reserve(&inbound.subject_id, &inbound.subject_label);
        if !budget.allowed {
            info!(
                subject = %inbound.subject_id,
                reason = %budget.reason,
                "Reply skipped, budget exhausted"
            );
            return GateDecision::OverBudget {
                reason: budget.reason,
                denial: budget.denial,
            };
        }

        GateDecision::Admitted {
            prompt_fragment,
            risk_score,
            guarded,
        }
    }
}
