//! Output validator and coherence guard.
//!
//! Every model generation passes through [`OutputValidator::validate`] before
//! it can be published. Rejections carry a specific [`RejectionReason`].

pub mod blocklist;
pub mod coherence;
pub mod language;
pub mod script;
pub mod validator;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use blocklist::redact_secrets;
pub use language::LanguageProfile;
pub use validator::OutputValidator;

/// Why a generation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    TooShort,
    SecretLeak,
    CodeOutput,
    NonLatinOverflow,
    MultiScriptGibberish,
    ConcatenatedGibberish,
    NoTargetLanguage,
    ExcessiveRepetition,
    LowCoherence,
    TooShortAfterTruncation,
    AssistantPreamble,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::TooShort => "too_short",
            RejectionReason::SecretLeak => "secret_leak",
            RejectionReason::CodeOutput => "code_output",
            RejectionReason::NonLatinOverflow => "non_latin_overflow",
            RejectionReason::MultiScriptGibberish => "multi_script_gibberish",
            RejectionReason::ConcatenatedGibberish => "concatenated_gibberish",
            RejectionReason::NoTargetLanguage => "no_target_language",
            RejectionReason::ExcessiveRepetition => "excessive_repetition",
            RejectionReason::LowCoherence => "low_coherence",
            RejectionReason::TooShortAfterTruncation => "too_short_after_truncation",
            RejectionReason::AssistantPreamble => "assistant_preamble",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating one generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub accepted: bool,
    /// Trimmed text, truncated when accepted and over the limit.
    pub text: String,
    pub rejection_reason: Option<RejectionReason>,
    /// Human-readable context for the rejection, e.g. "4 scripts".
    pub detail: Option<String>,
    /// Metric name → value for every check that ran.
    pub diagnostics: BTreeMap<String, f64>,
}

impl ValidationResult {
    pub fn truncated(&self) -> bool {
        self.diagnostics.get("truncated").is_some_and(|v| *v > 0.0)
    }
}
