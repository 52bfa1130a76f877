//! The validation state machine.
//!
//! Checks run in a fixed order and the first hard failure wins. Gibberish
//! checks see the full text; the coherence score sees only what would be
//! published.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::config::ValidatorOptions;
use crate::error::ConfigError;
use crate::output::blocklist::{self, BlockKind};
use crate::output::coherence::{
    WordStats, coherence_score, marker_ratio, significant_tokens, top_repetition,
};
use crate::output::script::{non_latin_ratio, scripts_present};
use crate::output::{RejectionReason, ValidationResult, redact_secrets};
use crate::stats::Stats;
use crate::text::{char_len, prefix_chars};

/// More over-long tokens than this is token merging.
const MAX_LONG_TOKENS: usize = 5;
/// A single token above this share of all tokens is a loop...
const REPETITION_RATIO: f64 = 0.3;
/// ...if it also appears more than this many times.
const REPETITION_MIN_COUNT: usize = 4;
/// Texts with this many words or fewer skip the coherence check.
const COHERENCE_MIN_WORDS: usize = 10;
/// Truncation only uses a boundary past this share of the limit.
const TRUNCATION_FLOOR: f64 = 0.4;

/// Openers of a chat assistant talking about the post instead of writing it.
static ASSISTANT_PREAMBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:sure\b|of course\b|i['’]d be happy|certainly\b|as an ai\b|here['’]s\b|here is\b|let me\b)",
    )
    .expect("valid regex")
});

/// Validator bound to one set of options.
pub struct OutputValidator {
    options: ValidatorOptions,
    stats: Arc<Stats>,
}

impl OutputValidator {
    pub fn new(options: ValidatorOptions, stats: Arc<Stats>) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self { options, stats })
    }

    /// Validate one generation, logging and counting the outcome.
    pub fn validate(&self, text: &str) -> ValidationResult {
        let result = validate(text, &self.options);
        match result.rejection_reason {
            Some(reason) => {
                warn!(
                    reason = %reason,
                    detail = result.detail.as_deref().unwrap_or(""),
                    excerpt = %redact_secrets(prefix_chars(&result.text, 60)),
                    "Generation rejected"
                );
                self.stats.record_rejected(reason);
            }
            None => {
                debug!(
                    chars = char_len(&result.text),
                    truncated = result.truncated(),
                    "Generation accepted"
                );
                self.stats.record_accepted(result.truncated());
            }
        }
        result
    }
}

struct Run {
    text: String,
    diagnostics: BTreeMap<String, f64>,
}

impl Run {
    fn record(&mut self, metric: &str, value: f64) {
        self.diagnostics.insert(metric.to_string(), value);
    }

    fn reject(self, reason: RejectionReason, detail: impl Into<String>) -> ValidationResult {
        ValidationResult {
            accepted: false,
            text: self.text,
            rejection_reason: Some(reason),
            detail: Some(detail.into()),
            diagnostics: self.diagnostics,
        }
    }

    fn accept(self) -> ValidationResult {
        ValidationResult {
            accepted: true,
            text: self.text,
            rejection_reason: None,
            detail: None,
            diagnostics: self.diagnostics,
        }
    }
}

/// Validate `text` against `options`. Pure; no logging or counting.
pub fn validate(text: &str, options: &ValidatorOptions) -> ValidationResult {
    let full = text.trim();
    let mut run = Run {
        text: full.to_string(),
        diagnostics: BTreeMap::new(),
    };

    let length = char_len(full);
    if length < options.min_chars {
        return run.reject(RejectionReason::TooShort, format!("{length} chars"));
    }
    run.record("overflow_ratio", length as f64 / options.max_chars as f64);

    run.record("code_lines", blocklist::code_line_count(full) as f64);
    if let Some(hit) = blocklist::scan(full) {
        let reason = match hit.kind {
            BlockKind::Secret => RejectionReason::SecretLeak,
            BlockKind::Code => RejectionReason::CodeOutput,
        };
        return run.reject(reason, hit.name);
    }

    let non_latin = non_latin_ratio(full);
    run.record("non_latin_ratio", non_latin);
    if non_latin > options.max_non_latin_ratio {
        return run.reject(
            RejectionReason::NonLatinOverflow,
            format!("{:.0}% non-Latin", non_latin * 100.0),
        );
    }

    let scripts = scripts_present(full);
    run.record("script_count", scripts.len() as f64);
    if scripts.len() > options.max_scripts {
        let names: Vec<&str> = scripts.into_iter().collect();
        return run.reject(
            RejectionReason::MultiScriptGibberish,
            format!("{} scripts ({})", names.len(), names.join(", ")),
        );
    }

    let full_stats = WordStats::of(full);
    run.record("long_tokens", full_stats.long_tokens as f64);
    if full_stats.long_tokens > MAX_LONG_TOKENS {
        return run.reject(
            RejectionReason::ConcatenatedGibberish,
            format!("{} very long words", full_stats.long_tokens),
        );
    }

    let tokens = significant_tokens(full);
    let language = &options.language;
    if tokens.len() > language.presence_min_tokens {
        let ratio = marker_ratio(&tokens, language);
        run.record("target_language_ratio", ratio);
        if ratio < language.presence_min_ratio {
            return run.reject(
                RejectionReason::NoTargetLanguage,
                format!(
                    "{:.0}% {} markers in {} words",
                    ratio * 100.0,
                    language.name,
                    tokens.len()
                ),
            );
        }
    }

    if let Some((token, count, ratio)) = top_repetition(&tokens) {
        run.record("repetition_ratio", ratio);
        if ratio > REPETITION_RATIO && count > REPETITION_MIN_COUNT {
            let detail = format!("'{token}' is {:.0}% of words", ratio * 100.0);
            return run.reject(RejectionReason::ExcessiveRepetition, detail);
        }
    }

    if length > options.max_chars {
        run.text = smart_truncate(full, options.max_chars);
        run.record("truncated", 1.0);
        run.record("original_length", length as f64);
    }

    let final_stats = WordStats::of(&run.text);
    let coherence = coherence_score(&run.text, language, &options.coherence);
    run.record("coherence", coherence);
    run.record("word_count", final_stats.count as f64);
    if coherence < options.min_coherence && final_stats.count > COHERENCE_MIN_WORDS {
        return run.reject(
            RejectionReason::LowCoherence,
            format!("score {coherence:.0}"),
        );
    }

    let final_length = char_len(&run.text);
    if final_length < options.min_chars {
        return run.reject(
            RejectionReason::TooShortAfterTruncation,
            format!("{final_length} chars"),
        );
    }

    if let Some(opener) = ASSISTANT_PREAMBLE_RE.find(&run.text) {
        let detail = format!("opens with '{}'", opener.as_str());
        return run.reject(RejectionReason::AssistantPreamble, detail);
    }

    run.accept()
}

/// Cut `text` to at most `max` characters at the cleanest boundary available.
///
/// Prefers the last `.`/`!`/`?` past 40% of the limit, then the last
/// whitespace past that mark, then a hard cut.
pub fn smart_truncate(text: &str, max: usize) -> String {
    let cut = prefix_chars(text, max);
    let floor = max as f64 * TRUNCATION_FLOOR;

    let mut sentence_end = None;
    let mut last_space = None;
    for (pos, (byte, c)) in cut.char_indices().enumerate() {
        if pos as f64 <= floor {
            continue;
        }
        match c {
            '.' | '!' | '?' => sentence_end = Some(byte + c.len_utf8()),
            c if c.is_whitespace() => last_space = Some(byte),
            _ => {}
        }
    }

    let kept = match (sentence_end, last_space) {
        (Some(end), _) => &cut[..end],
        (None, Some(space)) => &cut[..space],
        (None, None) => cut,
    };
    kept.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTENCE: &str = "Oye pana, el calor en la isla está cabrón hoy y la luz se fue otra vez. ";

    fn check(text: &str) -> ValidationResult {
        validate(text, &ValidatorOptions::default())
    }

    fn reason(text: &str) -> Option<RejectionReason> {
        check(text).rejection_reason
    }

    #[test]
    fn plain_reply_is_accepted() {
        let result = check("¡Coño pana, qué calor hace hoy en Bayamón! Ni el abanico ayuda.");
        assert!(result.accepted, "{:?}", result.detail);
        assert!(!result.truncated());
        assert!(result.diagnostics.contains_key("coherence"));
    }

    #[test]
    fn short_text_is_rejected() {
        assert_eq!(reason(""), Some(RejectionReason::TooShort));
        assert_eq!(reason("  hey  "), Some(RejectionReason::TooShort));
    }

    #[test]
    fn leaked_key_is_rejected_before_anything_else() {
        let text = "Aquí está la key sk-abcdefghijklmnopqrstuvwxyz pa que veas";
        assert_eq!(reason(text), Some(RejectionReason::SecretLeak));
    }

    #[test]
    fn leak_past_the_limit_is_still_caught() {
        let text = format!("{}{}", SENTENCE.repeat(5), "GROQ_API_KEY");
        assert_eq!(reason(&text), Some(RejectionReason::SecretLeak));
    }

    #[test]
    fn program_is_rejected() {
        let text = "const a = 1\nlet b = 2\nfunction go() {\nreturn a + b\n}";
        assert_eq!(reason(text), Some(RejectionReason::CodeOutput));
    }

    #[test]
    fn single_foreign_script_over_the_ratio_is_overflow() {
        let text = format!(
            "{}{}",
            "Oye pana, qué calor hace hoy en la isla. ".repeat(2),
            "привет друг как дела ".repeat(2)
        );
        let result = check(&text);
        assert_eq!(result.rejection_reason, Some(RejectionReason::NonLatinOverflow));
        assert_eq!(result.detail.as_deref(), Some("35% non-Latin"));
        let ratio = result.diagnostics["non_latin_ratio"];
        assert!((0.30..0.40).contains(&ratio), "{ratio}");
        assert!(!result.diagnostics.contains_key("script_count"));
    }

    #[test]
    fn assistant_openers_are_rejected() {
        for text in [
            "As an AI, I think el calor en la isla está cabrón hoy.",
            "Sure! Aquí va: qué calor hace en Bayamón, pana.",
            "Here's un tweet pa ti: la luz se fue otra vez, qué jodienda.",
            "I’d be happy to help: la luz se fue otra vez en el barrio.",
        ] {
            let result = check(text);
            assert_eq!(
                result.rejection_reason,
                Some(RejectionReason::AssistantPreamble),
                "{text}"
            );
        }
        // Only at the very start.
        let text = "¡Coño pana, qué calor! Let me tell you, ni el abanico ayuda.";
        assert!(check(text).accepted);
    }

    #[test]
    fn hangul_mixed_into_latin_is_rejected() {
        let text = format!("{} {}", "abcdefg".repeat(10), "한국어".repeat(10));
        assert!(matches!(
            reason(&text),
            Some(RejectionReason::NonLatinOverflow | RejectionReason::MultiScriptGibberish)
        ));
    }

    #[test]
    fn three_scripts_are_rejected_even_when_sparse() {
        let text = "Hoy en la isla hace un calor brutal pana, ni con abanico se aguanta esto. при 한 你";
        let result = check(text);
        assert_eq!(
            result.rejection_reason,
            Some(RejectionReason::MultiScriptGibberish)
        );
        assert_eq!(result.diagnostics["script_count"], 3.0);
    }

    #[test]
    fn merged_tokens_are_rejected() {
        let text = format!("mira esto {}", "superlargapalabrasinsentidoxx ".repeat(6));
        assert_eq!(
            reason(&text),
            Some(RejectionReason::ConcatenatedGibberish)
        );
    }

    #[test]
    fn english_only_output_is_wrong_language() {
        let text = "The quick brown fox jumps over the lazy dog while the farmer watches from his porch every single morning";
        assert_eq!(reason(text), Some(RejectionReason::NoTargetLanguage));
    }

    #[test]
    fn degenerate_loop_is_rejected() {
        let text = "OK OK OK OK OK OK OK OK OK OK politics today";
        assert_eq!(reason(text), Some(RejectionReason::ExcessiveRepetition));
    }

    #[test]
    fn shouted_word_salad_is_incoherent() {
        let text = "QWERTY ZXCVB ASDFG POIUY LKJHG MNBVC TREWQ HGFDS YTREW BVCXZ NBVCX MLKJH";
        let result = check(text);
        assert_eq!(result.rejection_reason, Some(RejectionReason::LowCoherence));
        assert!(result.diagnostics["coherence"] < 10.0);
    }

    #[test]
    fn long_reply_is_cut_at_a_sentence() {
        let text = SENTENCE.repeat(6);
        assert!(char_len(text.trim()) > 400);

        let result = validate(&text, &ValidatorOptions::with_max_chars(280));
        assert!(result.accepted, "{:?}", result.detail);
        assert!(char_len(&result.text) <= 280);
        assert!(result.text.ends_with('.'));
        assert!(result.truncated());
        assert_eq!(result.diagnostics["original_length"], char_len(text.trim()) as f64);
    }

    #[test]
    fn cut_falls_back_to_a_space() {
        let text = "palabra ".repeat(3) + &"x".repeat(30) + " fin";
        let cut = smart_truncate(&text, 30);
        assert_eq!(cut, "palabra palabra palabra");
    }

    #[test]
    fn cut_falls_back_to_a_hard_cut() {
        assert_eq!(smart_truncate(&"a".repeat(50), 20), "a".repeat(20));
    }

    #[test]
    fn truncation_can_leave_too_little() {
        let options = ValidatorOptions {
            max_chars: 10,
            min_chars: 8,
            ..ValidatorOptions::default()
        };
        let result = validate("Hola a todos los panas", &options);
        assert_eq!(
            result.rejection_reason,
            Some(RejectionReason::TooShortAfterTruncation)
        );
    }

    #[test]
    fn accepted_text_validates_again() {
        for text in [
            "¡Coño pana, qué calor hace hoy en Bayamón! Ni el abanico ayuda.",
            "Dale mano, eso está brutal 🔥",
            SENTENCE,
        ] {
            let first = check(text);
            assert!(first.accepted);
            let second = check(&first.text);
            assert!(second.accepted);
            assert_eq!(first.text, second.text);
        }
    }

    #[test]
    fn validator_counts_outcomes() {
        let stats = Arc::new(Stats::new());
        let validator =
            OutputValidator::new(ValidatorOptions::default(), Arc::clone(&stats)).unwrap();
        validator.validate("Dale mano, eso está brutal");
        validator.validate("no");
        let snap = stats.snapshot();
        assert_eq!(snap.outputs_accepted, 1);
        assert_eq!(snap.outputs_rejected.get("too_short"), Some(&1));
    }

    #[test]
    fn invalid_options_fail_at_construction() {
        let options = ValidatorOptions {
            min_chars: 500,
            ..ValidatorOptions::default()
        };
        assert!(OutputValidator::new(options, Arc::new(Stats::new())).is_err());
    }
}
