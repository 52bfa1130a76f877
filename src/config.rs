//! Configuration types.
//!
//! Every component takes its config at construction and calls `validate()`
//! there, so a bad value fails fast instead of on the first request.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::output::language::LanguageProfile;

/// Input sanitizer and injection detector settings.
#[derive(Debug, Clone)]
pub struct SanitizerConfig {
    /// Hard cap on the sanitized text, in characters.
    pub max_chars: usize,
    /// How much of the raw text the pattern battery scans, in characters.
    pub scan_limit: usize,
    /// Points added per distinct injection pattern class that fires.
    pub pattern_points: u32,
    /// Raw length above which the text counts as unusually long.
    pub long_input_chars: usize,
    pub long_input_points: u32,
    /// Newline count above which the text counts as padded.
    pub max_newlines: usize,
    pub newline_points: u32,
    /// Delimiter-like characters (`{}<>[]`|\`) above which the text is suspicious.
    pub max_special_chars: usize,
    pub special_char_points: u32,
    /// Security/ML jargon terms at or above which the text is suspicious.
    pub jargon_min_terms: usize,
    pub jargon_points: u32,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            max_chars: 500,
            scan_limit: 8_000,
            pattern_points: 30,
            long_input_chars: 2_000,
            long_input_points: 10,
            max_newlines: 20,
            newline_points: 15,
            max_special_chars: 30,
            special_char_points: 10,
            jargon_min_terms: 3,
            jargon_points: 20,
        }
    }
}

impl SanitizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chars == 0 {
            return Err(ConfigError::invalid("sanitizer.max_chars", "must be > 0"));
        }
        if self.scan_limit < self.max_chars {
            return Err(ConfigError::invalid(
                "sanitizer.scan_limit",
                format!("must be >= max_chars ({})", self.max_chars),
            ));
        }
        Ok(())
    }
}

/// What the caller does with a risk score.
#[derive(Debug, Clone, Copy)]
pub struct RiskPolicy {
    /// At or above this score the text is not used at all.
    pub block_at: u32,
    /// At or above this score the text is embedded in a shortened, flagged wrapper.
    pub guard_at: u32,
    /// Character cap for guarded text.
    pub guarded_max_chars: usize,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            block_at: 60,
            guard_at: 30,
            guarded_max_chars: 200,
        }
    }
}

impl RiskPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.guard_at > self.block_at {
            return Err(ConfigError::invalid(
                "risk.guard_at",
                format!("must be <= block_at ({})", self.block_at),
            ));
        }
        if self.block_at > 100 {
            return Err(ConfigError::invalid("risk.block_at", "scores are capped at 100"));
        }
        if self.guarded_max_chars == 0 {
            return Err(ConfigError::invalid("risk.guarded_max_chars", "must be > 0"));
        }
        Ok(())
    }
}

/// Point weights for the coherence score. Empirical starting values.
#[derive(Debug, Clone, Copy)]
pub struct CoherenceWeights {
    /// Multiplier on the function-word ratio (0..=1).
    pub marker_weight: f64,
    pub punctuation_bonus: f64,
    pub low_caps_ratio: f64,
    pub low_caps_bonus: f64,
    pub high_caps_ratio: f64,
    pub high_caps_penalty: f64,
    pub low_long_ratio: f64,
    pub low_long_bonus: f64,
    pub high_long_ratio: f64,
    pub high_long_penalty: f64,
}

impl Default for CoherenceWeights {
    fn default() -> Self {
        Self {
            marker_weight: 50.0,
            punctuation_bonus: 10.0,
            low_caps_ratio: 0.3,
            low_caps_bonus: 10.0,
            high_caps_ratio: 0.6,
            high_caps_penalty: 15.0,
            low_long_ratio: 0.1,
            low_long_bonus: 5.0,
            high_long_ratio: 0.3,
            high_long_penalty: 10.0,
        }
    }
}

/// Output validator options.
#[derive(Debug, Clone, Copy)]
pub struct ValidatorOptions {
    pub max_chars: usize,
    pub min_chars: usize,
    pub max_non_latin_ratio: f64,
    pub max_scripts: usize,
    pub min_coherence: f64,
    pub language: LanguageProfile,
    pub coherence: CoherenceWeights,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            max_chars: 280,
            min_chars: 5,
            max_non_latin_ratio: 0.15,
            max_scripts: 2,
            min_coherence: 10.0,
            language: LanguageProfile::spanish_english(),
            coherence: CoherenceWeights::default(),
        }
    }
}

impl ValidatorOptions {
    /// Defaults with a different character limit.
    pub fn with_max_chars(max_chars: usize) -> Self {
        Self {
            max_chars,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chars == 0 {
            return Err(ConfigError::invalid("validator.max_chars", "must be > 0"));
        }
        if self.min_chars > self.max_chars {
            return Err(ConfigError::invalid(
                "validator.min_chars",
                format!(
                    "{} exceeds max_chars ({})",
                    self.min_chars, self.max_chars
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_non_latin_ratio) {
            return Err(ConfigError::invalid(
                "validator.max_non_latin_ratio",
                "must be within 0.0..=1.0",
            ));
        }
        if !self.min_coherence.is_finite() {
            return Err(ConfigError::invalid("validator.min_coherence", "must be finite"));
        }
        Ok(())
    }
}

/// Interaction budget quotas and windows.
#[derive(Debug, Clone, Copy)]
pub struct BudgetLimits {
    pub subject_per_hour: usize,
    pub subject_per_day: usize,
    pub global_per_hour: usize,
    pub global_per_day: usize,
    /// Events inside `spam_window` at which a subject gets suspended.
    pub spam_threshold: usize,
    pub spam_window: Duration,
    pub suspension: Duration,
    /// How long events are kept at all.
    pub retention: Duration,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            subject_per_hour: 3,
            subject_per_day: 8,
            global_per_hour: 10,
            global_per_day: 50,
            spam_threshold: 5,
            spam_window: Duration::from_secs(10 * 60),
            suspension: Duration::from_secs(30 * 60),
            retention: Duration::from_secs(24 * 3600),
        }
    }
}

impl BudgetLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spam_threshold == 0 {
            return Err(ConfigError::invalid("budget.spam_threshold", "must be > 0"));
        }
        if self.retention < Duration::from_secs(3600) {
            return Err(ConfigError::invalid(
                "budget.retention",
                "must cover at least the hourly window",
            ));
        }
        if self.spam_window > self.retention {
            return Err(ConfigError::invalid(
                "budget.spam_window",
                "must not exceed retention",
            ));
        }
        if self.retention > Duration::from_secs(366 * 24 * 3600) {
            return Err(ConfigError::invalid("budget.retention", "must be at most a year"));
        }
        if self.suspension > Duration::from_secs(366 * 24 * 3600) {
            return Err(ConfigError::invalid("budget.suspension", "must be at most a year"));
        }
        Ok(())
    }
}

/// Generation orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_attempts: usize,
    /// Jaccard similarity at or above which a candidate is a duplicate.
    pub similarity_threshold: f64,
    /// How many recent published texts the candidate is compared against.
    pub recent_window: usize,
    /// Per-call timeout for the generator.
    pub call_timeout: Duration,
    pub validator: ValidatorOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            similarity_threshold: 0.45,
            recent_window: 30,
            call_timeout: Duration::from_secs(30),
            validator: ValidatorOptions::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("orchestrator.max_attempts", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::invalid(
                "orchestrator.similarity_threshold",
                "must be within 0.0..=1.0",
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::invalid("orchestrator.call_timeout", "must be > 0"));
        }
        self.validator.validate()
    }
}

/// Published-history settings.
#[derive(Debug, Clone, Copy)]
pub struct HistoryConfig {
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_entries: 100 }
    }
}

/// Aggregate configuration for the whole pipeline.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub sanitizer: SanitizerConfig,
    pub risk: RiskPolicy,
    pub budget: BudgetLimits,
    pub orchestrator: OrchestratorConfig,
    pub history: HistoryConfig,
    /// Directory holding the ledger, history, and seen-item files.
    pub data_dir: PathBuf,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            sanitizer: SanitizerConfig::default(),
            risk: RiskPolicy::default(),
            budget: BudgetLimits::default(),
            orchestrator: OrchestratorConfig::default(),
            history: HistoryConfig::default(),
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl GuardConfig {
    /// Build from `POST_GUARD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or unparsable keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> T {
            lookup(key).and_then(|s| s.trim().parse().ok()).unwrap_or(default)
        }

        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        let mut config = Self::default();

        let v = &mut config.orchestrator.validator;
        v.max_chars = parsed(lookup, "POST_GUARD_MAX_CHARS", v.max_chars);
        v.min_chars = parsed(lookup, "POST_GUARD_MIN_CHARS", v.min_chars);
        v.max_non_latin_ratio =
            parsed(lookup, "POST_GUARD_MAX_NON_LATIN_RATIO", v.max_non_latin_ratio);
        v.max_scripts = parsed(lookup, "POST_GUARD_MAX_SCRIPTS", v.max_scripts);
        v.min_coherence = parsed(lookup, "POST_GUARD_MIN_COHERENCE", v.min_coherence);

        let s = &mut config.sanitizer;
        s.max_chars = parsed(lookup, "POST_GUARD_INPUT_MAX_CHARS", s.max_chars);

        let r = &mut config.risk;
        r.block_at = parsed(lookup, "POST_GUARD_RISK_BLOCK", r.block_at);
        r.guard_at = parsed(lookup, "POST_GUARD_RISK_GUARD", r.guard_at);
        r.guarded_max_chars = parsed(lookup, "POST_GUARD_GUARDED_MAX_CHARS", r.guarded_max_chars);

        let b = &mut config.budget;
        b.subject_per_hour = parsed(lookup, "POST_GUARD_SUBJECT_PER_HOUR", b.subject_per_hour);
        b.subject_per_day = parsed(lookup, "POST_GUARD_SUBJECT_PER_DAY", b.subject_per_day);
        b.global_per_hour = parsed(lookup, "POST_GUARD_GLOBAL_PER_HOUR", b.global_per_hour);
        b.global_per_day = parsed(lookup, "POST_GUARD_GLOBAL_PER_DAY", b.global_per_day);
        b.spam_threshold = parsed(lookup, "POST_GUARD_SPAM_THRESHOLD", b.spam_threshold);
        let suspension_min: u64 = parsed(
            lookup,
            "POST_GUARD_SUSPENSION_MINUTES",
            b.suspension.as_secs() / 60,
        );
        b.suspension = suspension_min
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ConfigError::invalid("POST_GUARD_SUSPENSION_MINUTES", "too large")
            })?;

        let o = &mut config.orchestrator;
        o.max_attempts = parsed(lookup, "POST_GUARD_MAX_ATTEMPTS", o.max_attempts);
        o.similarity_threshold =
            parsed(lookup, "POST_GUARD_SIMILARITY_THRESHOLD", o.similarity_threshold);
        let timeout_secs: u64 = parsed(
            lookup,
            "POST_GUARD_CALL_TIMEOUT_SECS",
            o.call_timeout.as_secs(),
        );
        o.call_timeout = Duration::from_secs(timeout_secs);

        config.history.max_entries =
            parsed(lookup, "POST_GUARD_HISTORY_MAX", config.history.max_entries);

        if let Some(dir) = lookup("POST_GUARD_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sanitizer.validate()?;
        self.risk.validate()?;
        self.budget.validate()?;
        self.orchestrator.validate()?;
        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("interaction-budget.json")
    }

    pub fn history_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}-history.json"))
    }

    pub fn seen_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}-seen.json"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(GuardConfig::default().validate().is_ok());
    }

    #[test]
    fn min_chars_above_max_chars_is_rejected() {
        let opts = ValidatorOptions {
            min_chars: 300,
            ..ValidatorOptions::default()
        };
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("validator.min_chars"));
    }

    #[test]
    fn inverted_risk_thresholds_are_rejected() {
        let policy = RiskPolicy {
            block_at: 30,
            guard_at: 60,
            ..RiskPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let config = OrchestratorConfig {
            max_attempts: 0,
            ..OrchestratorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = GuardConfig::from_lookup(lookup_from(&[
            ("POST_GUARD_MAX_CHARS", "200"),
            ("POST_GUARD_SUBJECT_PER_HOUR", "5"),
            ("POST_GUARD_SUSPENSION_MINUTES", "45"),
            ("POST_GUARD_DATA_DIR", "/tmp/pg"),
        ]))
        .unwrap();
        assert_eq!(config.orchestrator.validator.max_chars, 200);
        assert_eq!(config.budget.subject_per_hour, 5);
        assert_eq!(config.budget.suspension, Duration::from_secs(45 * 60));
        assert_eq!(config.ledger_path(), PathBuf::from("/tmp/pg/interaction-budget.json"));
    }

    #[test]
    fn unparsable_values_keep_defaults() {
        let config =
            GuardConfig::from_lookup(lookup_from(&[("POST_GUARD_MAX_CHARS", "lots")])).unwrap();
        assert_eq!(config.orchestrator.validator.max_chars, 280);
    }

    #[test]
    fn huge_suspension_is_a_config_error() {
        let err = GuardConfig::from_lookup(lookup_from(&[(
            "POST_GUARD_SUSPENSION_MINUTES",
            "18446744073709551615",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("POST_GUARD_SUSPENSION_MINUTES"));
    }

    #[test]
    fn lookup_with_invalid_combination_fails() {
        let result = GuardConfig::from_lookup(lookup_from(&[
            ("POST_GUARD_MAX_CHARS", "10"),
            ("POST_GUARD_MIN_CHARS", "20"),
        ]));
        assert!(result.is_err());
    }
}
