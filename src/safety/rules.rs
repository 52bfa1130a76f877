//! Injection rule battery.
//!
//! Rules are data: an ordered list of named predicates with weights. Pattern
//! rules are grouped into classes and a class scores once no matter how many
//! of its patterns fire. Heuristic rules each carry their own (smaller) weight
//! and are evidence, not proof.

use regex::Regex;

use crate::config::SanitizerConfig;

/// Family of injection technique a pattern belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatternClass {
    /// "ignore previous instructions" and friends.
    Override,
    /// Persona / mode takeover.
    RolePlay,
    /// Asking for the system prompt, keys, or environment.
    Exfiltration,
    /// Code blocks, eval/exec, process environment access.
    CodeExecution,
    /// Chat-template role markers and section headers.
    Delimiter,
    /// Fake authority or urgency.
    SocialEngineering,
}

impl PatternClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternClass::Override => "override",
            PatternClass::RolePlay => "role_play",
            PatternClass::Exfiltration => "exfiltration",
            PatternClass::CodeExecution => "code_execution",
            PatternClass::Delimiter => "delimiter",
            PatternClass::SocialEngineering => "social_engineering",
        }
    }
}

/// A secondary signal computed over the whole raw text.
#[derive(Debug, Clone)]
pub enum Heuristic {
    /// More than `n` characters.
    LongerThan(usize),
    /// More than `n` newlines.
    NewlinesAbove(usize),
    /// More than `n` delimiter-like characters.
    SpecialCharsAbove(usize),
    /// At least `min` security/ML jargon terms.
    JargonAtLeast { min: usize, regex: Regex },
}

/// One entry in the battery.
#[derive(Debug, Clone)]
pub enum Rule {
    Pattern {
        name: &'static str,
        class: PatternClass,
        regex: Regex,
    },
    Heuristic {
        name: &'static str,
        check: Heuristic,
        points: u32,
    },
}

/// A rule that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    pub name: &'static str,
    pub class: Option<PatternClass>,
    pub detail: Option<String>,
}

impl Rule {
    /// Evaluate against the full raw text and the bounded scan window.
    pub fn check(&self, full: &str, window: &str) -> Option<RuleHit> {
        match self {
            Rule::Pattern { name, class, regex } => regex.is_match(window).then(|| RuleHit {
                name: *name,
                class: Some(*class),
                detail: None,
            }),
            Rule::Heuristic { name, check, .. } => {
                let (fired, observed) = match check {
                    Heuristic::LongerThan(n) => {
                        let len = full.chars().count();
                        (len > *n, len)
                    }
                    Heuristic::NewlinesAbove(n) => {
                        let count = full.matches('\n').count();
                        (count > *n, count)
                    }
                    Heuristic::SpecialCharsAbove(n) => {
                        let count = full.chars().filter(|c| is_delimiter_char(*c)).count();
                        (count > *n, count)
                    }
                    Heuristic::JargonAtLeast { min, regex } => {
                        let count = regex.find_iter(full).count();
                        (count >= *min, count)
                    }
                };
                fired.then(|| RuleHit {
                    name: *name,
                    class: None,
                    detail: Some(observed.to_string()),
                })
            }
        }
    }
}

fn is_delimiter_char(c: char) -> bool {
    matches!(c, '{' | '}' | '<' | '>' | '[' | ']' | '`' | '|' | '\\')
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in injection pattern compiles")
}

/// Ordered rule battery with its scoring policy.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    pattern_points: u32,
}

/// Outcome of running a [`RuleSet`].
#[derive(Debug, Clone, Default)]
pub struct RuleOutcome {
    pub hits: Vec<RuleHit>,
    pub score: u32,
}

impl RuleSet {
    /// The built-in battery, weighted from `config`.
    pub fn default_rules(config: &SanitizerConfig) -> Self {
        use PatternClass::*;

        let patterns: Vec<(&'static str, PatternClass, &str)> = vec![
            // Direct overrides
            (
                "ignore_previous",
                Override,
                r"(?i)ignore\s+(all\s+)?(the\s+)?(previous|prior|above|your)\s+(instructions?|prompts?|rules?|guidelines?)",
            ),
            (
                "forget_previous",
                Override,
                r"(?i)forget\s+(all\s+)?(previous|prior|your)\s+(instructions?|context|rules?)",
            ),
            (
                "disregard_previous",
                Override,
                r"(?i)disregard\s+(all\s+)?(previous|prior|above|your)",
            ),
            (
                "override_rules",
                Override,
                r"(?i)override\s+(your|all|the)\s+(instructions?|rules?|guidelines?|safety)",
            ),
            ("new_instructions", Override, r"(?i)\bnew\s+instructions?\s*:"),
            // Role-play takeover
            ("you_are_now", RolePlay, r"(?i)you\s+are\s+now\s+(a|an|the)\s+"),
            (
                "pretend_to_be",
                RolePlay,
                r"(?i)pretend\s+(you('re|\s+are)|to\s+be)\s+(a|an|the|not)\b",
            ),
            ("act_as", RolePlay, r"(?i)\bact\s+as\s+(if|though|a|an)\s+"),
            (
                "switch_mode",
                RolePlay,
                r"(?i)switch\s+(to|into)\s+(a\s+)?new\s+(mode|personality|character)",
            ),
            (
                "privileged_mode",
                RolePlay,
                r"(?i)enter\s+(god|admin|root|sudo|developer|debug)\s*mode",
            ),
            ("jailbreak", RolePlay, r"(?i)jailbreak"),
            ("dan_mode", RolePlay, r"\bDAN\b(\s*(?i:mode))?"),
            // Secret / config exfiltration
            (
                "reveal_internal",
                Exfiltration,
                r"(?i)reveal\s+(your|the)\s+(api|secret|system|internal|hidden)",
            ),
            (
                "show_secret",
                Exfiltration,
                r"(?i)show\s+(me\s+)?(your|the)\s+(api\s*key|secret|password|token|prompt|instructions?)",
            ),
            (
                "ask_secret",
                Exfiltration,
                r"(?i)(what|tell\s+me)\s+(is|are)\s+(your|the)\s+(api|secret|system)\s*(key|prompt|password|token)",
            ),
            (
                "print_env",
                Exfiltration,
                r"(?i)print\s+(your|the|all)\s+(api|secret|env|environment|system)",
            ),
            (
                "output_prompt",
                Exfiltration,
                r"(?i)output\s+(your|the)\s+(system|hidden|secret|internal)\s*(prompt|message|instructions?)",
            ),
            (
                "repeat_prompt",
                Exfiltration,
                r"(?i)repeat\s+(your|the)\s+(system|initial|original|hidden)\s*(prompt|message|instructions?)",
            ),
            (
                "echo_secret_var",
                Exfiltration,
                r"(?i)echo\s+\$\{?\w*(KEY|SECRET|TOKEN|PASS)",
            ),
            // Code execution
            (
                "code_fence",
                CodeExecution,
                r"(?i)```\s*(javascript|js|python|py|bash|sh|node|eval)",
            ),
            ("process_env", CodeExecution, r"(?i)process\.env"),
            ("require_call", CodeExecution, r#"(?i)require\s*\(\s*['"`]"#),
            ("eval_call", CodeExecution, r"(?i)\beval\s*\("),
            ("exec_call", CodeExecution, r"(?i)\bexec\s*\("),
            ("child_process", CodeExecution, r"(?i)child_process"),
            ("import_os", CodeExecution, r"(?i)\bimport\s+(os|subprocess)\b"),
            // Prompt delimiters
            ("system_tag", Delimiter, r"(?i)</?\s*system\s*>"),
            ("user_tag", Delimiter, r"(?i)</?\s*user\s*>"),
            ("assistant_tag", Delimiter, r"(?i)</?\s*assistant\s*>"),
            ("system_bracket", Delimiter, r"(?i)\[/?(SYSTEM|INST)\]"),
            ("llama_sys", Delimiter, r"(?i)<</?SYS>>"),
            ("im_start", Delimiter, r"(?i)<\|im_(start|end)\|>"),
            (
                "section_header",
                Delimiter,
                r"(?im)^\s*#{2,}\s*(System|Instructions?|Human|Assistant)\b",
            ),
            // Social engineering
            (
                "urgent_request",
                SocialEngineering,
                r"(?i)this\s+is\s+(an?\s+)?(emergency|urgent|critical|test\s+from)",
            ),
            (
                "authority_claim",
                SocialEngineering,
                r"(?i)\b(admin|developer|creator|owner)\s+(here|speaking|override)",
            ),
            ("maintenance_mode", SocialEngineering, r"(?i)maintenance\s+mode"),
            (
                "vendor_authorization",
                SocialEngineering,
                r"(?i)authorized\s+(by|from)\s+(anthropic|openai|groq|the\s+developers?)",
            ),
        ];

        let mut rules: Vec<Rule> = patterns
            .into_iter()
            .map(|(name, class, pattern)| Rule::Pattern {
                name,
                class,
                regex: re(pattern),
            })
            .collect();

        rules.extend([
            Rule::Heuristic {
                name: "long_input",
                check: Heuristic::LongerThan(config.long_input_chars),
                points: config.long_input_points,
            },
            Rule::Heuristic {
                name: "excessive_newlines",
                check: Heuristic::NewlinesAbove(config.max_newlines),
                points: config.newline_points,
            },
            Rule::Heuristic {
                name: "special_char_density",
                check: Heuristic::SpecialCharsAbove(config.max_special_chars),
                points: config.special_char_points,
            },
            Rule::Heuristic {
                name: "technical_jargon",
                check: Heuristic::JargonAtLeast {
                    min: config.jargon_min_terms,
                    regex: re(
                        r"(?i)\b(prompt|token|model|parameter|system|instruction|override|inject|payload|exploit)\b",
                    ),
                },
                points: config.jargon_points,
            },
        ]);

        Self {
            rules,
            pattern_points: config.pattern_points,
        }
    }

    /// Build from an explicit list (custom batteries, tests).
    pub fn from_rules(rules: Vec<Rule>, pattern_points: u32) -> Self {
        Self {
            rules,
            pattern_points,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Run every rule in order. The score is capped at 100.
    pub fn evaluate(&self, full: &str, window: &str) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();
        let mut classes_seen: Vec<PatternClass> = Vec::new();
        let mut score: u32 = 0;

        for rule in &self.rules {
            let Some(hit) = rule.check(full, window) else {
                continue;
            };
            match rule {
                Rule::Pattern { class, .. } => {
                    if !classes_seen.contains(class) {
                        classes_seen.push(*class);
                        score = score.saturating_add(self.pattern_points);
                    }
                }
                Rule::Heuristic { points, .. } => {
                    score = score.saturating_add(*points);
                }
            }
            outcome.hits.push(hit);
        }

        outcome.score = score.min(100);
        outcome
    }
}
