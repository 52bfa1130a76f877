//! Word statistics and the coherence score.

use std::collections::HashMap;

use crate::config::CoherenceWeights;
use crate::output::language::{LanguageProfile, normalize_word};
use crate::text::{char_len, tokens};

/// Tokens longer than this look like merged model tokens.
pub const LONG_TOKEN_CHARS: usize = 20;

/// Whitespace-token statistics for one text.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WordStats {
    pub count: usize,
    pub long_tokens: usize,
    /// Tokens of 3+ characters written entirely in capitals.
    pub caps_tokens: usize,
}

impl WordStats {
    pub fn of(text: &str) -> Self {
        tokens(text).fold(Self::default(), |mut stats, token| {
            stats.count += 1;
            if char_len(token) > LONG_TOKEN_CHARS {
                stats.long_tokens += 1;
            }
            if is_shouted(token) {
                stats.caps_tokens += 1;
            }
            stats
        })
    }

    fn ratio(&self, n: usize) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            n as f64 / self.count as f64
        }
    }

    pub fn long_ratio(&self) -> f64 {
        self.ratio(self.long_tokens)
    }

    pub fn caps_ratio(&self) -> f64 {
        self.ratio(self.caps_tokens)
    }
}

fn is_shouted(token: &str) -> bool {
    char_len(token) > 2
        && token.chars().any(char::is_alphabetic)
        && !token.chars().any(char::is_lowercase)
}

/// Lowercased tokens of 2+ characters, the unit for presence and repetition.
pub fn significant_tokens(text: &str) -> Vec<String> {
    tokens(text)
        .map(str::to_lowercase)
        .filter(|t| char_len(t) > 1)
        .collect()
}

/// Share of `tokens` that are target-language markers.
pub fn marker_ratio(tokens: &[String], language: &LanguageProfile) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens
        .iter()
        .filter(|t| language.is_marker(&normalize_word(t)))
        .count();
    hits as f64 / tokens.len() as f64
}

/// Most frequent token and its share of all tokens.
pub fn top_repetition(tokens: &[String]) -> Option<(&str, usize, f64)> {
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for t in tokens {
        *freq.entry(t.as_str()).or_insert(0) += 1;
    }
    freq.into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(token, count)| (token, count, count as f64 / tokens.len() as f64))
}

/// Coherence score: higher is more sentence-like. Roughly 0..=75.
///
/// Texts under 10 characters score 0.
pub fn coherence_score(text: &str, language: &LanguageProfile, w: &CoherenceWeights) -> f64 {
    if char_len(text) < 10 {
        return 0.0;
    }

    let stats = WordStats::of(text);
    let function_words = tokens(text)
        .filter(|t| language.is_function_word(&normalize_word(t)))
        .count();
    let mut score = stats.ratio(function_words) * w.marker_weight;

    if text.contains(['.', '!', '?', '¡', '¿']) {
        score += w.punctuation_bonus;
    }

    let caps = stats.caps_ratio();
    if caps < w.low_caps_ratio {
        score += w.low_caps_bonus;
    }
    if caps > w.high_caps_ratio {
        score -= w.high_caps_penalty;
    }

    let long = stats.long_ratio();
    if long < w.low_long_ratio {
        score += w.low_long_bonus;
    }
    if long > w.high_long_ratio {
        score -= w.high_long_penalty;
    }

    score
}
