//! Target-language word lists.

/// Closed word lists for one target language.
///
/// `markers` decide whether the output is in the target language at all.
/// `function_words` feed the coherence score and may span more than one
/// language (the bot code-switches into English).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LanguageProfile {
    pub name: &'static str,
    pub markers: &'static [&'static str],
    pub function_words: &'static [&'static str],
    /// Presence is only checked above this many tokens.
    pub presence_min_tokens: usize,
    /// Minimum share of tokens that must be markers.
    pub presence_min_ratio: f64,
}

const SPANISH_MARKERS: &[&str] = &[
    "que", "de", "la", "el", "en", "es", "lo", "un", "una", "no", "se", "con", "por", "para",
    "como", "pero", "más", "ya", "mi", "te", "me", "tu", "su", "del", "al", "los", "las", "esto",
    "eso", "coño", "cabrón", "puñeta", "carajo", "mierda", "diablo", "joder", "pana", "bro",
    "mano", "loco", "jaja", "está", "son", "hay", "todo", "nada", "aquí", "ahí", "ese", "esta",
    "cuando", "donde", "porque", "también", "siempre", "nunca", "bien", "mal", "muy", "yo", "tú",
    "él", "ella", "nos", "les", "esos", "esas", "así", "si", "ven", "mira", "oye", "vamos", "dale",
];

const SPANISH_ENGLISH_FUNCTION_WORDS: &[&str] = &[
    "que", "de", "la", "el", "en", "es", "lo", "un", "una", "no", "se", "con", "por", "para",
    "como", "pero", "más", "ya", "mi", "te", "me", "tu", "su", "del", "al", "les", "los", "las",
    "esto", "eso", "ese", "esta", "son", "hay", "ser", "está", "coño", "cabrón", "puñeta",
    "carajo", "mierda", "diablo", "pana", "bro", "mano", "loco", "jaja", "joder", "the", "is",
    "at", "and", "to", "in", "it", "of", "for", "on", "are", "was", "with", "that", "this", "but",
    "not", "you", "from", "have", "has",
];

const ENGLISH_MARKERS: &[&str] = &[
    "the", "is", "at", "and", "to", "in", "it", "of", "for", "on", "are", "was", "with", "that",
    "this", "but", "not", "you", "from", "have", "has", "a", "an", "be", "i", "we", "they", "my",
    "your", "what", "so", "if", "just", "all",
];

impl LanguageProfile {
    /// Spanish presence markers, Spanish plus English function words.
    pub const fn spanish_english() -> Self {
        Self {
            name: "es",
            markers: SPANISH_MARKERS,
            function_words: SPANISH_ENGLISH_FUNCTION_WORDS,
            presence_min_tokens: 15,
            presence_min_ratio: 0.05,
        }
    }

    /// English only.
    pub const fn english() -> Self {
        Self {
            name: "en",
            markers: ENGLISH_MARKERS,
            function_words: ENGLISH_MARKERS,
            presence_min_tokens: 15,
            presence_min_ratio: 0.05,
        }
    }

    pub fn is_marker(&self, word: &str) -> bool {
        self.markers.contains(&word)
    }

    pub fn is_function_word(&self, word: &str) -> bool {
        self.function_words.contains(&word)
    }
}

/// Lowercase `token` and keep only its letters, so "¡Coño!" matches "coño".
pub fn normalize_word(token: &str) -> String {
    token
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphabetic())
        .collect()
}
