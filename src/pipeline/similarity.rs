//! Word-set similarity for the novelty check.

use std::collections::HashSet;

/// Words of this many characters or fewer carry no topic signal.
const MIN_WORD_CHARS: usize = 3;

/// Case-folded words longer than three letters, punctuation and digits removed.
pub fn significant_words(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|token| {
            token
                .chars()
                .flat_map(char::to_lowercase)
                .filter(|c| c.is_alphabetic())
                .collect::<String>()
        })
        .filter(|word| word.chars().count() > MIN_WORD_CHARS)
        .collect()
}

/// Jaccard similarity of the significant-word sets. 0.0 if either is empty.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let a = significant_words(a);
    let b = significant_words(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

/// Highest similarity between `text` and any of `recent`.
pub fn max_similarity<S: AsRef<str>>(text: &str, recent: &[S]) -> f64 {
    recent
        .iter()
        .map(|prev| jaccard(text, prev.as_ref()))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_words_and_punctuation_are_ignored() {
        let words = significant_words("¡LUMA, otra vez! Se fue la luz en 2024");
        let mut sorted: Vec<_> = words.into_iter().collect();
        sorted.sort();
        assert_eq!(sorted, vec!["luma", "otra"]);
    }

    #[test]
    fn identical_texts_score_one() {
        let text = "LUMA dejó la isla sin corriente otra vez";
        assert_eq!(jaccard(text, text), 1.0);
    }

    #[test]
    fn overlap_is_measured_on_word_sets() {
        // {luma, dejó, isla, corriente} vs {luma, dejó, pueblo, corriente, otra}
        let a = "LUMA dejó la isla sin corriente";
        let b = "LUMA dejó al pueblo sin corriente otra vez";
        assert!((jaccard(a, b) - 3.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn empty_sets_are_never_similar() {
        assert_eq!(jaccard("a b c", "a b c"), 0.0);
        assert_eq!(max_similarity::<&str>("algo nuevo", &[]), 0.0);
    }
}
