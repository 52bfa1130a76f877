//! Character-based string helpers. All limits in this crate count `char`s,
//! never bytes.

/// Number of characters in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of the `n`-th character, or `s.len()` if shorter.
pub fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

/// The first `n` characters of `s`.
pub fn prefix_chars(s: &str, n: usize) -> &str {
    &s[..byte_offset(s, n)]
}

/// Cap `s` at `max` characters, marking the cut with a trailing ellipsis.
/// The result never exceeds `max` characters.
pub fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if char_len(s) <= max {
        return s.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out = prefix_chars(s, max - 1).trim_end().to_string();
    out.push('…');
    out
}

/// Whitespace-delimited tokens.
pub fn tokens(s: &str) -> impl Iterator<Item = &str> {
    s.split_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_respects_multibyte_chars() {
        assert_eq!(prefix_chars("añoñú", 3), "año");
        assert_eq!(prefix_chars("ab", 10), "ab");
    }

    #[test]
    fn ellipsis_never_exceeds_limit() {
        let out = truncate_with_ellipsis("coño qué calor hace", 8);
        assert!(char_len(&out) <= 8);
        assert!(out.ends_with('…'));
        assert_eq!(truncate_with_ellipsis("corto", 8), "corto");
    }
}
