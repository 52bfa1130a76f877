//! Unicode script measurements for token-soup detection.

use std::collections::BTreeSet;

/// Non-Latin scripts the validator tracks, by block.
const SCRIPT_BLOCKS: &[(&str, &[(u32, u32)])] = &[
    ("cyrillic", &[(0x0400, 0x04FF)]),
    ("hangul", &[(0xAC00, 0xD7AF), (0x3130, 0x318F)]),
    ("georgian", &[(0x10A0, 0x10FF), (0x2D00, 0x2D2F)]),
    ("devanagari", &[(0x0900, 0x097F)]),
    ("arabic", &[(0x0600, 0x06FF)]),
    ("cjk", &[(0x4E00, 0x9FFF)]),
    ("japanese", &[(0x3040, 0x30FF)]),
    ("thai", &[(0x0E00, 0x0E7F)]),
    ("bengali", &[(0x0980, 0x09FF)]),
    ("gujarati", &[(0x0A80, 0x0AFF)]),
];

fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F600..=0x1F64F
            | 0x1F300..=0x1F5FF
            | 0x1F680..=0x1F6FF
            | 0x1F900..=0x1F9FF
            | 0x1F1E0..=0x1F1FF
            | 0x2600..=0x26FF
            | 0x2700..=0x27BF
            | 0xFE0F
            | 0x200D
    )
}

/// Basic Latin through Latin Extended-B, Latin Extended Additional, and
/// General Punctuation (curly quotes, ellipsis, dashes).
fn is_latin(c: char) -> bool {
    matches!(c as u32, 33..=591 | 0x1E00..=0x1EFF | 0x2000..=0x206F)
}

/// Share of visible, non-emoji characters outside the Latin ranges.
pub fn non_latin_ratio(text: &str) -> f64 {
    let (total, non_latin) = text
        .chars()
        .filter(|c| !c.is_whitespace() && (*c as u32) > 32 && !is_emoji(*c))
        .fold((0usize, 0usize), |(total, non_latin), c| {
            (total + 1, non_latin + usize::from(!is_latin(c)))
        });
    if total == 0 {
        0.0
    } else {
        non_latin as f64 / total as f64
    }
}

/// Names of the tracked non-Latin scripts present in `text`.
pub fn scripts_present(text: &str) -> BTreeSet<&'static str> {
    let mut found = BTreeSet::new();
    for c in text.chars() {
        let code = c as u32;
        for (name, ranges) in SCRIPT_BLOCKS {
            if ranges.iter().any(|(lo, hi)| (*lo..=*hi).contains(&code)) {
                found.insert(*name);
            }
        }
    }
    found
}

pub fn script_count(text: &str) -> usize {
    scripts_present(text).len()
}
