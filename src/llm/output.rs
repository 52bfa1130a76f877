//! Cleanup applied to raw model text before validation.

use std::sync::LazyLock;

use regex::Regex;

/// Highest temperature a request may use unless the caller says otherwise.
pub const DEFAULT_TEMPERATURE_CEILING: f32 = 1.4;
/// Lowest temperature a request may use.
pub const MIN_TEMPERATURE: f32 = 0.1;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```[\w-]*[ \t]*\n?|```[ \t]*$").expect("valid regex"));

static PREAMBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:tweet|here|aquí|este es|post|respuesta|reply)[^:\n]*:\s*")
        .expect("valid regex")
});

const QUOTES: &[char] = &['"', '\'', '“', '”', '«', '»', '‘', '’'];

/// Strip code fences, "Here is your tweet:" style preambles, and wrapping quotes.
pub fn clean_model_output(text: &str) -> String {
    let text = FENCE_RE.replace_all(text.trim(), "");
    let text = PREAMBLE_RE.replace(text.trim(), "");
    text.trim().trim_matches(QUOTES).trim().to_string()
}

/// Clamp `temperature` into `[0.1, ceiling]`. Non-finite input becomes 1.0.
pub fn cap_temperature(temperature: f32, ceiling: f32) -> f32 {
    if !temperature.is_finite() {
        return 1.0;
    }
    let ceiling = if ceiling.is_finite() {
        ceiling.max(MIN_TEMPERATURE)
    } else {
        DEFAULT_TEMPERATURE_CEILING
    };
    temperature.clamp(MIN_TEMPERATURE, ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_and_quotes_are_removed() {
        assert_eq!(
            clean_model_output("Here's your tweet: \"Qué calor, pana\""),
            "Qué calor, pana"
        );
        assert_eq!(
            clean_model_output("Aquí va mi respuesta: ¡Dale, mano!"),
            "¡Dale, mano!"
        );
        assert_eq!(clean_model_output("“Oye tú”"), "Oye tú");
    }

    #[test]
    fn fences_are_removed() {
        assert_eq!(clean_model_output("```text\nHola mundo\n```"), "Hola mundo");
    }

    #[test]
    fn ordinary_text_is_untouched() {
        let text = "LUMA se llevó la luz otra vez. ¡Coño!";
        assert_eq!(clean_model_output(text), text);
    }

    #[test]
    fn temperature_is_clamped() {
        assert_eq!(cap_temperature(2.0, DEFAULT_TEMPERATURE_CEILING), 1.4);
        assert_eq!(cap_temperature(0.0, DEFAULT_TEMPERATURE_CEILING), 0.1);
        assert_eq!(cap_temperature(0.9, DEFAULT_TEMPERATURE_CEILING), 0.9);
        assert_eq!(cap_temperature(f32::NAN, DEFAULT_TEMPERATURE_CEILING), 1.0);
        assert_eq!(cap_temperature(1.3, 1.0), 1.0);
    }
}
