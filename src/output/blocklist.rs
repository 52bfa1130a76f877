//! Secret and output-shape blocklist.
//!
//! Any hit means the generator leaked internal state or produced executable
//! content. The validator rejects such text outright, before any other check.

use std::sync::LazyLock;

use regex::Regex;

/// What a blocklist hit says about the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Credential, environment name, or internal prompt text.
    Secret,
    /// Executable content.
    Code,
}

#[derive(Debug)]
pub struct BlockRule {
    pub name: &'static str,
    pub kind: BlockKind,
    regex: Regex,
}

/// First rule that matched, or the code-line counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHit {
    pub name: &'static str,
    pub kind: BlockKind,
}

/// More code-looking lines than this and the text counts as a program.
const CODE_LINE_LIMIT: usize = 3;

static BLOCK_RULES: LazyLock<Vec<BlockRule>> = LazyLock::new(|| {
    use BlockKind::*;

    let rules: &[(&'static str, BlockKind, &str)] = &[
        // Vendor key shapes
        ("openai_key", Secret, r"sk-[a-zA-Z0-9]{20,}"),
        ("groq_key", Secret, r"gsk_[a-zA-Z0-9]{20,}"),
        ("moltbook_key", Secret, r"moltbook_sk_[a-zA-Z0-9]{10,}"),
        ("github_token", Secret, r"ghp_[a-zA-Z0-9]{20,}"),
        ("aws_key", Secret, r"AKIA[A-Z0-9]{16}"),
        ("slack_token", Secret, r"xox[bsrap]-[a-zA-Z0-9-]+"),
        // Environment names
        ("process_env", Secret, r"process\.env\.\w+"),
        ("env_lookup", Secret, r"(?:std::)?env::var\s*\(|os\.environ"),
        (
            "api_key_var",
            Secret,
            r"\b(?:OPENAI|GROQ|MOLTBOOK|ANTHROPIC|CLOUDFLARE)_API_(?:KEY|TOKEN)\b",
        ),
        ("x_credentials", Secret, r"\bX_(?:API_KEY|API_SECRET|ACCESS_TOKEN)\b"),
        // Internal prompt text
        (
            "boundary_marker",
            Secret,
            r"(?i)\[\s*(?:end\s+)?untrusted\s+content",
        ),
        ("defensive_block", Secret, r"(?i)security\s+rules\s*\(highest\s+priority"),
        ("internal_names", Secret, r"\b(?:DEFENSIVE_PROMPT|INJECTION_PATTERNS)\b"),
        // Executable content
        ("child_process", Code, r#"require\s*\(\s*['"]child_process"#),
        ("exec_call", Code, r#"\bexec\s*\(\s*['"`]"#),
        ("eval_call", Code, r#"\beval\s*\(\s*['"`]"#),
        ("subprocess_import", Code, r"import\s+subprocess"),
        ("script_url", Code, r"(?i)\b(?:data|javascript|vbscript):\S+"),
    ];

    rules
        .iter()
        .map(|(name, kind, pattern)| BlockRule {
            name: *name,
            kind: *kind,
            regex: Regex::new(pattern).expect("built-in blocklist pattern compiles"),
        })
        .collect()
});

static CODE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:const|let|var|function|import|class|def|if|for|while|fn|pub|use|return)\s")
        .expect("valid regex")
});

static REDACTIONS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"sk-[a-zA-Z0-9]{20,}", "sk-[REDACTED]"),
        (r"gsk_[a-zA-Z0-9]{20,}", "gsk_[REDACTED]"),
        (r"moltbook_sk_[a-zA-Z0-9]{10,}", "moltbook_sk_[REDACTED]"),
        (r"ghp_[a-zA-Z0-9]{20,}", "ghp_[REDACTED]"),
        (r"AKIA[A-Z0-9]{16}", "AKIA[REDACTED]"),
        (r"xox[bsrap]-[a-zA-Z0-9-]+", "xox-[REDACTED]"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).expect("valid regex"), replacement))
    .collect()
});

/// The built-in rules, in scan order.
pub fn block_rules() -> &'static [BlockRule] {
    &BLOCK_RULES
}

/// Lines that look like the start of a code statement.
pub fn code_line_count(text: &str) -> usize {
    CODE_LINE_RE.find_iter(text).count()
}

/// Scan the full text. Secrets win over code when both are present.
pub fn scan(text: &str) -> Option<BlockHit> {
    let mut code_hit = None;
    for rule in block_rules() {
        if rule.regex.is_match(text) {
            let hit = BlockHit {
                name: rule.name,
                kind: rule.kind,
            };
            match rule.kind {
                BlockKind::Secret => return Some(hit),
                BlockKind::Code => {
                    code_hit.get_or_insert(hit);
                }
            }
        }
    }
    if code_hit.is_none() && code_line_count(text) > CODE_LINE_LIMIT {
        code_hit = Some(BlockHit {
            name: "code_lines",
            kind: BlockKind::Code,
        });
    }
    code_hit
}

/// Mask vendor key shapes so text can be logged.
pub fn redact_secrets(text: &str) -> String {
    REDACTIONS
        .iter()
        .fold(text.to_string(), |acc, (regex, replacement)| {
            regex.replace_all(&acc, *replacement).into_owned()
        })
}
