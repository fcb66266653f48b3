//! Known-pattern injection sanitization.
//!
//! The pattern table covers instruction-override phrasing, role hijacks,
//! fake prompt headers and tags, LLM special tokens, invisible Unicode, and
//! (for external content only) encoded payloads. Matches are replaced with
//! `[REDACTED:<reason>]` and recorded in the outcome flags. Best-effort:
//! the list is fixed and makes no claim against novel attacks.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Chars appended when an entry exceeds the budget; the budget includes the
/// suffix so a truncated body is exactly `max_entry_chars` chars long.
const TRUNCATION_SUFFIX: &str = " [TRUNCATED]";

/// Default per-entry char budget (~512 tokens at 4 chars/token).
pub const DEFAULT_MAX_ENTRY_CHARS: usize = 2048;

struct InjectionRule {
    reason: &'static str,
    regex: Regex,
    /// Payload-level rules only apply to external content; internal LLM
    /// output legitimately contains short encoded snippets.
    external_only: bool,
}

fn rule(reason: &'static str, pattern: &str, external_only: bool) -> InjectionRule {
    InjectionRule {
        reason,
        regex: Regex::new(pattern).expect("injection pattern must compile"),
        external_only,
    }
}

static RULES: LazyLock<Vec<InjectionRule>> = LazyLock::new(|| {
    vec![
        rule(
            "instruction-override",
            r"(?i)(?:ignore|disregard|forget|override)\s+(?:all\s+)?(?:previous|prior|above)\s+(?:instructions?|context|prompts?|directions?|constraints?)",
            false,
        ),
        rule(
            "forget-directive",
            r"(?i)forget\s+(?:everything|all\b|your|what)",
            false,
        ),
        rule(
            "role-reassignment",
            r"(?i)you\s+are\s+now\s+(?:a|an|the)\s+\w+",
            false,
        ),
        rule(
            "role-play",
            r"(?i)(?:act|behave|pretend|roleplay)\s+as\s+(?:if\s+)?(?:you\s+(?:are|were)\s+)?(?:a|an|the)\s+\w+",
            false,
        ),
        rule(
            "new-instructions",
            r"(?i)BEGIN\s+NEW\s+INSTRUCTIONS|(?:new|updat\w*|revis\w*|secret|hidden)\s+instructions?\s*:",
            false,
        ),
        rule(
            "prompt-header",
            r"(?im)^\s*#{0,3}\s*(?:system|assistant|instructions?|prompt)\s*:",
            false,
        ),
        rule(
            "system-tag",
            r"(?is)<\s*system\s*>.*?<\s*/\s*system\s*>|<\s*/?\s*system\s*>",
            false,
        ),
        rule(
            "instruction-tag",
            r"(?is)<\s*instructions?\s*>.*?<\s*/\s*instructions?\s*>",
            false,
        ),
        rule(
            "special-token",
            r"(?s)\[INST\].*?\[/INST\]|<\|im_start\|>.*?(?:<\|im_end\|>|$)|\|\s*im_start\s*\|",
            false,
        ),
        rule("zero-width", "[\u{200B}\u{200C}\u{200D}\u{2060}\u{FEFF}]+", false),
        rule("bidi-override", "[\u{202A}-\u{202E}\u{2066}-\u{2069}]+", false),
        rule(
            "data-uri",
            r"(?i)data:[a-z0-9.+-]+/[a-z0-9.+-]+;base64,[A-Za-z0-9+/=]+",
            true,
        ),
        rule("base64-payload", r"[A-Za-z0-9+/=]{257,}", true),
    ]
});

static REDACTION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[REDACTED:[a-z0-9-]+\]").expect("marker pattern must compile"));

/// What the sanitizer did to a piece of text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanitizeFlag {
    Redacted { reason: String, count: usize },
    Truncated,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SanitizeOutcome {
    pub text: String,
    pub flags: Vec<SanitizeFlag>,
}

impl SanitizeOutcome {
    pub fn was_truncated(&self) -> bool {
        self.flags.iter().any(|f| matches!(f, SanitizeFlag::Truncated))
    }

    pub fn redaction_count(&self) -> usize {
        self.flags
            .iter()
            .map(|f| match f {
                SanitizeFlag::Redacted { count, .. } => *count,
                SanitizeFlag::Truncated => 0,
            })
            .sum()
    }
}

/// Neutralizes known injection patterns and enforces the per-entry budget.
#[derive(Clone, Copy, Debug)]
pub struct Sanitizer {
    max_entry_chars: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            max_entry_chars: DEFAULT_MAX_ENTRY_CHARS,
        }
    }
}

impl Sanitizer {
    pub fn new(max_entry_chars: usize) -> Self {
        Self { max_entry_chars }
    }

    pub fn max_entry_chars(&self) -> usize {
        self.max_entry_chars
    }

    /// Sanitize untrusted external text: full pattern set including encoded
    /// payloads, then the entry budget.
    pub fn clean_external(&self, text: &str) -> SanitizeOutcome {
        self.clean(text, true)
    }

    /// Sanitize internally generated text (LLM output headed for the log):
    /// instruction and Unicode patterns, then the entry budget.
    pub fn clean_internal(&self, text: &str) -> SanitizeOutcome {
        self.clean(text, false)
    }

    /// Clean external text and wrap it in delimiters. Required before any
    /// external content reaches an LLM call.
    pub fn wrap_external(&self, text: &str, origin: Option<&str>) -> String {
        let cleaned = self.clean_external(text);
        let origin = origin.unwrap_or("unknown");
        format!(
            "<external_content origin=\"{origin}\">\n{}\n</external_content>",
            cleaned.text.trim()
        )
    }

    fn clean(&self, text: &str, external: bool) -> SanitizeOutcome {
        if text.is_empty() {
            return SanitizeOutcome::default();
        }

        let mut flags = Vec::new();
        let mut cleaned = text.to_owned();
        for rule in RULES.iter() {
            if rule.external_only && !external {
                continue;
            }
            let count = rule.regex.find_iter(&cleaned).count();
            if count == 0 {
                continue;
            }
            let marker = format!("[REDACTED:{}]", rule.reason);
            cleaned = rule.regex.replace_all(&cleaned, marker.as_str()).into_owned();
            debug!(reason = rule.reason, count, "sanitizer redaction");
            flags.push(SanitizeFlag::Redacted {
                reason: rule.reason.to_owned(),
                count,
            });
        }
        let mut cleaned = cleaned.trim().to_owned();

        // Text that was nothing but matches collapses to a single token.
        if !flags.is_empty() && REDACTION_MARKER.replace_all(&cleaned, "").trim().is_empty() {
            cleaned = "[REDACTED:all]".to_owned();
        }

        if cleaned.chars().count() > self.max_entry_chars {
            let keep = self
                .max_entry_chars
                .saturating_sub(TRUNCATION_SUFFIX.chars().count());
            let mut truncated: String = cleaned.chars().take(keep).collect();
            truncated.push_str(TRUNCATION_SUFFIX);
            cleaned = truncated;
            flags.push(SanitizeFlag::Truncated);
        }

        SanitizeOutcome {
            text: cleaned,
            flags,
        }
    }
}
