//! Content classification: Markdown or pre-rendered markup?
//!
//! Records carry no declared format, so the format is inferred on every
//! export. The rule is a heuristic, not a parse:
//!
//! 1. Any HTML tag pattern (`<tag ...>` / `</tag>`) → [`ContentKind::Markup`].
//! 2. Otherwise any Markdown signal → [`ContentKind::Markdown`].
//! 3. Otherwise → [`ContentKind::Markup`] (plain text, escaped later).
//!
//! Plain prose containing a lone `*` pair or a line starting with `# ` is
//! classified as Markdown; that is accepted.

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};

/// Inferred format of a content string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    Markdown,
    Markup,
}

static RE_HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?[a-z][^>]*>").unwrap());

static MARKDOWN_SIGNALS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?m)^#{1,6}\s",          // heading
        r"\*\*[^*]+\*\*",          // bold
        r"\*[^*]+\*",              // italic
        r"!\[[^\]]*\]\([^)]*\)",   // image
        r"\[[^\]]*\]\([^)]*\)",    // link
        r"(?m)^[-*+]\s",           // unordered list
        r"(?m)^\d+\.\s",           // ordered list
        r"(?m)^>\s",               // blockquote
        r"(?s)```.*?```",          // fenced code
        r"`[^`]+`",                // inline code
    ])
    .unwrap()
});

/// Decide whether `content` is Markdown or markup.
pub fn classify(content: &str) -> ContentKind {
    if RE_HTML_TAG.is_match(content) {
        ContentKind::Markup
    } else if MARKDOWN_SIGNALS.is_match(content) {
        ContentKind::Markdown
    } else {
        ContentKind::Markup
    }
}

/// True when the content contains at least one tag-like pattern.
pub fn contains_tag(content: &str) -> bool {
    RE_HTML_TAG.is_match(content)
}
