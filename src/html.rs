//! Turning raw generated HTML into committed fragments.

use crate::error::LlmError;
use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;

static BODY_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<body\b[^>]*>").unwrap());
static BODY_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</body\s*>").unwrap());
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z]*[ \t]*\n([\s\S]*?)\n?```$").unwrap());

/// One generated unit of report content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFragment {
    /// Body-only HTML
    pub html: String,
    /// Text content, one text run per line
    pub plain_text: String,
}

impl GeneratedFragment {
    /// Build a fragment from a raw model response.
    ///
    /// Applies [`fix_escaped_arrows`], keeps only what sits inside `<body>`
    /// (or the whole response when there is no body tag), and derives the
    /// plain text. A response with no text content is rejected.
    pub fn from_generated(raw: &str) -> Result<Self, LlmError> {
        let fixed = fix_escaped_arrows(raw);
        let html = body_content(&fixed).trim().to_string();
        let plain_text = plain_text(&html);
        if plain_text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(Self { html, plain_text })
    }
}

/// Undo the generator's habit of escaping `>` as `&gt;`.
///
/// Nothing else in the input is touched.
pub fn fix_escaped_arrows(raw: &str) -> String {
    raw.replace("&gt;", ">")
}

/// The slice between `<body ...>` and `</body>`.
///
/// Without a body tag the whole input counts as body, minus a surrounding
/// markdown code fence if there is one.
pub fn body_content(html: &str) -> &str {
    match BODY_OPEN.find(html) {
        Some(open) => {
            let rest = &html[open.end()..];
            match BODY_CLOSE.find(rest) {
                Some(close) => &rest[..close.start()],
                None => rest,
            }
        }
        None => {
            let trimmed = html.trim();
            CODE_FENCE
                .captures(trimmed)
                .and_then(|cap| cap.get(1))
                .map_or(trimmed, |m| m.as_str())
        }
    }
}

/// Text nodes of an HTML fragment, trimmed, one per line.
pub fn plain_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escape text for inclusion in HTML element content or attributes.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
