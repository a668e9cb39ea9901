//! Conversation transcripts and the references cited inside them.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Width of the rule printed after each assistant turn.
const TURN_RULE_WIDTH: usize = 60;

/// Who wrote a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "AI",
        }
    }
}

/// One turn of the source conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: String,
}

impl TranscriptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Parse a transcript from its JSON form (`[{"role": .., "content": ..}, ..]`).
pub fn parse_transcript(json: &str) -> Result<Vec<TranscriptMessage>> {
    serde_json::from_str(json).map_err(|e| Error::Transcript(e.to_string()))
}

/// Read and parse a transcript file.
pub fn load_transcript(path: &Path) -> Result<Vec<TranscriptMessage>> {
    let json = std::fs::read_to_string(path)?;
    parse_transcript(&json)
}

/// Unique reference strings cited in a transcript.
///
/// Entries are trimmed on insertion, so the same target cited with different
/// surrounding whitespace is stored once. Iteration order is sorted, which
/// keeps the rendered reference list stable between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    entries: BTreeSet<String>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference. Returns false if it was already present or blank.
    pub fn insert(&mut self, reference: &str) -> bool {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.entries.insert(trimmed.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.entries.contains(reference.trim())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for ReferenceSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = ReferenceSet::new();
        for reference in iter {
            set.insert(reference.as_ref());
        }
        set
    }
}

/// Pulls citation targets and the trailing reference block out of messages.
pub struct ReferenceExtractor {
    /// Matches markdown links `[label](target)`
    link_regex: Regex,
    /// Matches the rule + heading that opens a trailing reference block
    block_regex: Regex,
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceExtractor {
    pub fn new() -> Self {
        Self {
            link_regex: Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap(),
            block_regex: Regex::new(r"(?m)^[ \t]*-{3,}[ \t]*\n(?:[ \t]*\n)*[ \t]*References\b")
                .unwrap(),
        }
    }

    /// Link targets cited anywhere in the message, in order of appearance.
    pub fn references<'a>(&self, message: &'a str) -> Vec<&'a str> {
        self.link_regex
            .captures_iter(message)
            .filter_map(|cap| cap.get(2))
            .map(|m| m.as_str().trim())
            .collect()
    }

    /// Message body without its trailing reference block.
    ///
    /// Falls back to the whole message when nothing precedes the block.
    pub fn body<'a>(&self, message: &'a str) -> &'a str {
        let end = self
            .block_regex
            .find(message)
            .map_or(message.len(), |m| m.start());
        let body = message[..end].trim();
        if body.is_empty() { message } else { body }
    }
}

/// The transcript flattened into one prompt-ready text, plus its references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedTranscript {
    pub text: String,
    pub references: ReferenceSet,
}

impl SerializedTranscript {
    /// Serialise messages in their original order.
    pub fn from_messages(messages: &[TranscriptMessage]) -> Self {
        Self::with_extractor(messages, &ReferenceExtractor::new())
    }

    pub fn with_extractor(messages: &[TranscriptMessage], extractor: &ReferenceExtractor) -> Self {
        let mut references = ReferenceSet::new();
        let mut turns = Vec::with_capacity(messages.len());

        for message in messages {
            let mut turn = format!("{}: {}", message.role.label(), extractor.body(&message.content));
            if message.role == Role::Assistant {
                turn.push_str("\n\n");
                turn.push_str(&"-".repeat(TURN_RULE_WIDTH));
                turn.push('\n');
            }
            turns.push(turn);

            for reference in extractor.references(&message.content) {
                references.insert(reference);
            }
        }

        let mut text = turns.join("\n");
        text.push('\n');
        Self { text, references }
    }
}

/// Turn a report title into a safe file stem.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect();
    let stem = replaced.split_whitespace().collect::<Vec<_>>().join("_");
    if stem.is_empty() {
        "report".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_labels_and_rules() {
        let messages = vec![
            TranscriptMessage::user("What is CRISPR?"),
            TranscriptMessage::assistant("A gene editing tool."),
        ];
        let serialized = SerializedTranscript::from_messages(&messages);

        let expected = format!(
            "User: What is CRISPR?\nAI: A gene editing tool.\n\n{}\n\n",
            "-".repeat(60)
        );
        assert_eq!(serialized.text, expected);
        assert!(serialized.references.is_empty());
    }

    #[test]
    fn test_references_deduplicated_across_messages() {
        let messages = vec![
            TranscriptMessage::user("Tell me about [this](https://example.com/a)"),
            TranscriptMessage::assistant(
                "See [source]( https://example.com/a ) and [other](https://example.com/b).",
            ),
            TranscriptMessage::assistant("Again [source](https://example.com/a)."),
        ];
        let serialized = SerializedTranscript::from_messages(&messages);

        assert_eq!(serialized.references.len(), 2);
        let refs: Vec<&str> = serialized.references.iter().collect();
        assert_eq!(refs, vec!["https://example.com/a", "https://example.com/b"]);
    }

    #[test]
    fn test_reference_block_is_cut_from_body() {
        let extractor = ReferenceExtractor::new();
        let message = "The answer is 42 [1](https://x.org).\n\n---\n\nReferences\n1. https://x.org";

        assert_eq!(extractor.body(message), "The answer is 42 [1](https://x.org).");
        assert_eq!(extractor.references(message), vec!["https://x.org"]);
    }

    #[test]
    fn test_body_falls_back_to_whole_message() {
        let extractor = ReferenceExtractor::new();
        let message = "---\nReferences\n[a](https://a.io)";
        assert_eq!(extractor.body(message), message);
    }

    #[test]
    fn test_reference_set_ignores_blank() {
        let mut set = ReferenceSet::new();
        assert!(!set.insert("   "));
        assert!(set.insert(" https://a.io "));
        assert!(!set.insert("https://a.io"));
        assert!(set.contains("https://a.io"));
    }

    #[test]
    fn test_parse_transcript_rejects_unknown_role() {
        let ok = parse_transcript(r#"[{"role": "user", "content": "hi"}]"#).unwrap();
        assert_eq!(ok, vec![TranscriptMessage::user("hi")]);

        let err = parse_transcript(r#"[{"role": "system", "content": "hi"}]"#);
        assert!(matches!(err, Err(Error::Transcript(_))));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("  Gene  Therapy: 2024/25? "), "Gene_Therapy__2024_25_");
        assert_eq!(sanitize_filename("a<b>c"), "a_b_c");
        assert_eq!(sanitize_filename("   "), "report");
    }
}
