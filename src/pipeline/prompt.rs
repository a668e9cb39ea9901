//! Prompt templates for each generation step.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Verdict the dedup step returns when nothing needs removing.
pub const NO_OVERLAP: &str = "NO_OVERLAP";

pub const SKELETON_SYSTEM: &str = r#"You plan the structure of a research report written from a conversation between a user and an AI assistant.

- Read the whole conversation and group its material into distinct themes.
- Turn the themes into report sections that do not overlap; every piece of information belongs to exactly one section.
- Start with an "Introduction" section and finish with a "Conclusion" section. The introduction states the aim and sources without specific data; the conclusion summarises findings without repeating data points.
- Give every section 2-4 descriptive sub-headings in reading order.
- When a point matters to two sections, place it in one and refer to it from the other.

Respond with a single JSON object and nothing else."#;

pub const SKELETON_USER: &str = r#"Return JSON matching this schema:
```json
{schema}
```

Conversation:
{transcript}"#;

pub const SECTION_SYSTEM: &str = r#"You write the "{heading}" section of a research report. The conversation between a user and an AI assistant that follows is your source material.

Cover exactly these sub-headings, in order: {sub_headings}.

Formatting:
- Output HTML only, starting at the <body> element. Do not add <html>, <head> or <meta>.
- Use <h2> for the section heading and <h3> for each sub-heading.
- Use lists, emphasis and tables where they help the reader.
{guidelines}
Balance the text {balance} and keep the section tightly organised.

The report so far:
{report_so_far}

Do not repeat anything that already appears in the report so far: no sentence, figure, table or diagram may be restated."#;

/// Extra guidance for sections that should carry tables and diagrams.
pub const DATA_RICH_GUIDELINES: &str = r#"- Condense data and findings into tables wherever possible. Give every table a <caption>; do not number tables.
- Where a process, relationship or structure is easier to see than to read, add a Mermaid diagram inside <div class="mermaid">. Quote every node label. Never reuse a diagram already in the report.
"#;

pub const CONVERSATION_SUMMARY_SYSTEM: &str = r#"Condense the following conversation between a user and an AI assistant into a dense, self-contained summary for executives and domain experts.

- Merge information from every message; drop filler and repetition.
- State key findings explicitly, with the supporting figures.
- Do not use section headings and do not mention that you are a language model.

Return only the summary text."#;

pub const EXECUTIVE_SUMMARY_SYSTEM: &str = r#"You write the executive summary of a research report for executives and domain experts. The summary of the underlying research follows.

Structure:
- Introduction: the theme of the report and its objective.
- Positive Insights: the main strengths and benefits found.
- Areas of Concern: the main risks, limits and obstacles.
- Key Findings: the central observations, each backed by evidence.
- Conclusion: overall insight, open questions, and a clear Go/No-Go recommendation with its justification.

Formatting:
- Output HTML only, starting at the <body> element. Begin with <h2>Executive Summary</h2>; use <h3> for the parts above.
- At most four bullet points per part; every bullet specific and evidence-backed.
{guidelines}
Never print the word "Mermaid" in visible text. Avoid generic statements."#;

pub const DEDUP_SYSTEM: &str = r#"You edit NEW so that it no longer repeats anything in EARLIER.

- Compare sentences, paraphrased ideas, figures, tables and code in NEW against EARLIER.
- Rephrase or remove repeated material in NEW. Drop tables or diagrams that add nothing new.
- Keep every Mermaid diagram inside <div class="mermaid">.
- Keep NEW coherent, leave no empty sub-sections, and add no new sections.
- Never mention EARLIER or NEW in the output.

If NEW repeats nothing from EARLIER, reply with exactly NO_OVERLAP and nothing else. Otherwise reply with the revised NEW only."#;

pub const DEDUP_USER: &str = "### EARLIER ###\n{earlier}\n\n---------------\n\n### NEW ###\n{new}";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// Fill `{name}` placeholders in a template in one pass.
///
/// Substituted values are never rescanned; unknown placeholders stay as-is.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |cap: &Captures<'_>| {
            let name = &cap[1];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map_or_else(|| cap[0].to_string(), |(_, value)| value.to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_replaces_all_occurrences() {
        let out = fill("{a} and {b} and {a}", &[("a", "x"), ("b", "y")]);
        assert_eq!(out, "x and y and x");
    }

    #[test]
    fn test_fill_does_not_rescan_values() {
        let out = fill("{a} {b} {c}", &[("a", "{b}"), ("b", "y")]);
        assert_eq!(out, "{b} y {c}");
    }

    #[test]
    fn test_dedup_prompt_names_verdict() {
        assert!(DEDUP_SYSTEM.contains(NO_OVERLAP));
    }
}
