//! Document compilation.
//!
//! [`compile`] is a pure function over generated fragments. Page templates
//! for the title, disclaimer and end pages are loaded separately through
//! [`PageTemplates`].

mod shell;

use crate::error::Result;
use crate::html::{GeneratedFragment, escape_html};
use crate::pipeline::prompt::fill;
use crate::transcript::ReferenceSet;
use std::io::ErrorKind;
use std::path::Path;

/// The two finished HTML documents of a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledDocument {
    pub executive_summary_html: String,
    pub report_html: String,
}

/// Assemble the executive summary and report documents.
///
/// Sections are concatenated in the order given. A references block is
/// appended to the report only when `references` is non-empty; the
/// executive summary never carries one.
pub fn compile(
    executive_summary: &GeneratedFragment,
    sections: &[GeneratedFragment],
    references: &ReferenceSet,
) -> CompiledDocument {
    let mut body = sections
        .iter()
        .map(|s| s.html.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    if !references.is_empty() {
        body.push('\n');
        body.push_str(shell::REFERENCES_OPEN);
        for reference in references.iter() {
            body.push_str("        <li>");
            body.push_str(&escape_html(reference.trim()));
            body.push_str("</li>\n");
        }
        body.push_str(shell::REFERENCES_CLOSE);
    }

    CompiledDocument {
        executive_summary_html: shell::executive_summary_document(&executive_summary.html),
        report_html: shell::report_document(&body),
    }
}

/// Title and subtitle printed on the title page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleInfo {
    pub title: String,
    pub sub_title: String,
}

impl TitleInfo {
    pub fn new(title: impl Into<String>, sub_title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            sub_title: sub_title.into(),
        }
    }
}

/// HTML for the static pages around the generated content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTemplates {
    pub title: String,
    pub disclaimer: String,
    pub end: String,
}

impl Default for PageTemplates {
    fn default() -> Self {
        Self {
            title: shell::TITLE_TEMPLATE.to_string(),
            disclaimer: shell::DISCLAIMER_TEMPLATE.to_string(),
            end: shell::END_TEMPLATE.to_string(),
        }
    }
}

impl PageTemplates {
    /// Built-in templates, each replaced by `title.html`, `disclaimer.html`
    /// or `end.html` when present in `assets_dir`.
    pub async fn load(assets_dir: Option<&Path>) -> Result<Self> {
        let mut templates = Self::default();
        let Some(dir) = assets_dir else {
            return Ok(templates);
        };

        for (name, slot) in [
            ("title.html", &mut templates.title),
            ("disclaimer.html", &mut templates.disclaimer),
            ("end.html", &mut templates.end),
        ] {
            match tokio::fs::read_to_string(dir.join(name)).await {
                Ok(content) => {
                    tracing::debug!(template = name, dir = %dir.display(), "Using page template override");
                    *slot = content;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(templates)
    }

    /// The title page with its placeholders filled.
    ///
    /// Recognised placeholders: `{title}`, `{subtitle}`, `{prepared_for}`,
    /// `{date}`. Values are HTML-escaped.
    pub fn title_page(&self, info: &TitleInfo, prepared_for: &str, date: &str) -> String {
        fill(
            &self.title,
            &[
                ("title", &escape_html(&info.title)),
                ("subtitle", &escape_html(&info.sub_title)),
                ("prepared_for", &escape_html(prepared_for)),
                ("date", &escape_html(date)),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(html: &str) -> GeneratedFragment {
        GeneratedFragment::from_generated(html).unwrap()
    }

    #[test]
    fn test_sections_kept_in_order() {
        let summary = fragment("<h2>Executive Summary</h2>");
        let sections = [
            fragment("<h2>Introduction</h2>"),
            fragment("<h2>Findings</h2>"),
            fragment("<h2>Conclusion</h2>"),
        ];

        let doc = compile(&summary, &sections, &ReferenceSet::new());

        let intro = doc.report_html.find("Introduction").unwrap();
        let findings = doc.report_html.find("Findings").unwrap();
        let conclusion = doc.report_html.find("Conclusion").unwrap();
        assert!(intro < findings && findings < conclusion);
    }

    #[test]
    fn test_no_references_block_when_empty() {
        let doc = compile(
            &fragment("<p>summary</p>"),
            &[fragment("<p>body</p>")],
            &ReferenceSet::new(),
        );
        assert!(!doc.report_html.contains("References"));
        assert!(!doc.report_html.contains("reference-list\">"));
    }

    #[test]
    fn test_references_follow_body_and_are_escaped() {
        let references: ReferenceSet = ["https://example.com/a?x=1&y=2", "https://example.com/b"]
            .into_iter()
            .collect();

        let doc = compile(
            &fragment("<p>summary</p>"),
            &[fragment("<p>last section</p>")],
            &references,
        );

        let body_end = doc.report_html.find("last section").unwrap();
        let refs = doc.report_html.find("<h2>References</h2>").unwrap();
        assert!(body_end < refs);
        assert!(doc.report_html.contains("<li>https://example.com/a?x=1&amp;y=2</li>"));
        assert_eq!(doc.report_html.matches("<li>").count(), 2);
        assert!(!doc.executive_summary_html.contains("References"));
    }

    #[test]
    fn test_documents_are_complete_and_independent() {
        let doc = compile(&fragment("<p>summary</p>"), &[fragment("<p>body</p>")], &ReferenceSet::new());

        for html in [&doc.executive_summary_html, &doc.report_html] {
            assert!(html.starts_with("<!DOCTYPE html>"));
            assert_eq!(html.matches("<style>").count(), 1);
            assert!(html.trim_end().ends_with("</html>"));
        }
        assert!(doc.executive_summary_html.contains("<p>summary</p>"));
        assert!(!doc.executive_summary_html.contains("<p>body</p>"));
        assert!(!doc.report_html.contains("<p>summary</p>"));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let references: ReferenceSet = ["b", "a"].into_iter().collect();
        let summary = fragment("<p>s</p>");
        let sections = [fragment("<p>x</p>")];
        assert_eq!(
            compile(&summary, &sections, &references),
            compile(&summary, &sections, &references)
        );
    }

    #[test]
    fn test_title_page_placeholders() {
        let page = PageTemplates::default().title_page(
            &TitleInfo::new("Heat <Pumps>", "A & B"),
            "Dana",
            "March 3, 2025",
        );
        assert!(page.contains("<h1>Heat &lt;Pumps&gt;</h1>"));
        assert!(page.contains("<h2>A &amp; B</h2>"));
        assert!(page.contains("Prepared for Dana"));
        assert!(page.contains("March 3, 2025"));
        assert!(!page.contains("{title}"));
    }

    #[tokio::test]
    async fn test_templates_overridden_from_assets_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("end.html"), "<p>custom end</p>").unwrap();

        let templates = PageTemplates::load(Some(dir.path())).await.unwrap();

        assert_eq!(templates.end, "<p>custom end</p>");
        assert_eq!(templates.disclaimer, PageTemplates::default().disclaimer);
    }
}
