//! Overlap removal between a new section and the text before it.

use super::prompt::{DEDUP_SYSTEM, DEDUP_USER, NO_OVERLAP, fill};
use crate::error::LlmError;
use crate::html::{body_content, fix_escaped_arrows, plain_text};
use crate::llm::{ContentGenerator, GenerationRequest, Purpose};

/// Rewrites a candidate section so it does not repeat earlier material.
pub struct DeduplicationFilter<'a> {
    generator: &'a dyn ContentGenerator,
}

impl<'a> DeduplicationFilter<'a> {
    pub fn new(generator: &'a dyn ContentGenerator) -> Self {
        Self { generator }
    }

    /// Return `section_html` with overlap against `accumulated` removed.
    ///
    /// The input comes back byte-for-byte when there is nothing earlier to
    /// compare against, when the service answers with the no-overlap
    /// verdict (however it is wrapped), or when its rewrite matches the
    /// input up to surrounding whitespace.
    pub async fn dedupe(
        &self,
        heading: &str,
        section_html: &str,
        accumulated: &str,
    ) -> Result<String, LlmError> {
        if accumulated.trim().is_empty() {
            return Ok(section_html.to_string());
        }

        let request = GenerationRequest::new(Purpose::Dedup {
            heading: heading.to_string(),
        })
        .system(DEDUP_SYSTEM)
        .user(fill(
            DEDUP_USER,
            &[("earlier", accumulated), ("new", section_html)],
        ));

        let answer = self.generator.generate(&request).await?;
        let revised = fix_escaped_arrows(answer.trim());

        if revised.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        if is_no_overlap_verdict(&revised) || body_content(&revised).trim() == section_html.trim() {
            return Ok(section_html.to_string());
        }
        Ok(revised)
    }
}

/// Whether an answer's text content is the no-overlap verdict.
///
/// Code fences, a body wrapper, markup, quoting and trailing punctuation
/// are ignored, and case does not matter.
fn is_no_overlap_verdict(answer: &str) -> bool {
    let text = plain_text(body_content(answer));
    let verdict = text.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '`' | '"' | '\'' | '*' | '.' | '!' | ':' | ';' | ',')
    });
    verdict.eq_ignore_ascii_case(NO_OVERLAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::FnGenerator;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_no_call_without_earlier_text() {
        let generator = FnGenerator::new(|_| panic!("dedup must not call the service"));
        let filter = DeduplicationFilter::new(&generator);

        let out = filter.dedupe("Introduction", "<h2>Intro</h2>", "").await.unwrap();

        assert_eq!(out, "<h2>Intro</h2>");
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_rewrite_is_used_when_overlap_found() {
        let generator = FnGenerator::new(|_| Ok("<h2>Costs</h2><p>Only new facts.</p>".to_string()));
        let filter = DeduplicationFilter::new(&generator);

        let out = filter
            .dedupe("Costs", "<h2>Costs</h2><p>Old fact. New fact.</p>", "Old fact.")
            .await
            .unwrap();

        assert_eq!(out, "<h2>Costs</h2><p>Only new facts.</p>");
        let requests = generator.requests.lock().unwrap();
        let request = &requests[0];
        let prompt = request.last_user().unwrap();
        assert!(prompt.contains("### EARLIER ###\nOld fact."));
        assert!(prompt.contains("Old fact. New fact."));
    }

    #[tokio::test]
    async fn test_rewrite_gets_escaping_fix() {
        let generator =
            FnGenerator::new(|_| Ok("<div class=\"mermaid\">graph LR; A--&gt;B</div>".to_string()));
        let filter = DeduplicationFilter::new(&generator);

        let out = filter.dedupe("Flow", "<p>x</p>", "earlier").await.unwrap();
        assert_eq!(out, "<div class=\"mermaid\">graph LR; A-->B</div>");
    }

    #[tokio::test]
    async fn test_wrapped_verdict_keeps_section() {
        let answers = [
            "NO_OVERLAP.",
            "`NO_OVERLAP`",
            "```\nNO_OVERLAP\n```",
            "<body>NO_OVERLAP</body>",
            "<p>no_overlap</p>",
            "\"NO_OVERLAP\"",
        ];
        for answer in answers {
            let generator = FnGenerator::new(move |_| Ok(answer.to_string()));
            let filter = DeduplicationFilter::new(&generator);

            let out = filter
                .dedupe("Costs", "<h2>Costs</h2><p>Fresh.</p>", "earlier")
                .await
                .unwrap();
            assert_eq!(out, "<h2>Costs</h2><p>Fresh.</p>", "answer {:?}", answer);
        }
    }

    #[test]
    fn test_verdict_inside_real_content_is_a_rewrite() {
        assert!(!is_no_overlap_verdict("<p>NO_OVERLAP</p><p>But this repeats.</p>"));
        assert!(!is_no_overlap_verdict("<h2>Costs</h2><p>Only new facts.</p>"));
    }

    #[tokio::test]
    async fn test_service_failure_propagates() {
        let generator = FnGenerator::new(|_| Err(LlmError::Http("timeout".to_string())));
        let filter = DeduplicationFilter::new(&generator);

        let err = filter.dedupe("A", "<p>x</p>", "earlier").await.unwrap_err();
        assert_eq!(err, LlmError::Http("timeout".to_string()));
    }

    proptest! {
        #[test]
        fn prop_no_overlap_returns_input_unchanged(
            section in "[ \n]{0,2}<p>[a-zA-Z0-9 .,<>]{1,40}</p>[ \n]{0,2}",
            accumulated in "[a-zA-Z ]{1,40}",
            padding in "[ \n]{0,3}",
            start in 0usize..7,
        ) {
            // Nondeterministic service: cycles through echoes of the
            // candidate and differently wrapped verdicts.
            let answers = vec![
                format!("{}{}{}", padding, section, padding),
                format!("<body>{}</body>", section),
                format!("{}{}", NO_OVERLAP, padding),
                format!("{}.", NO_OVERLAP),
                format!("`{}`", NO_OVERLAP),
                format!("```\n{}\n```", NO_OVERLAP),
                format!("<body>{}</body>", NO_OVERLAP),
            ];
            let turn = AtomicUsize::new(start);
            let generator = FnGenerator::new(move |_| {
                let n = turn.fetch_add(1, Ordering::SeqCst);
                Ok(answers[n % answers.len()].clone())
            });
            let filter = DeduplicationFilter::new(&generator);

            for _ in 0..3 {
                let out = tokio_test::block_on(filter.dedupe("Section", &section, &accumulated)).unwrap();
                prop_assert_eq!(&out, &section);
            }
        }
    }
}
