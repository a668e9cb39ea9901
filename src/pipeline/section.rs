//! Sequential section generation.

use super::dedup::DeduplicationFilter;
use super::events::{PipelineCallbacks, PipelineEvent};
use super::prompt::{DATA_RICH_GUIDELINES, SECTION_SYSTEM, fill};
use super::skeleton::{OutlineSection, ReportOutline, SectionKind};
use crate::error::{Error, LlmError, Result};
use crate::html::GeneratedFragment;
use crate::llm::{ContentGenerator, GenerationRequest, Purpose, RetryPolicy, retry};
use crate::transcript::SerializedTranscript;

/// Plain text of every section committed so far, in outline order.
///
/// Only grows: [`AccumulatedText::extend`] consumes the old value and returns
/// a longer one, so earlier text can never be edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulatedText {
    text: String,
    sections: usize,
}

impl AccumulatedText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a committed fragment.
    pub fn extend(mut self, fragment: &GeneratedFragment) -> Self {
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(&fragment.plain_text);
        self.sections += 1;
        self
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of fragments committed.
    pub fn sections(&self) -> usize {
        self.sections
    }
}

/// Generates report sections one at a time, each conditioned on the text
/// committed before it.
pub struct SectionSynthesizer<'a> {
    generator: &'a dyn ContentGenerator,
    policy: RetryPolicy,
    dedup: bool,
    callbacks: &'a PipelineCallbacks,
}

impl<'a> SectionSynthesizer<'a> {
    pub fn new(
        generator: &'a dyn ContentGenerator,
        policy: RetryPolicy,
        dedup: bool,
        callbacks: &'a PipelineCallbacks,
    ) -> Self {
        Self {
            generator,
            policy,
            dedup,
            callbacks,
        }
    }

    /// Generate every section of `outline`, in order.
    pub async fn synthesize(
        &self,
        transcript: &SerializedTranscript,
        outline: &ReportOutline,
    ) -> Result<Vec<GeneratedFragment>> {
        let total = outline.len();
        let mut fragments = Vec::with_capacity(total);
        let mut acc = AccumulatedText::new();

        for (index, section) in outline.sections().iter().enumerate() {
            self.callbacks.emit(&PipelineEvent::SectionStarted {
                index,
                total,
                heading: section.heading().to_string(),
            });
            let (fragment, next) = self.step(transcript, section, acc).await?;
            fragments.push(fragment);
            acc = next;
        }

        Ok(fragments)
    }

    /// One fold step: generate `section` against `acc` and return the
    /// committed fragment with the extended text.
    pub async fn step(
        &self,
        transcript: &SerializedTranscript,
        section: &OutlineSection,
        acc: AccumulatedText,
    ) -> Result<(GeneratedFragment, AccumulatedText)> {
        let heading = section.heading();
        let request = self.request(transcript, section, &acc);

        let fragment = retry(
            self.policy,
            |_| self.attempt(heading, &request, &acc),
            |attempt, error| {
                self.callbacks.emit(&PipelineEvent::SectionRetry {
                    heading: heading.to_string(),
                    attempt,
                    error: error.to_string(),
                })
            },
        )
        .await
        .map_err(|exhausted| Error::SectionGeneration {
            heading: heading.to_string(),
            attempts: exhausted.attempts,
            completed: acc.sections(),
            source: exhausted.error,
        })?;

        self.callbacks.emit(&PipelineEvent::SectionCommitted {
            index: acc.sections(),
            heading: heading.to_string(),
            chars: fragment.plain_text.len(),
        });
        let acc = acc.extend(&fragment);
        Ok((fragment, acc))
    }

    fn request(
        &self,
        transcript: &SerializedTranscript,
        section: &OutlineSection,
        acc: &AccumulatedText,
    ) -> GenerationRequest {
        let (guidelines, balance) = match section.kind() {
            SectionKind::Narrative => ("", "well"),
            SectionKind::DataRich => (DATA_RICH_GUIDELINES, "with visual elements"),
        };
        let sub_headings = section.sub_headings().join(", ");
        let report_so_far = if acc.is_empty() {
            "(nothing yet)"
        } else {
            acc.as_str()
        };

        GenerationRequest::new(Purpose::Section {
            heading: section.heading().to_string(),
        })
        .system(fill(
            SECTION_SYSTEM,
            &[
                ("heading", section.heading()),
                ("sub_headings", &sub_headings),
                ("guidelines", guidelines),
                ("balance", balance),
                ("report_so_far", report_so_far),
            ],
        ))
        .user(transcript.text.as_str())
    }

    async fn attempt(
        &self,
        heading: &str,
        request: &GenerationRequest,
        acc: &AccumulatedText,
    ) -> std::result::Result<GeneratedFragment, LlmError> {
        let raw = self.generator.generate(request).await?;
        let fragment = GeneratedFragment::from_generated(&raw)?;
        if !self.dedup {
            return Ok(fragment);
        }

        let revised = DeduplicationFilter::new(self.generator)
            .dedupe(heading, &fragment.html, acc.as_str())
            .await?;
        let changed = revised != fragment.html;
        self.callbacks.emit(&PipelineEvent::SectionDeduplicated {
            heading: heading.to_string(),
            changed,
        });

        if changed {
            GeneratedFragment::from_generated(&revised)
        } else {
            Ok(fragment)
        }
    }
}
