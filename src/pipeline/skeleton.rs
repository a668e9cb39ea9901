//! Outline planning.

use super::events::{PipelineCallbacks, PipelineEvent};
use super::prompt::{SKELETON_SYSTEM, SKELETON_USER, fill};
use crate::error::{Error, Result};
use crate::llm::{ContentGenerator, GenerationRequest, Purpose, RetryPolicy, StructuredError, generate_structured};
use crate::transcript::SerializedTranscript;
use serde::Deserialize;
use serde_json::{Value, json};

/// Headings that get narrative-only content.
const NARRATIVE_HEADINGS: &[&str] = &["Introduction", "Conclusion"];

/// Content profile of a section, fixed at planning time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// Prose only
    Narrative,
    /// Prose plus tables and diagrams
    DataRich,
}

impl SectionKind {
    pub fn for_heading(heading: &str) -> Self {
        let heading = heading.trim();
        if NARRATIVE_HEADINGS
            .iter()
            .any(|h| h.eq_ignore_ascii_case(heading))
        {
            SectionKind::Narrative
        } else {
            SectionKind::DataRich
        }
    }
}

/// One planned section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineSection {
    heading: String,
    sub_headings: Vec<String>,
    kind: SectionKind,
}

impl OutlineSection {
    pub fn new<S: Into<String>>(heading: impl Into<String>, sub_headings: impl IntoIterator<Item = S>) -> Self {
        let heading = heading.into().trim().to_string();
        let kind = SectionKind::for_heading(&heading);
        Self {
            heading,
            sub_headings: sub_headings
                .into_iter()
                .map(|s| s.into().trim().to_string())
                .collect(),
            kind,
        }
    }

    pub fn heading(&self) -> &str {
        &self.heading
    }

    pub fn sub_headings(&self) -> &[String] {
        &self.sub_headings
    }

    pub fn kind(&self) -> SectionKind {
        self.kind
    }
}

/// The ordered section plan. Order is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOutline {
    sections: Vec<OutlineSection>,
}

impl ReportOutline {
    pub fn new(sections: Vec<OutlineSection>) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &[OutlineSection] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn headings(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.heading.clone()).collect()
    }
}

#[derive(Deserialize)]
struct SkeletonPayload {
    skeleton: Vec<SectionPayload>,
}

#[derive(Deserialize)]
struct SectionPayload {
    heading: String,
    sub_headings: Vec<String>,
}

/// JSON schema the outline response must satisfy.
pub fn outline_schema() -> Value {
    json!({
        "type": "object",
        "required": ["skeleton"],
        "properties": {
            "skeleton": {
                "type": "array",
                "description": "Report sections in reading order",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["heading", "sub_headings"],
                    "properties": {
                        "heading": {
                            "type": "string",
                            "description": "Heading of the section",
                            "pattern": "\\S"
                        },
                        "sub_headings": {
                            "type": "array",
                            "description": "Sub-headings in the section, in order",
                            "items": {"type": "string", "pattern": "\\S"}
                        }
                    }
                }
            }
        }
    })
}

/// Asks the generation service for the report outline.
pub struct SkeletonPlanner<'a> {
    generator: &'a dyn ContentGenerator,
    policy: RetryPolicy,
    callbacks: &'a PipelineCallbacks,
}

impl<'a> SkeletonPlanner<'a> {
    pub fn new(
        generator: &'a dyn ContentGenerator,
        policy: RetryPolicy,
        callbacks: &'a PipelineCallbacks,
    ) -> Self {
        Self {
            generator,
            policy,
            callbacks,
        }
    }

    /// Produce a validated outline, repairing malformed output within the
    /// attempt budget.
    pub async fn plan(&self, transcript: &SerializedTranscript) -> Result<ReportOutline> {
        let schema = outline_schema();
        let schema_text = serde_json::to_string_pretty(&schema).unwrap_or_default();
        let request = GenerationRequest::new(Purpose::Skeleton)
            .system(SKELETON_SYSTEM)
            .user(fill(
                SKELETON_USER,
                &[("schema", &schema_text), ("transcript", &transcript.text)],
            ));

        let payload: SkeletonPayload = generate_structured(
            self.generator,
            request,
            &schema,
            self.policy,
            |attempt, error| match error {
                StructuredError::Schema(e) => self.callbacks.emit(&PipelineEvent::SchemaRepair {
                    attempt,
                    error: e.to_string(),
                }),
                StructuredError::Llm(e) => {
                    tracing::warn!(attempt, error = %e, "Outline request failed");
                }
            },
        )
        .await
        .map_err(|exhausted| Error::Skeleton {
            attempts: exhausted.attempts,
            reason: exhausted.error.to_string(),
        })?;

        let outline = ReportOutline::new(
            payload
                .skeleton
                .into_iter()
                .map(|s| OutlineSection::new(s.heading, s.sub_headings))
                .collect(),
        );

        self.callbacks.emit(&PipelineEvent::SkeletonPlanned {
            headings: outline.headings(),
        });
        Ok(outline)
    }
}
