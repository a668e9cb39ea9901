//! Executive summary generation.

use super::events::{PipelineCallbacks, PipelineEvent};
use super::prompt::{CONVERSATION_SUMMARY_SYSTEM, DATA_RICH_GUIDELINES, EXECUTIVE_SUMMARY_SYSTEM, fill};
use crate::error::{Error, LlmError, Result};
use crate::html::GeneratedFragment;
use crate::llm::{ContentGenerator, GenerationRequest, Purpose, RetryPolicy, retry};
use crate::transcript::SerializedTranscript;

/// Condenses the transcript, then writes the executive summary from the
/// condensed text.
pub struct ExecutiveSummaryWriter<'a> {
    generator: &'a dyn ContentGenerator,
    policy: RetryPolicy,
    callbacks: &'a PipelineCallbacks,
}

impl<'a> ExecutiveSummaryWriter<'a> {
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

    pub async fn write(&self, transcript: &SerializedTranscript) -> Result<GeneratedFragment> {
        let fragment = retry(
            self.policy,
            |_| self.attempt(transcript),
            |attempt, error| {
                tracing::warn!(attempt, error = %error, "Executive summary attempt failed");
            },
        )
        .await
        .map_err(|exhausted| Error::Summary {
            attempts: exhausted.attempts,
            source: exhausted.error,
        })?;

        self.callbacks.emit(&PipelineEvent::SummaryWritten {
            chars: fragment.plain_text.len(),
        });
        Ok(fragment)
    }

    async fn attempt(&self, transcript: &SerializedTranscript) -> std::result::Result<GeneratedFragment, LlmError> {
        let condensed = self
            .generator
            .generate(
                &GenerationRequest::new(Purpose::ConversationSummary)
                    .system(CONVERSATION_SUMMARY_SYSTEM)
                    .user(transcript.text.as_str()),
            )
            .await?;
        if condensed.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let raw = self
            .generator
            .generate(
                &GenerationRequest::new(Purpose::ExecutiveSummary)
                    .system(fill(
                        EXECUTIVE_SUMMARY_SYSTEM,
                        &[("guidelines", DATA_RICH_GUIDELINES)],
                    ))
                    .user(condensed),
            )
            .await?;

        GeneratedFragment::from_generated(&raw)
    }
}
