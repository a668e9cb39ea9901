//! Run events and callbacks for observability.

use crate::render::FragmentKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Events emitted while a report run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The outline was accepted
    SkeletonPlanned { headings: Vec<String> },
    /// Structured output was rejected and a repair was requested
    SchemaRepair { attempt: usize, error: String },
    /// The executive summary is ready
    SummaryWritten { chars: usize },
    /// Generation of a section began
    SectionStarted {
        index: usize,
        total: usize,
        heading: String,
    },
    /// A section attempt failed
    SectionRetry {
        heading: String,
        attempt: usize,
        error: String,
    },
    /// The dedup step ran for a section
    SectionDeduplicated { heading: String, changed: bool },
    /// A section was appended to the accumulated text
    SectionCommitted {
        index: usize,
        heading: String,
        chars: usize,
    },
    /// One fragment was rendered to a temporary file
    FragmentRendered { fragment: FragmentKind },
    /// The final file exists
    Finished { output: PathBuf },
    /// The run failed
    Error { message: String },
}

/// Type alias for event callbacks
pub type EventCallback = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Storage for run callbacks
#[derive(Default, Clone)]
pub struct PipelineCallbacks {
    pub on_section: Option<EventCallback>,
    pub on_render: Option<EventCallback>,
    pub on_error: Option<EventCallback>,
    /// Catch-all callback for any event
    pub on_event: Option<EventCallback>,
    /// Captured events, kept for inspection after a run
    pub(crate) captured_events: Option<Arc<Mutex<Vec<PipelineEvent>>>>,
}

impl PipelineCallbacks {
    /// Emit an event to the appropriate callback(s)
    pub fn emit(&self, event: &PipelineEvent) {
        if let Some(ref events) = self.captured_events
            && let Ok(mut events) = events.lock()
        {
            events.push(event.clone());
        }

        let specific = match event {
            PipelineEvent::SectionStarted { .. }
            | PipelineEvent::SectionRetry { .. }
            | PipelineEvent::SectionDeduplicated { .. }
            | PipelineEvent::SectionCommitted { .. } => self.on_section.as_ref(),
            PipelineEvent::FragmentRendered { .. } => self.on_render.as_ref(),
            PipelineEvent::Error { .. } => self.on_error.as_ref(),
            _ => None,
        };

        if let Some(cb) = specific {
            cb(event);
        }

        if let Some(cb) = &self.on_event {
            cb(event);
        }
    }

    /// Start recording every emitted event.
    pub fn capture(mut self) -> Self {
        self.captured_events = Some(Arc::new(Mutex::new(Vec::new())));
        self
    }

    /// Take the recorded events.
    pub fn take_events(&self) -> Vec<PipelineEvent> {
        if let Some(ref events) = self.captured_events
            && let Ok(mut events) = events.lock()
        {
            return std::mem::take(&mut *events);
        }
        Vec::new()
    }
}

/// Callbacks that forward every event to `tracing`.
pub fn tracing_callbacks() -> PipelineCallbacks {
    PipelineCallbacks {
        on_event: Some(Arc::new(|e| match e {
            PipelineEvent::SkeletonPlanned { headings } => {
                tracing::info!(sections = headings.len(), "Outline planned: {}", headings.join(" | "));
            }
            PipelineEvent::SchemaRepair { attempt, error } => {
                tracing::warn!(attempt, %error, "Outline rejected, requesting repair");
            }
            PipelineEvent::SummaryWritten { chars } => {
                tracing::info!(chars, "Executive summary written");
            }
            PipelineEvent::SectionStarted {
                index,
                total,
                heading,
            } => {
                tracing::info!("Section {}/{}: {}", index + 1, total, heading);
            }
            PipelineEvent::SectionRetry {
                heading,
                attempt,
                error,
            } => {
                tracing::warn!(%heading, attempt, %error, "Section attempt failed");
            }
            PipelineEvent::SectionDeduplicated { heading, changed } => {
                tracing::debug!(%heading, changed, "Dedup applied");
            }
            PipelineEvent::SectionCommitted { heading, chars, .. } => {
                tracing::info!(%heading, chars, "Section committed");
            }
            PipelineEvent::FragmentRendered { fragment } => {
                tracing::debug!(%fragment, "Fragment rendered");
            }
            PipelineEvent::Finished { output } => {
                tracing::info!(output = %output.display(), "Report written");
            }
            PipelineEvent::Error { message } => {
                tracing::error!(%message, "Report run failed");
            }
        })),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_specific_and_catch_all_callbacks() {
        let sections = Arc::new(AtomicUsize::new(0));
        let all = Arc::new(AtomicUsize::new(0));
        let (s, a) = (sections.clone(), all.clone());

        let callbacks = PipelineCallbacks {
            on_section: Some(Arc::new(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })),
            on_event: Some(Arc::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        };

        callbacks.emit(&PipelineEvent::SummaryWritten { chars: 10 });
        callbacks.emit(&PipelineEvent::SectionCommitted {
            index: 0,
            heading: "Intro".to_string(),
            chars: 5,
        });

        assert_eq!(sections.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_capture_and_take() {
        let callbacks = PipelineCallbacks::default().capture();
        callbacks.emit(&PipelineEvent::SummaryWritten { chars: 1 });

        assert_eq!(
            callbacks.take_events(),
            vec![PipelineEvent::SummaryWritten { chars: 1 }]
        );
        assert!(callbacks.take_events().is_empty());
    }
}
