//! Folio - conversation transcripts to paginated PDF reports
//!
//! Folio turns a user/assistant transcript into a sectioned report. A
//! content generation service plans the outline, writes an executive
//! summary and then each section in order, with every section conditioned
//! on the text committed before it. The compiled documents are rendered
//! fragment by fragment (title, disclaimer, executive summary, report, end)
//! and merged into one PDF.
//!
//! # Quick Start
//!
//! ```ignore
//! use folio::{LlmChoice, TitleInfo, load_transcript, run_generation};
//!
//! fn main() -> folio::Result<()> {
//!     let transcript = load_transcript("chat.json".as_ref())?;
//!     let title = TitleInfo::new("Heat Pumps", "Costs and efficiency");
//!
//!     let pdf = run_generation(&transcript, &title, "Dana", LlmChoice::Gpt, true)?;
//!     println!("Report written to {}", pdf.display());
//!     Ok(())
//! }
//! ```

pub mod compile;
mod config;
mod error;
pub mod html;
pub mod llm;
pub mod pipeline;
pub mod render;
mod transcript;

pub use compile::{CompiledDocument, PageTemplates, TitleInfo, compile};
pub use config::ReportConfig;
pub use error::{Error, LlmError, RenderError, Result, SchemaError};
pub use html::GeneratedFragment;
pub use llm::{ContentGenerator, GenerationRequest, LlmChoice, Purpose, RetryPolicy};
pub use pipeline::{
    AccumulatedText, PipelineCallbacks, PipelineEvent, ReportOutline, ReportPipeline, run_generation,
};
pub use render::{
    ChromiumBackend, FragmentFiles, FragmentKind, PageOptions, PageRenderer, RenderBackend,
    RenderingCoordinator,
};
pub use transcript::{
    ReferenceExtractor, ReferenceSet, Role, SerializedTranscript, TranscriptMessage, load_transcript,
    parse_transcript, sanitize_filename,
};
