//! Error types for folio.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while producing a report.
///
/// Every fatal stage failure of a run surfaces as exactly one of these.
#[derive(Error, Debug)]
pub enum Error {
    /// Content generation service error outside a retried stage
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// The outline could not be obtained or validated
    #[error("Skeleton planning failed after {attempts} attempts: {reason}")]
    Skeleton { attempts: usize, reason: String },

    /// A section exhausted its retry budget
    #[error("Section '{heading}' failed after {attempts} attempts ({completed} sections discarded): {source}")]
    SectionGeneration {
        heading: String,
        attempts: usize,
        /// Sections committed before the failure
        completed: usize,
        #[source]
        source: LlmError,
    },

    /// The executive summary exhausted its retry budget
    #[error("Executive summary failed after {attempts} attempts: {source}")]
    Summary {
        attempts: usize,
        #[source]
        source: LlmError,
    },

    /// A fragment failed to render, or the merge failed
    #[error("Rendering error: {0}")]
    Rendering(#[from] RenderError),

    /// The transcript could not be read
    #[error("Invalid transcript: {0}")]
    Transcript(String),

    /// Invalid configuration or calling context
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a content generation backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-success status from the service
    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// API key missing from the environment
    #[error("Missing API key: {0} is not set")]
    MissingApiKey(&'static str),

    /// The service answered but the body was unusable
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The service answered with no content
    #[error("Empty response")]
    EmptyResponse,
}

/// Structured output that failed to parse or validate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// No JSON object could be located in the response
    #[error("No JSON object found in response")]
    NoJson,

    /// The JSON text did not parse
    #[error("Invalid JSON: {0}")]
    Json(String),

    /// The JSON parsed but violated the schema
    #[error("Schema violation: {}", .0.join("; "))]
    Violations(Vec<String>),
}

/// Failures from the rendering coordinator.
#[derive(Error, Debug)]
pub enum RenderError {
    /// No page-rendering engine could be located
    #[error("No Chromium executable found (tried: {0})")]
    EngineNotFound(String),

    /// The engine failed on one fragment
    #[error("Failed to render {fragment}: {message}")]
    Fragment { fragment: String, message: String },

    /// The engine did not finish in time
    #[error("Rendering {fragment} timed out after {seconds}s")]
    Timeout { fragment: String, seconds: u64 },

    /// A fragment file is missing
    #[error("Fragment file not found: {0}")]
    MissingFragment(PathBuf),

    /// Merging or writing the final file failed
    #[error("Failed to merge rendered fragments: {0}")]
    Merge(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<lopdf::Error> for RenderError {
    fn from(err: lopdf::Error) -> Self {
        RenderError::Merge(err.to_string())
    }
}

/// Result type for folio operations.
pub type Result<T> = std::result::Result<T, Error>;
