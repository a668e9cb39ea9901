//! Run configuration.

use crate::llm::{LlmChoice, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a report run.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Which backend generates content
    pub llm: LlmChoice,
    /// Model name passed to the backend
    pub model: String,
    /// Temperature for LLM sampling
    pub temperature: Option<f32>,
    /// Maximum tokens for LLM response
    pub max_tokens: Option<u32>,
    /// Timeout for a single service request
    pub request_timeout: Duration,
    /// Attempts (initial + repairs) for the outline
    pub skeleton_attempts: usize,
    /// Attempts per section
    pub section_attempts: usize,
    /// Attempts for the executive summary
    pub summary_attempts: usize,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// Rewrite each section to remove overlap with earlier ones
    pub dedup: bool,
    /// Directory with `title.html`, `disclaimer.html`, `end.html` overrides
    pub assets_dir: Option<PathBuf>,
    /// Where finished reports are written
    pub reports_dir: PathBuf,
    /// Parent of the per-run working directories
    pub work_dir: PathBuf,
    /// Chromium executable; searched on PATH when unset
    pub chromium: Option<PathBuf>,
    /// Time limit for rendering one fragment
    pub render_timeout: Duration,
    /// Branding line printed in the report footer
    pub branding: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            llm: LlmChoice::Gpt,
            model: LlmChoice::Gpt.default_model().to_string(),
            temperature: Some(0.7),
            max_tokens: None,
            request_timeout: Duration::from_secs(300),
            skeleton_attempts: 3,
            section_attempts: 3,
            summary_attempts: 3,
            retry_delay: Duration::from_millis(200),
            dedup: true,
            assets_dir: None,
            reports_dir: PathBuf::from("reports"),
            work_dir: std::env::temp_dir(),
            chromium: None,
            render_timeout: Duration::from_secs(120),
            branding: "AI Generated Report".to_string(),
        }
    }
}

impl ReportConfig {
    /// Create a config for the given backend with its default model.
    pub fn new(llm: LlmChoice) -> Self {
        Self {
            llm,
            model: llm.default_model().to_string(),
            ..Default::default()
        }
    }

    /// Load from process environment variables.
    pub fn from_env(llm: LlmChoice) -> Self {
        Self::from_lookup(llm, |key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    ///
    /// Recognised keys: the backend's model variable (`GPT_MODEL` or
    /// `CLAUDE_MODEL`), `FOLIO_REPORTS_DIR`, `FOLIO_WORK_DIR`,
    /// `FOLIO_ASSETS_DIR`, `FOLIO_CHROMIUM`, `FOLIO_BRANDING`.
    pub fn from_lookup<F>(llm: LlmChoice, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::new(llm);

        if let Some(model) = non_empty(llm.model_env()) {
            config.model = model;
        }
        if let Some(dir) = non_empty("FOLIO_REPORTS_DIR") {
            config.reports_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("FOLIO_WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("FOLIO_ASSETS_DIR") {
            config.assets_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = non_empty("FOLIO_CHROMIUM") {
            config.chromium = Some(PathBuf::from(path));
        }
        if let Some(branding) = non_empty("FOLIO_BRANDING") {
            config.branding = branding;
        }
        config
    }

    /// Set the model name.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the temperature.
    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Set the max tokens.
    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Enable or disable section deduplication.
    pub fn dedup(mut self, enabled: bool) -> Self {
        self.dedup = enabled;
        self
    }

    /// Set every stage's attempt budget at once.
    pub fn attempts(mut self, n: usize) -> Self {
        self.skeleton_attempts = n;
        self.section_attempts = n;
        self.summary_attempts = n;
        self
    }

    /// Set the pause between attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = Some(dir.into());
        self
    }

    pub fn reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = dir.into();
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn chromium(mut self, path: impl Into<PathBuf>) -> Self {
        self.chromium = Some(path.into());
        self
    }

    pub fn branding(mut self, branding: impl Into<String>) -> Self {
        self.branding = branding.into();
        self
    }

    pub(crate) fn skeleton_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.skeleton_attempts, self.retry_delay)
    }

    pub(crate) fn section_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.section_attempts, self.retry_delay)
    }

    pub(crate) fn summary_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.summary_attempts, self.retry_delay)
    }
}
