//! The report pipeline.
//!
//! A run flows through fixed stages: serialise the transcript, plan the
//! outline, write the executive summary, generate sections one at a time,
//! compile the two documents, then render and merge the final PDF.

mod dedup;
pub mod events;
pub(crate) mod prompt;
mod section;
mod skeleton;
mod summary;

pub use dedup::DeduplicationFilter;
pub use events::{EventCallback, PipelineCallbacks, PipelineEvent, tracing_callbacks};
pub use section::{AccumulatedText, SectionSynthesizer};
pub use skeleton::{OutlineSection, ReportOutline, SectionKind, SkeletonPlanner, outline_schema};
pub use summary::ExecutiveSummaryWriter;

use crate::compile::{PageTemplates, TitleInfo, compile};
use crate::config::ReportConfig;
use crate::error::{Error, Result};
use crate::llm::{ContentGenerator, LlmChoice, build_generator};
use crate::render::{ChromiumBackend, FragmentFiles, FragmentKind, RenderBackend, RenderingCoordinator};
use crate::transcript::{SerializedTranscript, TranscriptMessage, sanitize_filename};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Produces a report PDF from a transcript.
pub struct ReportPipeline {
    config: ReportConfig,
    generator: Arc<dyn ContentGenerator>,
    renderer: Arc<dyn RenderBackend>,
    callbacks: PipelineCallbacks,
}

impl ReportPipeline {
    pub fn new(
        config: ReportConfig,
        generator: Arc<dyn ContentGenerator>,
        renderer: Arc<dyn RenderBackend>,
    ) -> Self {
        Self {
            config,
            generator,
            renderer,
            callbacks: PipelineCallbacks::default(),
        }
    }

    /// Pipeline for `config` with the configured HTTP backend and Chromium.
    pub fn from_config(config: ReportConfig) -> Result<Self> {
        let generator = build_generator(&config)?;
        let renderer = Arc::new(ChromiumBackend::from_config(&config));
        Ok(Self::new(config, generator, renderer))
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Log every run event through `tracing`.
    pub fn verbose(mut self, enabled: bool) -> Self {
        if enabled {
            self.callbacks = tracing_callbacks();
        }
        self
    }

    /// Set a callback for section events.
    pub fn on_section<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_section = Some(Arc::new(f));
        self
    }

    /// Set a callback for fragment render events.
    pub fn on_render<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_render = Some(Arc::new(f));
        self
    }

    /// Set a callback for error events.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }

    /// Set a catch-all callback for any event.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.callbacks.on_event = Some(Arc::new(f));
        self
    }

    /// Record events for [`take_events`](Self::take_events).
    pub fn capture_events(mut self, enabled: bool) -> Self {
        self.callbacks.captured_events = enabled.then(|| Arc::new(Mutex::new(Vec::new())));
        self
    }

    /// Take the recorded events.
    pub fn take_events(&self) -> Vec<PipelineEvent> {
        self.callbacks.take_events()
    }

    /// Run the whole pipeline and return the path of the written PDF.
    ///
    /// The run is all-or-nothing: on any error no PDF exists at the target
    /// path and the run's working files are gone.
    pub async fn run(
        &self,
        transcript: &[TranscriptMessage],
        title: &TitleInfo,
        user_name: &str,
    ) -> Result<PathBuf> {
        let result = self.run_stages(transcript, title, user_name).await;
        match &result {
            Ok(output) => self.callbacks.emit(&PipelineEvent::Finished {
                output: output.clone(),
            }),
            Err(e) => self.callbacks.emit(&PipelineEvent::Error {
                message: e.to_string(),
            }),
        }
        result
    }

    async fn run_stages(
        &self,
        transcript: &[TranscriptMessage],
        title: &TitleInfo,
        user_name: &str,
    ) -> Result<PathBuf> {
        if transcript.is_empty() {
            return Err(Error::Transcript("transcript has no messages".to_string()));
        }
        let generator = self.generator.as_ref();
        let serialized = SerializedTranscript::from_messages(transcript);
        tracing::info!(
            messages = transcript.len(),
            references = serialized.references.len(),
            llm = %self.config.llm,
            model = %self.config.model,
            "Starting report run"
        );

        let outline = SkeletonPlanner::new(generator, self.config.skeleton_policy(), &self.callbacks)
            .plan(&serialized)
            .await?;
        let summary =
            ExecutiveSummaryWriter::new(generator, self.config.summary_policy(), &self.callbacks)
                .write(&serialized)
                .await?;
        let sections = SectionSynthesizer::new(
            generator,
            self.config.section_policy(),
            self.config.dedup,
            &self.callbacks,
        )
        .synthesize(&serialized, &outline)
        .await?;

        let compiled = compile(&summary, &sections, &serialized.references);
        let templates = PageTemplates::load(self.config.assets_dir.as_deref()).await?;

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let run_dir = tempfile::Builder::new()
            .prefix("folio-run-")
            .tempdir_in(&self.config.work_dir)?;
        let files = FragmentFiles::in_dir(run_dir.path());
        let date = chrono::Local::now().format("%B %-d, %Y").to_string();

        for kind in FragmentKind::ALL {
            let content = match kind {
                FragmentKind::Title => templates.title_page(title, user_name, &date),
                FragmentKind::Disclaimer => templates.disclaimer.clone(),
                FragmentKind::ExecutiveSummary => compiled.executive_summary_html.clone(),
                FragmentKind::Report => compiled.report_html.clone(),
                FragmentKind::End => templates.end.clone(),
            };
            tokio::fs::write(files.path(kind), content).await?;
        }

        tokio::fs::create_dir_all(&self.config.reports_dir).await?;
        let output = self
            .config
            .reports_dir
            .join(format!("{}.pdf", sanitize_filename(&title.title)));

        RenderingCoordinator::new(
            self.renderer.as_ref(),
            run_dir.path(),
            self.config.branding.as_str(),
            &self.callbacks,
        )
        .render(&files, &output)
        .await?;

        if let Err(e) = run_dir.close() {
            tracing::warn!(error = %e, "Failed to remove run directory");
        }
        Ok(output)
    }
}

/// Generate a report synchronously.
///
/// Configuration comes from the environment (see
/// [`ReportConfig::from_env`]); progress is logged through `tracing`.
///
/// This blocks on its own runtime, so it must not be called from async
/// code. Inside a runtime it returns [`Error::Config`]; use
/// [`ReportPipeline::run`] there instead.
pub fn run_generation(
    transcript: &[TranscriptMessage],
    title: &TitleInfo,
    user_name: &str,
    llm: LlmChoice,
    dedup: bool,
) -> Result<PathBuf> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(Error::Config(
            "run_generation blocks and cannot run inside an async runtime; await ReportPipeline::run instead"
                .to_string(),
        ));
    }
    let config = ReportConfig::from_env(llm).dedup(dedup);
    let pipeline = ReportPipeline::from_config(config)?.verbose(true);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(pipeline.run(transcript, title, user_name))
}
