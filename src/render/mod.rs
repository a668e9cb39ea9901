//! Rendering the five report fragments and merging them into one PDF.
//!
//! A [`RenderBackend`] opens one engine per run; the engine turns a single
//! HTML file into a PDF. [`RenderingCoordinator`] drives the engine over the
//! fixed fragment order, keeps every intermediate file inside a
//! [`RenderSession`], and merges the results page by page.

mod chromium;
mod merge;
mod session;

pub use chromium::ChromiumBackend;
pub use merge::merge_pdfs;
pub use session::RenderSession;

use crate::error::RenderError;
use crate::pipeline::events::{PipelineCallbacks, PipelineEvent};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

/// CSS that keeps tables and diagrams on one page.
pub const NO_SPLIT_CSS: &str = "table, tr, td, th { page-break-inside: avoid !important; }\n.mermaid { page-break-inside: avoid !important; }\n";

/// One of the five parts of the final artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    Title,
    Disclaimer,
    ExecutiveSummary,
    Report,
    End,
}

impl FragmentKind {
    /// Page order of the final artifact.
    pub const ALL: [FragmentKind; 5] = [
        FragmentKind::Title,
        FragmentKind::Disclaimer,
        FragmentKind::ExecutiveSummary,
        FragmentKind::Report,
        FragmentKind::End,
    ];

    /// File stem of the fragment's HTML file in a working directory.
    pub fn file_stem(self) -> &'static str {
        match self {
            FragmentKind::Title => "title",
            FragmentKind::Disclaimer => "disclaimer",
            FragmentKind::ExecutiveSummary => "executive_summary",
            FragmentKind::Report => "index",
            FragmentKind::End => "end",
        }
    }

    /// Page settings for this fragment.
    ///
    /// Title, disclaimer and end pages use plain settings. The executive
    /// summary gets margins and the no-split stylesheet; the report adds a
    /// running footer on top of that.
    pub fn page_options(self, branding: &str) -> PageOptions {
        match self {
            FragmentKind::Title | FragmentKind::Disclaimer | FragmentKind::End => PageOptions::default(),
            FragmentKind::ExecutiveSummary => PageOptions {
                margins: Some(Margins::content()),
                injected_css: Some(NO_SPLIT_CSS.to_string()),
                ..Default::default()
            },
            FragmentKind::Report => PageOptions {
                margins: Some(Margins::content()),
                footer_template: Some(footer_template(branding)),
                injected_css: Some(NO_SPLIT_CSS.to_string()),
                ..Default::default()
            },
        }
    }
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FragmentKind::Title => "title",
            FragmentKind::Disclaimer => "disclaimer",
            FragmentKind::ExecutiveSummary => "executive summary",
            FragmentKind::Report => "report",
            FragmentKind::End => "end",
        };
        f.write_str(name)
    }
}

/// Page margins as CSS lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Margins {
    pub top: String,
    pub bottom: String,
    pub left: String,
    pub right: String,
}

impl Margins {
    /// Margins for content pages; the bottom leaves room for the footer.
    pub fn content() -> Self {
        Self {
            top: "50px".to_string(),
            bottom: "60px".to_string(),
            left: "30px".to_string(),
            right: "30px".to_string(),
        }
    }
}

/// Options passed to the engine for one render call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageOptions {
    pub margins: Option<Margins>,
    /// Running header markup; `pageNumber`/`totalPages` spans are filled per page
    pub header_template: Option<String>,
    /// Running footer markup, same conventions as the header
    pub footer_template: Option<String>,
    /// Stylesheet appended to the document before rendering
    pub injected_css: Option<String>,
}

/// Footer markup with the branding line and page counter.
pub fn footer_template(branding: &str) -> String {
    format!(
        "<div style=\"width: 100%; font-size: 8px; text-align: center; color: #555;\"><span>{}</span> | Page <span class=\"pageNumber\"></span> of <span class=\"totalPages\"></span></div>",
        crate::html::escape_html(branding)
    )
}

/// The five fragment files of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentFiles {
    pub title: PathBuf,
    pub disclaimer: PathBuf,
    pub executive_summary: PathBuf,
    pub report: PathBuf,
    pub end: PathBuf,
}

impl FragmentFiles {
    /// Conventional file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        let path = |kind: FragmentKind| dir.join(format!("{}.html", kind.file_stem()));
        Self {
            title: path(FragmentKind::Title),
            disclaimer: path(FragmentKind::Disclaimer),
            executive_summary: path(FragmentKind::ExecutiveSummary),
            report: path(FragmentKind::Report),
            end: path(FragmentKind::End),
        }
    }

    pub fn path(&self, kind: FragmentKind) -> &Path {
        match kind {
            FragmentKind::Title => &self.title,
            FragmentKind::Disclaimer => &self.disclaimer,
            FragmentKind::ExecutiveSummary => &self.executive_summary,
            FragmentKind::Report => &self.report,
            FragmentKind::End => &self.end,
        }
    }

    /// Files in page order.
    pub fn iter(&self) -> impl Iterator<Item = (FragmentKind, &Path)> {
        FragmentKind::ALL.into_iter().map(move |kind| (kind, self.path(kind)))
    }
}

/// One page-rendering call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSpec {
    pub fragment: FragmentKind,
    pub html_path: PathBuf,
    pub page_options: PageOptions,
}

impl RenderSpec {
    /// Render calls for every fragment, in page order.
    pub fn plan(files: &FragmentFiles, branding: &str) -> Vec<RenderSpec> {
        files
            .iter()
            .map(|(fragment, path)| RenderSpec {
                fragment,
                html_path: path.to_path_buf(),
                page_options: fragment.page_options(branding),
            })
            .collect()
    }
}

/// A live page-rendering engine, owned by one run.
#[async_trait]
pub trait PageRenderer: Send {
    /// Render `html_path` to a PDF at `output`.
    async fn render_to_file(
        &mut self,
        html_path: &Path,
        options: &PageOptions,
        output: &Path,
    ) -> Result<(), RenderError>;

    /// Release the engine.
    async fn close(self: Box<Self>) -> Result<(), RenderError>;
}

/// Starts page-rendering engines.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Start an engine that may keep its own scratch files under `scratch`.
    async fn open(&self, scratch: &Path) -> Result<Box<dyn PageRenderer>, RenderError>;
}

/// Renders the fragment files in page order and merges them into one file.
pub struct RenderingCoordinator<'a> {
    backend: &'a dyn RenderBackend,
    scratch_root: PathBuf,
    branding: String,
    callbacks: &'a PipelineCallbacks,
}

impl<'a> RenderingCoordinator<'a> {
    pub fn new(
        backend: &'a dyn RenderBackend,
        scratch_root: impl Into<PathBuf>,
        branding: impl Into<String>,
        callbacks: &'a PipelineCallbacks,
    ) -> Self {
        Self {
            backend,
            scratch_root: scratch_root.into(),
            branding: branding.into(),
            callbacks,
        }
    }

    /// Render every fragment and write the merged result to `output`.
    ///
    /// Intermediate PDFs live in a session directory under the scratch root
    /// and are gone when this returns, whatever the outcome. On failure
    /// nothing is written at `output`.
    pub async fn render(&self, files: &FragmentFiles, output: &Path) -> Result<(), RenderError> {
        for (_, path) in files.iter() {
            if !tokio::fs::try_exists(path).await? {
                return Err(RenderError::MissingFragment(path.to_path_buf()));
            }
        }

        let specs = RenderSpec::plan(files, &self.branding);
        let mut session = RenderSession::open_in(&self.scratch_root)?;
        let result = self.render_in_session(&mut session, &specs, output).await;

        if let Err(e) = session.close() {
            tracing::warn!(error = %e, "Failed to clean up render session");
        }
        result
    }

    async fn render_in_session(
        &self,
        session: &mut RenderSession,
        specs: &[RenderSpec],
        output: &Path,
    ) -> Result<(), RenderError> {
        let mut engine = self.backend.open(session.path()).await?;
        let rendered = self.render_fragments(engine.as_mut(), session, specs).await;

        if let Err(e) = engine.close().await {
            tracing::warn!(error = %e, "Failed to close rendering engine");
        }

        let pdfs = rendered?;
        merge_pdfs(&pdfs, output).await?;
        tracing::debug!(output = %output.display(), fragments = pdfs.len(), "Merged rendered fragments");
        Ok(())
    }

    async fn render_fragments(
        &self,
        engine: &mut dyn PageRenderer,
        session: &mut RenderSession,
        specs: &[RenderSpec],
    ) -> Result<Vec<PathBuf>, RenderError> {
        let mut pdfs = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let temp = session.register(index, &spec.html_path);
            engine
                .render_to_file(&spec.html_path, &spec.page_options, &temp)
                .await?;
            self.callbacks.emit(&PipelineEvent::FragmentRendered {
                fragment: spec.fragment,
            });
            pdfs.push(temp);
        }
        Ok(pdfs)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::{Document, Object, dictionary};
    use std::path::Path;

    /// Key stored on every test page so merged page order can be checked.
    pub const LABEL_KEY: &str = "FolioLabel";

    /// Write a PDF with `pages` blank pages labelled `label-0`, `label-1`, ...
    pub fn write_labelled_pdf(path: &Path, label: &str, pages: usize) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();
        for i in 0..pages {
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                LABEL_KEY => Object::string_literal(format!("{}-{}", label, i)),
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    /// Labels of every page of the PDF at `path`, in page order.
    pub fn page_labels(path: &Path) -> Vec<String> {
        let doc = Document::load(path).unwrap();
        doc.get_pages()
            .values()
            .map(|id| {
                let page = doc.get_object(*id).unwrap().as_dict().unwrap();
                match page.get(LABEL_KEY.as_bytes()).unwrap() {
                    Object::String(bytes, _) => String::from_utf8_lossy(bytes).into_owned(),
                    other => panic!("unexpected label {:?}", other),
                }
            })
            .collect()
    }
}
