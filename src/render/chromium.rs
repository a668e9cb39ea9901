//! Page rendering through a headless Chromium executable.

use super::{PageOptions, PageRenderer, RenderBackend};
use crate::config::ReportConfig;
use crate::error::RenderError;
use crate::html::escape_html;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;

/// Executable names searched on `PATH`, in order.
const CANDIDATES: &[&str] = &["chromium", "chromium-browser", "google-chrome", "google-chrome-stable"];

/// Virtual time Chromium grants page scripts (diagrams) before printing.
const SCRIPT_BUDGET_MS: u64 = 10_000;

static HEAD_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</head\s*>").unwrap());
static HEAD_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<head\b[^>]*>").unwrap());
static COUNTER_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<span[^>]*class\s*=\s*["']?(pageNumber|totalPages)["']?[^>]*>\s*</span>"#).unwrap()
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Starts a headless Chromium per run.
#[derive(Debug, Clone)]
pub struct ChromiumBackend {
    executable: Option<PathBuf>,
    timeout: Duration,
}

impl ChromiumBackend {
    /// `executable` overrides the `PATH` search.
    pub fn new(executable: Option<PathBuf>, timeout: Duration) -> Self {
        Self { executable, timeout }
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(config.chromium.clone(), config.render_timeout)
    }

    /// Path of the executable that will be used.
    pub fn locate(&self) -> Result<PathBuf, RenderError> {
        if let Some(path) = &self.executable {
            return if path.is_file() {
                Ok(path.clone())
            } else {
                Err(RenderError::EngineNotFound(path.display().to_string()))
            };
        }
        CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .ok_or_else(|| RenderError::EngineNotFound(CANDIDATES.join(", ")))
    }
}

#[async_trait]
impl RenderBackend for ChromiumBackend {
    async fn open(&self, scratch: &Path) -> Result<Box<dyn PageRenderer>, RenderError> {
        let executable = self.locate()?;
        let profile_dir = scratch.join("chromium-profile");
        tokio::fs::create_dir_all(&profile_dir).await?;
        tracing::debug!(executable = %executable.display(), "Using Chromium");

        Ok(Box::new(ChromiumPage {
            executable,
            profile_dir,
            scratch: scratch.to_path_buf(),
            timeout: self.timeout,
            renders: 0,
        }))
    }
}

struct ChromiumPage {
    executable: PathBuf,
    profile_dir: PathBuf,
    scratch: PathBuf,
    timeout: Duration,
    renders: usize,
}

#[async_trait]
impl PageRenderer for ChromiumPage {
    async fn render_to_file(
        &mut self,
        html_path: &Path,
        options: &PageOptions,
        output: &Path,
    ) -> Result<(), RenderError> {
        let fragment = html_path.display().to_string();
        let source = tokio::fs::canonicalize(html_path)
            .await
            .map_err(|_| RenderError::MissingFragment(html_path.to_path_buf()))?;
        let html = tokio::fs::read_to_string(&source).await?;

        let base_dir = source.parent().unwrap_or(Path::new("/"));
        let base = directory_url(base_dir).map_err(|message| RenderError::Fragment {
            fragment: fragment.clone(),
            message,
        })?;
        let prepared = prepare_document(&html, &base, options);
        self.renders += 1;
        let page_file = std::path::absolute(self.scratch.join(format!("page_{}.html", self.renders)))?;
        let page_url = Url::from_file_path(&page_file).map_err(|()| RenderError::Fragment {
            fragment: fragment.clone(),
            message: format!("cannot address {} as a file URL", page_file.display()),
        })?;
        tokio::fs::write(&page_file, prepared).await?;

        let mut command = Command::new(&self.executable);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-pdf-header-footer")
            .arg("--run-all-compositor-stages-before-draw")
            .arg(format!("--virtual-time-budget={}", SCRIPT_BUDGET_MS))
            .arg(format!("--user-data-dir={}", self.profile_dir.display()))
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(page_url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(%fragment, output = %output.display(), "Rendering fragment");
        let result = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| RenderError::Timeout {
                fragment: fragment.clone(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| RenderError::Fragment {
                fragment: fragment.clone(),
                message: e.to_string(),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(RenderError::Fragment {
                fragment,
                message: format!(
                    "exited with {}: {}",
                    result.status,
                    tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
                ),
            });
        }
        if !tokio::fs::try_exists(output).await? {
            return Err(RenderError::Fragment {
                fragment,
                message: "no PDF was produced".to_string(),
            });
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), RenderError> {
        match tokio::fs::remove_dir_all(&self.profile_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Percent-encoded `file:` URL of a directory, with the trailing slash a
/// `<base>` needs.
pub(crate) fn directory_url(dir: &Path) -> Result<Url, String> {
    let dir = std::path::absolute(dir).map_err(|e| e.to_string())?;
    Url::from_directory_path(&dir)
        .map_err(|()| format!("cannot address {} as a file URL", dir.display()))
}

/// The document with a `<base>` pointing at its original directory and the
/// print stylesheet derived from `options`.
pub(crate) fn prepare_document(html: &str, base: &Url, options: &PageOptions) -> String {
    let injection = format!(
        "<base href=\"{}\">\n<style>\n{}</style>\n",
        escape_html(base.as_str()),
        print_css(options)
    );

    if let Some(close) = HEAD_CLOSE.find(html) {
        let mut out = String::with_capacity(html.len() + injection.len());
        out.push_str(&html[..close.start()]);
        out.push_str(&injection);
        out.push_str(&html[close.start()..]);
        out
    } else if let Some(open) = HEAD_OPEN.find(html) {
        let mut out = String::with_capacity(html.len() + injection.len());
        out.push_str(&html[..open.end()]);
        out.push_str(&injection);
        out.push_str(&html[open.end()..]);
        out
    } else {
        format!("<head>\n{}</head>\n{}", injection, html)
    }
}

/// Translate page options into a print stylesheet.
pub(crate) fn print_css(options: &PageOptions) -> String {
    let mut page_rules = vec!["size: A4;".to_string()];
    if let Some(m) = &options.margins {
        page_rules.push(format!("margin: {} {} {} {};", m.top, m.right, m.bottom, m.left));
    }
    if let Some(header) = &options.header_template {
        page_rules.push(format!(
            "@top-center {{ content: {}; font-size: 8px; color: #555; }}",
            margin_box_content(header)
        ));
    }
    if let Some(footer) = &options.footer_template {
        page_rules.push(format!(
            "@bottom-center {{ content: {}; font-size: 8px; color: #555; }}",
            margin_box_content(footer)
        ));
    }

    let mut css = format!("@page {{ {} }}\n", page_rules.join(" "));
    css.push_str("html { -webkit-print-color-adjust: exact; print-color-adjust: exact; }\n");
    if let Some(extra) = &options.injected_css {
        css.push_str(extra);
        if !extra.ends_with('\n') {
            css.push('\n');
        }
    }
    css
}

/// CSS `content` value for a header/footer template.
///
/// `pageNumber` and `totalPages` spans become page counters; other markup is
/// dropped and the text kept.
pub(crate) fn margin_box_content(template: &str) -> String {
    let mut parts = Vec::new();
    let mut last = 0;
    for cap in COUNTER_SPAN.captures_iter(template) {
        let (Some(whole), Some(class)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        push_text(&mut parts, &template[last..whole.start()]);
        parts.push(if class.as_str().eq_ignore_ascii_case("pageNumber") {
            "counter(page)".to_string()
        } else {
            "counter(pages)".to_string()
        });
        last = whole.end();
    }
    push_text(&mut parts, &template[last..]);

    if parts.is_empty() {
        "\"\"".to_string()
    } else {
        parts.join(" ")
    }
}

fn push_text(parts: &mut Vec<String>, markup: &str) {
    let text = TAG.replace_all(markup, "");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&copy;", "\u{a9}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    if text.is_empty() {
        return;
    }
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    parts.push(format!("\"{}\"", escaped));
}
