//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use folio::llm::{ContentGenerator, GenerationRequest, Purpose};
use folio::{LlmError, PageOptions, PageRenderer, RenderBackend, RenderError};
use lopdf::{Document, Object, dictionary};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const LABEL_KEY: &str = "FolioLabel";

/// Rule-based generator: answers by request purpose.
pub struct ScriptedGenerator {
    pub headings: Vec<String>,
    /// Sections whose generation always fails
    pub failing: HashSet<String>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(headings: &[&str]) -> Self {
        Self {
            headings: headings.iter().map(|h| h.to_string()).collect(),
            failing: HashSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, heading: &str) -> Self {
        self.failing.insert(heading.to_string());
        self
    }

    pub fn purposes(&self) -> Vec<Purpose> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.purpose.clone())
            .collect()
    }

    pub fn section_attempts(&self, heading: &str) -> usize {
        self.purposes()
            .iter()
            .filter(|p| matches!(p, Purpose::Section { heading: h } if h == heading))
            .count()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        match &request.purpose {
            Purpose::Skeleton => {
                let sections: Vec<serde_json::Value> = self
                    .headings
                    .iter()
                    .map(|h| serde_json::json!({"heading": h, "sub_headings": ["Overview", "Details"]}))
                    .collect();
                Ok(format!(
                    "```json\n{}\n```",
                    serde_json::json!({ "skeleton": sections })
                ))
            }
            Purpose::ConversationSummary => Ok("Condensed findings.".to_string()),
            Purpose::ExecutiveSummary => Ok(
                "<html><body><h2>Executive Summary</h2><p>Go.</p></body></html>".to_string(),
            ),
            Purpose::Section { heading } => {
                if self.failing.contains(heading) {
                    Err(LlmError::Status {
                        status: 503,
                        body: "unavailable".to_string(),
                    })
                } else {
                    Ok(format!(
                        "<body><h2>{}</h2><p>Material for {} with A--&gt;B.</p></body>",
                        heading, heading
                    ))
                }
            }
            Purpose::Dedup { .. } => Ok("NO_OVERLAP".to_string()),
        }
    }
}

/// What the fake engine saw.
#[derive(Default)]
pub struct RenderLog {
    pub opened: usize,
    pub closed: usize,
    /// Fragment file stem and HTML content, in render order
    pub rendered: Vec<(String, String)>,
    pub options: HashMap<String, PageOptions>,
}

impl RenderLog {
    pub fn html(&self, stem: &str) -> &str {
        self.rendered
            .iter()
            .find(|(s, _)| s == stem)
            .map(|(_, html)| html.as_str())
            .unwrap()
    }
}

/// Writes a labelled PDF per fragment; the report gets two pages.
pub struct LabelBackend {
    pub fail_on: Option<String>,
    pub log: Arc<Mutex<RenderLog>>,
}

impl LabelBackend {
    pub fn new() -> Self {
        Self {
            fail_on: None,
            log: Arc::new(Mutex::new(RenderLog::default())),
        }
    }

    pub fn failing_on(stem: &str) -> Self {
        Self {
            fail_on: Some(stem.to_string()),
            ..Self::new()
        }
    }
}

struct LabelPage {
    fail_on: Option<String>,
    log: Arc<Mutex<RenderLog>>,
}

#[async_trait]
impl RenderBackend for LabelBackend {
    async fn open(&self, _scratch: &Path) -> Result<Box<dyn PageRenderer>, RenderError> {
        self.log.lock().unwrap().opened += 1;
        Ok(Box::new(LabelPage {
            fail_on: self.fail_on.clone(),
            log: self.log.clone(),
        }))
    }
}

#[async_trait]
impl PageRenderer for LabelPage {
    async fn render_to_file(
        &mut self,
        html_path: &Path,
        options: &PageOptions,
        output: &Path,
    ) -> Result<(), RenderError> {
        let stem = html_path.file_stem().unwrap().to_string_lossy().into_owned();
        let html = std::fs::read_to_string(html_path)?;
        {
            let mut log = self.log.lock().unwrap();
            log.rendered.push((stem.clone(), html));
            log.options.insert(stem.clone(), options.clone());
        }
        if self.fail_on.as_deref() == Some(stem.as_str()) {
            return Err(RenderError::Fragment {
                fragment: stem,
                message: "engine crashed".to_string(),
            });
        }
        let pages = if stem == "index" { 2 } else { 1 };
        write_labelled_pdf(output, &stem, pages);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), RenderError> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }
}

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

/// Every file and directory below `dir`.
pub fn tree(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.extend(tree(&path));
            }
            out.push(path);
        }
    }
    out
}
