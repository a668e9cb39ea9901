//! Page-level concatenation of rendered PDFs.

use crate::error::RenderError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITED_KEYS: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Concatenate the pages of `inputs`, in order, into `output`.
///
/// The merged file is written next to `output` and moved into place only
/// once complete, so a failed merge leaves nothing at `output`.
pub async fn merge_pdfs(inputs: &[PathBuf], output: &Path) -> Result<(), RenderError> {
    let inputs = inputs.to_vec();
    let output = output.to_path_buf();
    tokio::task::spawn_blocking(move || merge_blocking(&inputs, &output))
        .await
        .map_err(|e| RenderError::Merge(format!("merge task failed: {}", e)))?
}

fn merge_blocking(inputs: &[PathBuf], output: &Path) -> Result<(), RenderError> {
    let mut merged = merge_documents(inputs)?;

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut file = tempfile::NamedTempFile::new_in(&dir)?;
    merged.save_to(&mut file)?;
    file.flush()?;
    file.persist(output).map_err(|e| RenderError::Io(e.error))?;
    Ok(())
}

fn merge_documents(inputs: &[PathBuf]) -> Result<Document, RenderError> {
    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for path in inputs {
        let mut doc = Document::load(path)
            .map_err(|e| RenderError::Merge(format!("{}: {}", path.display(), e)))?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for (_, page_id) in doc.get_pages() {
            let mut page = doc.get_object(page_id)?.as_dict()?.clone();
            inherit_attributes(&doc, &mut page);
            pages.push((page_id, Object::Dictionary(page)));
        }
        objects.extend(doc.objects);
    }

    let mut document = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut pages_root: Option<(ObjectId, Dictionary)> = None;

    for (id, object) in objects {
        let type_name = object.type_name().unwrap_or(b"").to_vec();
        match type_name.as_slice() {
            b"Catalog" => {
                if catalog.is_none() {
                    catalog = Some((id, object.as_dict()?.clone()));
                }
            }
            b"Pages" => {
                if pages_root.is_none() {
                    pages_root = Some((id, object.as_dict()?.clone()));
                }
            }
            b"Page" | b"Outlines" | b"Outline" => {}
            _ => {
                document.objects.insert(id, object);
            }
        }
    }

    let (catalog_id, mut catalog) =
        catalog.ok_or_else(|| RenderError::Merge("no catalog in rendered fragments".to_string()))?;
    let (pages_id, mut pages_dict) =
        pages_root.ok_or_else(|| RenderError::Merge("no page tree in rendered fragments".to_string()))?;

    let kids: Vec<Object> = pages.iter().map(|(id, _)| Object::Reference(*id)).collect();
    let count = pages.len() as i64;
    for (id, page) in pages {
        if let Object::Dictionary(mut dict) = page {
            dict.set("Parent", pages_id);
            document.objects.insert(id, Object::Dictionary(dict));
        }
    }

    for key in INHERITED_KEYS {
        pages_dict.remove(key);
    }
    pages_dict.remove(b"Parent");
    pages_dict.set("Kids", kids);
    pages_dict.set("Count", count);
    document.objects.insert(pages_id, Object::Dictionary(pages_dict));

    catalog.set("Pages", pages_id);
    catalog.remove(b"Outlines");
    document.objects.insert(catalog_id, Object::Dictionary(catalog));

    document.trailer.set("Root", catalog_id);
    document.max_id = document.objects.keys().map(|(id, _)| *id).max().unwrap_or(0);
    document.renumber_objects();
    document.compress();
    Ok(document)
}

/// Copy inheritable attributes from the page's ancestors onto the page, since
/// intermediate page-tree nodes do not survive the merge.
fn inherit_attributes(doc: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    while let Some(id) = parent {
        let Ok(node) = doc.get_object(id).and_then(Object::as_dict) else {
            break;
        };
        for key in INHERITED_KEYS {
            if !page.has(key)
                && let Ok(value) = node.get(key)
            {
                page.set(key.to_vec(), value.clone());
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
}
