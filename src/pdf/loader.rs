//! PDF document loading.
//!
//! [`DocumentLoader::load_bytes`] validates the signature, parses the file
//! with `lopdf` on a blocking thread, and then walks the pages strictly in
//! order. For each page it:
//!
//! 1. decodes the content stream into [`PageOp`]s,
//! 2. registers the page's image XObjects in a fresh [`ObjectStore`] and
//!    decodes them on a `spawn_blocking` worker,
//! 3. runs the [`PageExtractor`] while the worker publishes.
//!
//! A page whose content stream cannot be decoded aborts the whole load.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lopdf::content::Content;
use lopdf::{Dictionary, Object, ObjectId, Stream};
use pdfqa_core::models::{Document, ImageRecord};
use pdfqa_core::{Error, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::objects::ObjectStore;
use super::page::{PageExtractor, PageOp, RenderedPage};
use crate::config::{PdfConfig, TextBackend};

/// Parent links followed when looking for inherited `/Resources`.
const MAX_TREE_DEPTH: usize = 32;

/// Image dictionary entries that may be indirect and are needed to decode.
const IMAGE_KEYS: [&[u8]; 6] = [
    b"Width",
    b"Height",
    b"BitsPerComponent",
    b"ColorSpace",
    b"Filter",
    b"ImageMask",
];

type XObjectEntry = (String, (XObjectKind, Option<Stream>));

/// Loads PDF files into [`Document`]s.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    resolve_timeout: Duration,
    text_backend: TextBackend,
}

/// Everything extraction needs from one page, detached from the parsed
/// `lopdf::Document`.
struct PagePlan {
    page_number: u32,
    fragments: Vec<Option<String>>,
    ops: Vec<PageOp>,
    images: Vec<(String, Stream)>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum XObjectKind {
    Image,
    Form,
    Other,
}

impl DocumentLoader {
    pub fn new(config: &PdfConfig) -> Self {
        Self {
            resolve_timeout: config.resolve_timeout(),
            text_backend: config.text_backend,
        }
    }

    /// Read and load the PDF at `path`.
    pub async fn load(&self, path: &Path) -> Result<Document> {
        let bytes = tokio::fs::read(path).await.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_bytes(&path.display().to_string(), bytes).await
    }

    /// Load every path in order. With `skip_unreadable`, files that fail to
    /// load are logged and left out; otherwise the first failure is returned.
    pub async fn load_all(
        &self,
        paths: &[PathBuf],
        skip_unreadable: bool,
    ) -> Result<Vec<Document>> {
        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            match self.load(path).await {
                Ok(doc) => documents.push(doc),
                Err(e) if skip_unreadable => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(documents)
    }

    /// Load a PDF already in memory. `source` names it in the result and in
    /// errors.
    pub async fn load_bytes(&self, source: &str, bytes: Vec<u8>) -> Result<Document> {
        if !super::is_pdf(&bytes) {
            return Err(Error::InvalidFormat {
                input: source.to_string(),
            });
        }

        let fingerprint = format!("{:x}", Sha256::digest(&bytes));

        let plans = {
            let name = source.to_string();
            let backend = self.text_backend;
            tokio::task::spawn_blocking(move || plan_pages(&name, &bytes, backend))
                .await
                .map_err(|e| Error::parse(source, format!("parser task failed: {}", e)))??
        };

        let extractor = PageExtractor::new(self.resolve_timeout);
        let mut pages = Vec::with_capacity(plans.len());
        for plan in plans {
            pages.push(extract_page(&extractor, plan).await);
        }

        let document = Document {
            source: source.to_string(),
            fingerprint,
            pages,
        };
        info!(
            source = %document.source,
            pages = document.page_count(),
            images = document.image_count(),
            "loaded document"
        );
        Ok(document)
    }
}

async fn extract_page(extractor: &PageExtractor, plan: PagePlan) -> pdfqa_core::models::Page {
    let store = Arc::new(ObjectStore::new());
    for (name, _) in &plan.images {
        store.register(name);
    }

    let worker = {
        let store = store.clone();
        let images = plan.images;
        tokio::task::spawn_blocking(move || {
            for (name, stream) in images {
                match decode_image(&name, &stream) {
                    Ok(image) => store.publish(&name, image),
                    Err(reason) => store.fail(&name, reason),
                }
            }
        })
    };

    let rendered = RenderedPage {
        page_number: plan.page_number,
        fragments: plan.fragments,
        ops: plan.ops,
        objects: store,
    };
    let page = extractor.extract(&rendered).await;

    if let Err(e) = worker.await {
        warn!(page = plan.page_number, error = %e, "image decoder failed");
    }
    debug!(
        page = page.page_number,
        chars = page.text.len(),
        images = page.images.len(),
        "extracted page"
    );
    page
}

/// Parse the document and collect every page's fragments, operations and
/// image streams. Runs on a blocking thread.
fn plan_pages(source: &str, bytes: &[u8], backend: TextBackend) -> Result<Vec<PagePlan>> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| Error::parse(source, e))?;
    let page_ids = doc.get_pages();

    let rendered_text = match backend {
        TextBackend::Lopdf => None,
        TextBackend::PdfExtract => {
            let pages = pdf_extract_pages(source, bytes)?;
            Some(check_page_count(source, pages, page_ids.len())?)
        }
    };

    let mut plans = Vec::with_capacity(page_ids.len());
    for (index, (&page_number, &page_id)) in page_ids.iter().enumerate() {
        let xobjects = page_xobjects(&doc, page_id);

        let content = doc
            .get_page_content(page_id)
            .map_err(|e| Error::parse(source, format!("page {}: {}", page_number, e)))?;
        let content = Content::decode(&content)
            .map_err(|e| Error::parse(source, format!("page {}: {}", page_number, e)))?;
        let ops = content
            .operations
            .iter()
            .map(|op| classify(&op.operator, &op.operands, &xobjects))
            .collect();

        let text = match &rendered_text {
            Some(pages) => pages.get(index).cloned().unwrap_or_default(),
            None => doc
                .extract_text(&[page_number])
                .map_err(|e| Error::parse(source, format!("page {}: {}", page_number, e)))?,
        };

        let images = xobjects
            .into_iter()
            .filter_map(|(name, (kind, stream))| match (kind, stream) {
                (XObjectKind::Image, Some(stream)) => Some((name, stream)),
                _ => None,
            })
            .collect::<Vec<_>>();

        plans.push(PagePlan {
            page_number,
            fragments: text_fragments(&text),
            ops,
            images,
        });
    }
    Ok(plans)
}

/// The text backend and lopdf must agree on the page count, or text would
/// land on the wrong pages.
fn check_page_count(source: &str, pages: Vec<String>, expected: usize) -> Result<Vec<String>> {
    if pages.len() != expected {
        return Err(Error::parse(
            source,
            format!(
                "pdf-extract found {} pages, lopdf found {}",
                pages.len(),
                expected
            ),
        ));
    }
    Ok(pages)
}

fn pdf_extract_pages(source: &str, bytes: &[u8]) -> Result<Vec<String>> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(Error::parse(source, e)),
        Err(_) => Err(Error::parse(source, "pdf-extract panicked while rendering text")),
    }
}

/// One fragment per rendered line; blank lines carry no payload.
fn text_fragments(text: &str) -> Vec<Option<String>> {
    text.lines()
        .map(|line| {
            let line = line.trim();
            (!line.is_empty()).then(|| line.to_string())
        })
        .collect()
}

fn classify(
    operator: &str,
    operands: &[Object],
    xobjects: &[XObjectEntry],
) -> PageOp {
    if operator != "Do" {
        return PageOp::Other(operator.to_string());
    }
    let Some(Object::Name(name)) = operands.first() else {
        return PageOp::Other(operator.to_string());
    };
    let name = String::from_utf8_lossy(name).into_owned();
    let kind = xobjects
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, (kind, _))| *kind);
    match kind {
        // Unknown names still paint: they resolve to nothing and get dropped.
        Some(XObjectKind::Image) | None => PageOp::PaintImage { object_id: name },
        Some(XObjectKind::Form) | Some(XObjectKind::Other) => {
            PageOp::Other(operator.to_string())
        }
    }
}

fn deref<'a>(doc: &'a lopdf::Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn as_dict<'a>(doc: &'a lopdf::Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match deref(doc, obj) {
        Object::Dictionary(d) => Some(d),
        _ => None,
    }
}

/// The page's `/Resources`, inherited from the nearest ancestor that has one.
fn page_resources(doc: &lopdf::Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return as_dict(doc, resources);
        }
        match node.get(b"Parent") {
            Ok(Object::Reference(parent)) => node = doc.get_dictionary(*parent).ok()?,
            _ => return None,
        }
    }
    None
}

/// The page's XObjects in resource order. Image streams are detached with
/// the dictionary entries decoding needs already dereferenced.
fn page_xobjects(doc: &lopdf::Document, page_id: ObjectId) -> Vec<XObjectEntry> {
    let Some(xobjects) = page_resources(doc, page_id)
        .and_then(|r| r.get(b"XObject").ok())
        .and_then(|x| as_dict(doc, x))
    else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for (name, obj) in xobjects.iter() {
        let name = String::from_utf8_lossy(name).into_owned();
        if !seen.insert(name.clone()) {
            continue;
        }
        let entry = match deref(doc, obj) {
            Object::Stream(stream) => match stream.dict.get(b"Subtype") {
                Ok(Object::Name(n)) if n == b"Image" => {
                    (XObjectKind::Image, Some(detach_image(doc, stream)))
                }
                Ok(Object::Name(n)) if n == b"Form" => (XObjectKind::Form, None),
                _ => (XObjectKind::Other, None),
            },
            _ => (XObjectKind::Other, None),
        };
        out.push((name, entry));
    }
    out
}

fn detach_image(doc: &lopdf::Document, stream: &Stream) -> Stream {
    let mut detached = stream.clone();
    for key in IMAGE_KEYS {
        if let Ok(value) = stream.dict.get(key) {
            detached.dict.set(key.to_vec(), deref(doc, value).clone());
        }
    }
    detached
}

fn int_value(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match dict.get(key).ok()? {
        Object::Integer(i) => Some(*i),
        Object::Real(r) => Some(*r as i64),
        _ => None,
    }
}

fn name_string(obj: &Object) -> Option<String> {
    match obj {
        Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
        _ => None,
    }
}

fn positive_dimension(dict: &Dictionary, key: &str) -> std::result::Result<u32, String> {
    int_value(dict, key.as_bytes())
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
        .ok_or_else(|| format!("missing or invalid /{}", key))
}

/// Build an [`ImageRecord`] from a detached image XObject stream.
fn decode_image(object_id: &str, stream: &Stream) -> std::result::Result<ImageRecord, String> {
    let dict = &stream.dict;
    let width = positive_dimension(dict, "Width")?;
    let height = positive_dimension(dict, "Height")?;

    let image_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
    let bits_per_component = if image_mask {
        1
    } else {
        int_value(dict, b"BitsPerComponent")
            .and_then(|v| u8::try_from(v).ok())
            .filter(|v| *v > 0)
            .ok_or_else(|| "missing or invalid /BitsPerComponent".to_string())?
    };

    let color_space = match dict.get(b"ColorSpace") {
        Ok(Object::Array(items)) => items.first().and_then(name_string),
        Ok(other) => name_string(other),
        Err(_) => None,
    };

    let filters: Vec<String> = match dict.get(b"Filter") {
        Ok(Object::Array(items)) => items.iter().filter_map(name_string).collect(),
        Ok(other) => name_string(other).into_iter().collect(),
        Err(_) => Vec::new(),
    };

    let (raw_data, filters) = if filters.is_empty() {
        (stream.content.clone(), filters)
    } else {
        match stream.decompressed_content() {
            Ok(data) => (data, Vec::new()),
            Err(_) => (stream.content.clone(), filters),
        }
    };

    Ok(ImageRecord {
        object_id: object_id.to_string(),
        raw_data,
        width,
        height,
        color_space,
        bits_per_component,
        filters,
    })
}
