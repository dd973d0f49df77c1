#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use pdfqa::config::PdfConfig;
use pdfqa::pdf::DocumentLoader;
use pdfqa::session::{BuildOptions, SessionBuilder};
use pdfqa_core::chunk::TextChunker;
use pdfqa_core::embedding::Embedder;
use pdfqa_core::generate::{FragmentStream, TextGenerator};
use pdfqa_core::prompt::PromptMessage;
use pdfqa_core::tokenizer::ApproxTokenizer;
use pdfqa_core::Result;

pub fn pdfqa_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("pdfqa");
    path
}

// ============ PDF fixtures ============

pub struct FixtureImage {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// DeviceGray, 8 bits per component, unfiltered.
    pub pixels: Vec<u8>,
}

impl FixtureImage {
    pub fn gray(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            pixels: (0..width * height).map(|i| (i % 256) as u8).collect(),
        }
    }
}

#[derive(Default)]
pub struct FixturePage {
    pub lines: Vec<String>,
    pub images: Vec<FixtureImage>,
    /// Names painted with `Do` that have no XObject behind them.
    pub dangling_paints: Vec<String>,
}

impl FixturePage {
    pub fn text(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: FixtureImage) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_dangling_paint(mut self, name: &str) -> Self {
        self.dangling_paints.push(name.to_string());
        self
    }
}

fn escape_pdf_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// Assemble a PDF with a correct xref table. Object 1 is the catalog,
/// 2 the page tree, 3 the shared Helvetica font.
pub fn build_pdf(pages: &[FixturePage]) -> Vec<u8> {
    // (object number, body bytes)
    let mut objects: Vec<(usize, Vec<u8>)> = Vec::new();
    let mut next = 4;
    let mut page_ids = Vec::new();

    for page in pages {
        let page_id = next;
        let content_id = next + 1;
        next += 2;
        let image_ids: Vec<usize> = page
            .images
            .iter()
            .map(|_| {
                next += 1;
                next - 1
            })
            .collect();
        page_ids.push(page_id);

        let mut content = String::new();
        for (i, line) in page.lines.iter().enumerate() {
            content.push_str(&format!(
                "BT /F1 12 Tf 72 {} Td ({}) Tj ET\n",
                720 - 20 * i,
                escape_pdf_string(line)
            ));
        }
        for image in &page.images {
            content.push_str(&format!(
                "q {} 0 0 {} 72 72 cm /{} Do Q\n",
                image.width, image.height, image.name
            ));
        }
        for name in &page.dangling_paints {
            content.push_str(&format!("q 10 0 0 10 72 72 cm /{} Do Q\n", name));
        }

        let xobjects: String = page
            .images
            .iter()
            .zip(&image_ids)
            .map(|(image, id)| format!("/{} {} 0 R ", image.name, id))
            .collect();
        let page_body = format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R \
             /Resources << /Font << /F1 3 0 R >> /XObject << {}>> >> >>",
            content_id, xobjects
        );
        objects.push((page_id, page_body.into_bytes()));
        objects.push((content_id, stream_object("", content.as_bytes())));

        for (image, id) in page.images.iter().zip(&image_ids) {
            let dict = format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} \
                 /ColorSpace /DeviceGray /BitsPerComponent 8 ",
                image.width, image.height
            );
            objects.push((*id, stream_object(&dict, &image.pixels)));
        }
    }

    let kids: String = page_ids.iter().map(|id| format!("{} 0 R ", id)).collect();
    objects.push((1, b"<< /Type /Catalog /Pages 2 0 R >>".to_vec()));
    objects.push((
        2,
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, page_ids.len()).into_bytes(),
    ));
    objects.push((
        3,
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    ));
    objects.sort_by_key(|(id, _)| *id);

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = vec![0usize; next];
    for (id, body) in &objects {
        offsets[*id] = out.len();
        out.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", next).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets.iter().skip(1) {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!("trailer << /Size {} /Root 1 0 R >>\nstartxref\n", next).as_bytes(),
    );
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn stream_object(dict_entries: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!("<< {}/Length {} >>\nstream\n", dict_entries, data.len()).into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(b"\nendstream");
    body
}

pub fn single_line_pdf(line: &str) -> Vec<u8> {
    build_pdf(&[FixturePage::text(&[line])])
}

pub fn pdf_config(resolve_timeout_ms: u64) -> PdfConfig {
    PdfConfig {
        resolve_timeout_ms,
        ..PdfConfig::default()
    }
}

// ============ Capability fakes ============

const VOCABULARY: &[&str] = &[
    "capital", "france", "paris", "germany", "berlin", "river", "seine", "population",
];

/// Bag-of-words over a fixed vocabulary. Text with no vocabulary words maps
/// to the zero vector, which is orthogonal to everything.
pub struct VocabularyEmbedder {
    calls: Mutex<usize>,
}

impl VocabularyEmbedder {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; VOCABULARY.len()];
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            if let Some(i) = VOCABULARY.iter().position(|w| *w == word) {
                v[i] += 1.0;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for VocabularyEmbedder {
    fn model_name(&self) -> &str {
        "vocabulary"
    }
    fn dims(&self) -> usize {
        VOCABULARY.len()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        *self.calls.lock().unwrap() += 1;
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Embedder that blocks every call until the gate is opened.
pub struct GatedEmbedder {
    pub gate: Arc<tokio::sync::Notify>,
}

#[async_trait]
impl Embedder for GatedEmbedder {
    fn model_name(&self) -> &str {
        "gated"
    }
    fn dims(&self) -> usize {
        VOCABULARY.len()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.gate.notified().await;
        Ok(texts.iter().map(|t| VocabularyEmbedder::vector(t)).collect())
    }
}

/// Replies with fixed fragments and records every prompt it receives.
pub struct RecordingGenerator {
    pub fragments: Vec<String>,
    pub prompts: Mutex<Vec<Vec<PromptMessage>>>,
    /// Never finish after the fragments are sent.
    pub hang: bool,
}

impl RecordingGenerator {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            prompts: Mutex::new(Vec::new()),
            hang: false,
        }
    }

    pub fn hanging(fragments: &[&str]) -> Self {
        Self {
            hang: true,
            ..Self::new(fragments)
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<Vec<PromptMessage>> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, messages: &[PromptMessage]) -> Result<FragmentStream> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        let head = stream::iter(self.fragments.clone().into_iter().map(Ok));
        if self.hang {
            Ok(head.chain(stream::pending()).boxed())
        } else {
            Ok(head.boxed())
        }
    }
}

pub fn session_builder(embedder: Arc<dyn Embedder>, options: BuildOptions) -> SessionBuilder {
    SessionBuilder::new(
        DocumentLoader::new(&pdf_config(200)),
        TextChunker::new(64, Arc::new(ApproxTokenizer)),
        embedder,
        options,
    )
}

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(50);
