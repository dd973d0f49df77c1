//! Core data models used throughout pdfqa.
//!
//! These types represent the documents, pages, images, and chunks that flow
//! from extraction through chunking into the vector index. All of them are
//! immutable once produced.

use serde::Serialize;

/// An embedded raster image that was fully resolved from its page.
///
/// Records are never partially populated: if an image cannot be resolved
/// the page simply omits it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    /// Opaque identifier the page's paint operation referenced (the
    /// XObject resource name, e.g. `Im1`).
    pub object_id: String,
    /// Pixel payload. Decompressed when the stream filter chain could be
    /// decoded; otherwise the still-encoded bytes (see `filters`).
    #[serde(skip)]
    pub raw_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub color_space: Option<String>,
    pub bits_per_component: u8,
    /// Stream filters that remain applied to `raw_data` (empty when the
    /// payload is decoded pixels).
    pub filters: Vec<String>,
}

/// One page of a loaded document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// 1-based, contiguous within its document.
    pub page_number: u32,
    pub text: String,
    pub images: Vec<ImageRecord>,
}

/// A loaded PDF: its pages in order, identified by source path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub source: String,
    /// Hex SHA-256 of the source bytes.
    pub fingerprint: String,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Look up a page by its 1-based number.
    pub fn page(&self, page_number: u32) -> Option<&Page> {
        let idx = (page_number as usize).checked_sub(1)?;
        self.pages.get(idx).filter(|p| p.page_number == page_number)
    }

    /// Total number of images across all pages.
    pub fn image_count(&self) -> usize {
        self.pages.iter().map(|p| p.images.len()).sum()
    }
}

/// Weak back-reference from a chunk to the page it came from.
///
/// This is a lookup key, not an owning pointer: resolve it against the
/// document set that produced the chunk with [`PageRef::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PageRef {
    /// Position of the document in the build's input list.
    pub document_index: usize,
    pub source: String,
    pub page_number: u32,
}

impl PageRef {
    pub fn resolve<'a>(&self, documents: &'a [Document]) -> Option<&'a Page> {
        documents
            .get(self.document_index)
            .filter(|d| d.source == self.source)
            .and_then(|d| d.page(self.page_number))
    }
}

/// A bounded-length unit of page text sized for embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub text: String,
    pub source_ref: PageRef,
    /// Position of this chunk within its page, starting at 0.
    pub chunk_index: usize,
    /// Token count per the tokenizer used when chunking.
    pub token_count: usize,
    /// Hex SHA-256 of `text`.
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(source: &str, pages: usize) -> Document {
        Document {
            source: source.to_string(),
            fingerprint: String::new(),
            pages: (1..=pages as u32)
                .map(|n| Page {
                    page_number: n,
                    text: format!("page {}", n),
                    images: Vec::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn page_lookup_is_one_based() {
        let d = doc("a.pdf", 3);
        assert_eq!(d.page(1).map(|p| p.text.as_str()), Some("page 1"));
        assert_eq!(d.page(3).map(|p| p.text.as_str()), Some("page 3"));
        assert!(d.page(0).is_none());
        assert!(d.page(4).is_none());
    }

    #[test]
    fn page_ref_resolves_against_its_document() {
        let docs = vec![doc("a.pdf", 1), doc("b.pdf", 2)];
        let r = PageRef {
            document_index: 1,
            source: "b.pdf".to_string(),
            page_number: 2,
        };
        assert_eq!(r.resolve(&docs).map(|p| p.page_number), Some(2));

        let stale = PageRef {
            document_index: 0,
            source: "b.pdf".to_string(),
            page_number: 1,
        };
        assert!(stale.resolve(&docs).is_none());
    }
}
