//! PDF extraction.
//!
//! Turns PDF bytes into a [`pdfqa_core::models::Document`]: per-page text
//! and the raster images each page paints.
//!
//! # Pipeline
//!
//! ```text
//! bytes ──► DocumentLoader ──► lopdf::Document
//!               │
//!               ├─ per page (sequential, in page order):
//!               │     content stream ──► RenderedPage { fragments, ops }
//!               │     image XObjects ──► ObjectStore (decoded on a blocking worker)
//!               │
//!               └─ PageExtractor ──► Page { text, images }
//! ```
//!
//! Images are resolved by id from the page's [`ObjectStore`] while the
//! worker is still publishing them. A paint operation whose object never
//! appears is dropped after `pdf.resolve_timeout_ms`.

pub mod loader;
pub mod objects;
pub mod page;

pub use loader::DocumentLoader;
pub use objects::ObjectStore;
pub use page::{PageExtractor, PageOp, RenderedPage};

/// Every PDF file starts with this signature.
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Whether `bytes` begins with the PDF signature.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_check() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(is_pdf(b"%PDF-"));
        assert!(!is_pdf(b"%PDF"));
        assert!(!is_pdf(b""));
        assert!(!is_pdf(b"PK\x03\x04"));
        assert!(!is_pdf(b" %PDF-1.4"));
    }
}
