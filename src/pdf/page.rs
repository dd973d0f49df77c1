//! Per-page text and image extraction.

use std::sync::Arc;
use std::time::Duration;

use pdfqa_core::models::{ImageRecord, Page};
use tracing::warn;

use super::objects::ObjectStore;

/// One operation of a page's rendering program, as far as extraction cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOp {
    /// Paints the image object with this id.
    PaintImage { object_id: String },
    /// Any other operator, kept for order only.
    Other(String),
}

/// A parsed page, ready for extraction.
pub struct RenderedPage {
    pub page_number: u32,
    /// Text fragments in content order. `None` marks a fragment the
    /// renderer produced without any string payload.
    pub fragments: Vec<Option<String>>,
    pub ops: Vec<PageOp>,
    pub objects: Arc<ObjectStore>,
}

/// Produces [`Page`]s from [`RenderedPage`]s.
#[derive(Debug, Clone, Copy)]
pub struct PageExtractor {
    resolve_timeout: Duration,
}

impl PageExtractor {
    pub fn new(resolve_timeout: Duration) -> Self {
        Self { resolve_timeout }
    }

    /// Join the page's fragments with single spaces, collapsing whitespace.
    pub fn extract_text(&self, page: &RenderedPage) -> String {
        page.fragments
            .iter()
            .flatten()
            .flat_map(|fragment| fragment.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Resolve every painted image in paint order.
    ///
    /// Images that time out or failed to decode are logged and left out.
    pub async fn extract_images(&self, page: &RenderedPage) -> Vec<ImageRecord> {
        let mut images = Vec::new();
        for op in &page.ops {
            let PageOp::PaintImage { object_id } = op else {
                continue;
            };
            match page.objects.resolve(object_id, self.resolve_timeout).await {
                Ok(image) => images.push(image.as_ref().clone()),
                Err(e) => warn!(
                    page = page.page_number,
                    object_id = %object_id,
                    error = %e,
                    "omitting image"
                ),
            }
        }
        images
    }

    pub async fn extract(&self, page: &RenderedPage) -> Page {
        Page {
            page_number: page.page_number,
            text: self.extract_text(page),
            images: self.extract_images(page).await,
        }
    }
}
