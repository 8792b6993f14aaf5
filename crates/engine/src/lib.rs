//! Document collaborator: the `Document` seam and its PDF implementation.

use poh_core::{Destination, OutlineNode, TextFragment};

mod pdf_document;
mod pdfium;
mod text_ops;

pub use pdf_document::PdfDocument;

/// A loaded document as seen by the reader.
///
/// Pages are 1-based throughout. Implementations must be cheap to query
/// repeatedly; callers memoize text themselves.
pub trait Document {
    fn page_count(&self) -> u32;

    /// Positioned text runs for a page, in content-stream order.
    fn text_fragments(&self, page: u32) -> anyhow::Result<Vec<TextFragment>>;

    /// The outline tree with unresolved destinations. No outline is an empty vec.
    fn outline(&self) -> anyhow::Result<Vec<OutlineNode>>;

    fn resolve_destination(&self, dest: &Destination) -> anyhow::Result<Option<u32>>;

    fn render_page(
        &self,
        page: u32,
        target_width: i32,
        max_height: i32,
    ) -> anyhow::Result<RgbaBitmap> {
        let _ = (page, target_width, max_height);
        anyhow::bail!("rendering is not supported by this document")
    }
}

#[derive(Debug, Clone)]
pub struct RgbaBitmap {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub pixels: Vec<u8>,
}
