//! Text Locator Implementation
//!
//! Interprets each page's content stream and reports every word with its page-space
//! rectangle. The glyph index it builds on the way is kept for positional search.

use tracing::{debug, info, instrument};

use super::page_index::{DocumentIndex, PageIndex};
use crate::content::{interpret, load_pdf, page_content, PageResources};
use crate::error::{Error, Result};
use crate::types::{Document, TextToken};

#[derive(Debug, Default, Clone, Copy)]
pub struct TextLocator;

impl TextLocator {
    pub fn new() -> Self {
        Self
    }

    /// Word tokens ordered by page, then extraction order.
    #[instrument(skip_all, fields(bytes = document.len()))]
    pub fn locate(&self, document: &Document) -> Result<Vec<TextToken>> {
        Ok(self.index(document)?.tokens())
    }

    /// Interprets every page once. Bytes that are not a readable PDF, or a page whose
    /// content cannot be decoded in full, are a `MalformedDocument` error: a page that
    /// cannot be read cannot be searched.
    #[instrument(skip_all, fields(bytes = document.len()))]
    pub fn index(&self, document: &Document) -> Result<DocumentIndex> {
        let pdf = load_pdf(document.as_bytes())?;
        let pages = pdf.get_pages();

        let mut indexed = Vec::with_capacity(pages.len());
        for (position, (_, page_id)) in pages.iter().enumerate() {
            let page = position as u32;
            let resources = PageResources::load(&pdf, *page_id);
            let content = page_content(&pdf, *page_id);

            let glyphs = interpret(&content, &resources)
                .map_err(|e| Error::MalformedDocument(format!("page {}: {}", page, e)))?
                .glyphs;
            debug!("Page {}: {} glyphs", page, glyphs.len());
            indexed.push(PageIndex::build(page, &glyphs));
        }

        let index = DocumentIndex::new(indexed);
        info!(
            "🔎 Indexed {} pages, {} glyphs",
            index.page_count(),
            index.pages().iter().map(PageIndex::glyph_count).sum::<usize>()
        );
        Ok(index)
    }
}
