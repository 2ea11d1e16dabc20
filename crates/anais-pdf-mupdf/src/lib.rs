use std::path::Path;

use mupdf::{Document, Page, TextPageFlags};

use anais_core::{BackendError, PdfBackend};

/// Vertical page bands dropped before text extraction.
///
/// Proceedings pages carry running headers ("Anais do XXXI SBIE") and
/// footers with page numbers; when they leak into the head window they end
/// up in titles and abstracts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    /// Fraction of page height from the top.
    pub header: f32,
    /// Fraction of page height from the bottom.
    pub footer: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            header: 0.04,
            footer: 0.05,
        }
    }
}

impl Margins {
    pub fn none() -> Self {
        Self {
            header: 0.0,
            footer: 0.0,
        }
    }

    /// Whether a block spanning `block_top..block_bottom` on a page spanning
    /// `page_top..page_bottom` is body text.
    pub fn keeps(&self, page_top: f32, page_bottom: f32, block_top: f32, block_bottom: f32) -> bool {
        let height = page_bottom - page_top;
        if self.header > 0.0 && block_bottom <= page_top + height * self.header {
            return false;
        }
        if self.footer > 0.0 && block_top >= page_bottom - height * self.footer {
            return false;
        }
        true
    }
}

/// MuPDF implementation of [`PdfBackend`], one string per page.
///
/// Kept in its own crate so only the binary links the AGPL mupdf library.
#[derive(Debug, Clone, Default)]
pub struct MupdfBackend {
    margins: Margins,
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    fn page_text(&self, page: &Page) -> Result<String, BackendError> {
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;
        let bounds = page
            .bounds()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

        let mut text = String::new();
        for block in text_page.blocks() {
            let b = block.bounds();
            if !self.margins.keeps(bounds.y0, bounds.y1, b.y0, b.y1) {
                continue;
            }
            for line in block.lines() {
                text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                text.push('\n');
            }
        }
        Ok(text)
    }
}

impl PdfBackend for MupdfBackend {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, BackendError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;
        let document =
            Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))?;

        let mut pages = Vec::new();
        for page in document
            .pages()
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?
        {
            let page = page.map_err(|e| BackendError::ExtractionError(e.to_string()))?;
            pages.push(self.page_text(&page)?);
        }
        tracing::debug!(path = %path.display(), pages = pages.len(), "extracted PDF text");
        Ok(pages)
    }
}
