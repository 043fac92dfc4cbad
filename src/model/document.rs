//! Document-level types.

use super::Page;
use serde::{Deserialize, Serialize};

/// The IL document: the pages selected for one translation run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    /// Selected pages in source order
    pub page: Vec<Page>,

    /// Page count of the source PDF
    pub total_pages: u32,
}

impl Document {
    /// Create a new empty document.
    pub fn new(total_pages: u32) -> Self {
        Self {
            page: Vec::new(),
            total_pages,
        }
    }

    /// Number of pages held in the IL.
    pub fn page_count(&self) -> usize {
        self.page.len()
    }

    /// Get a page by its source index (0-based).
    pub fn get_page(&self, page_number: u32) -> Option<&Page> {
        self.page.iter().find(|p| p.page_number == page_number)
    }

    /// Check if the document has any pages.
    pub fn is_empty(&self) -> bool {
        self.page.is_empty()
    }

    /// Total paragraphs across all pages.
    pub fn paragraph_count(&self) -> usize {
        self.page.iter().map(|p| p.pdf_paragraph.len()).sum()
    }

    /// Get plain text content of the entire document.
    pub fn plain_text(&self) -> String {
        self.page
            .iter()
            .map(Page::plain_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
