//! Parsing options and configuration.

use crate::config::PageSelection;

/// Pages taller than this (in points) are skipped.
pub const DEFAULT_MAX_PAGE_HEIGHT: f32 = 1200.0;

/// Pages wider than this (in points) are skipped.
pub const DEFAULT_MAX_PAGE_WIDTH: f32 = 2000.0;

/// Default limit on nested Form XObjects.
pub const DEFAULT_MAX_XOBJECT_DEPTH: usize = 16;

/// Options for building the IL from a PDF.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Error handling mode
    pub error_mode: ErrorMode,

    /// Page selection (which pages to parse)
    pub pages: PageSelection,

    /// Crop boxes taller than this are skipped
    pub max_page_height: f32,

    /// Crop boxes wider than this are skipped
    pub max_page_width: f32,

    /// Maximum Form XObject nesting followed by the interpreter
    pub max_xobject_depth: usize,
}

impl ParseOptions {
    /// Create new parse options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set error mode.
    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    /// Enable strict mode (undecodable streams abort the page).
    pub fn strict(mut self) -> Self {
        self.error_mode = ErrorMode::Strict;
        self
    }

    /// Set page selection.
    pub fn with_pages(mut self, pages: PageSelection) -> Self {
        self.pages = pages;
        self
    }

    /// Set the page size limits.
    pub fn with_page_limits(mut self, max_height: f32, max_width: f32) -> Self {
        self.max_page_height = max_height;
        self.max_page_width = max_width;
        self
    }

    /// Set the XObject nesting limit.
    pub fn with_max_xobject_depth(mut self, depth: usize) -> Self {
        self.max_xobject_depth = depth;
        self
    }

    /// Whether a crop box of this size exceeds the limits.
    pub fn is_oversized(&self, width: f32, height: f32) -> bool {
        height > self.max_page_height || width > self.max_page_width
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            error_mode: ErrorMode::Lenient,
            pages: PageSelection::All,
            max_page_height: DEFAULT_MAX_PAGE_HEIGHT,
            max_page_width: DEFAULT_MAX_PAGE_WIDTH,
            max_xobject_depth: DEFAULT_MAX_XOBJECT_DEPTH,
        }
    }
}

/// Error handling mode during parsing.
///
/// Neither mode fails the document: a page whose content cannot be
/// interpreted is skipped with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// An undecodable content stream aborts its page
    Strict,
    /// Skip invalid content and continue
    #[default]
    Lenient,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options_builder() {
        let options = ParseOptions::new()
            .strict()
            .with_page_limits(800.0, 600.0)
            .with_max_xobject_depth(4);

        assert_eq!(options.error_mode, ErrorMode::Strict);
        assert!(options.is_oversized(700.0, 100.0));
        assert!(!options.is_oversized(600.0, 800.0));
        assert_eq!(options.max_xobject_depth, 4);
    }

    #[test]
    fn test_default_options() {
        let options = ParseOptions::default();
        assert_eq!(options.error_mode, ErrorMode::Lenient);
        assert!(options.is_oversized(100.0, 1200.5));
        assert!(options.is_oversized(2000.5, 100.0));
        assert!(!options.is_oversized(2000.0, 1200.0));
    }
}
