//! Fonts registered in a page or XObject scope.

use serde::{Deserialize, Serialize};

/// A font available to characters of one page or XObject.
///
/// `font_id` is the key in the owning scope's `/Font` resource dictionary and
/// is what characters reference through their style.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfFont {
    /// Base font name (`BASE64:...` when the name bytes are not UTF-8)
    pub name: String,

    /// Resource key in the owning scope
    pub font_id: String,

    /// Object number of the font dictionary, when indirect
    pub xref_id: Option<u32>,

    /// Bytes per character code (1 for simple fonts, usually 2 for CID fonts)
    pub encoding_length: u8,

    pub bold: bool,
    pub italic: bool,
    pub monospace: bool,
    pub serif: bool,

    /// Ascent in glyph space (thousandths of the font size)
    pub ascent: f32,

    /// Descent in glyph space, normally negative
    pub descent: f32,
}

impl PdfFont {
    /// Create a new font entry with default metrics.
    pub fn new(font_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            font_id: font_id.into(),
            encoding_length: 1,
            ..Default::default()
        }
    }

    /// Builder: set the encoding length.
    pub fn with_encoding_length(mut self, len: u8) -> Self {
        self.encoding_length = len;
        self
    }

    /// Builder: set ascent and descent.
    pub fn with_metrics(mut self, ascent: f32, descent: f32) -> Self {
        self.ascent = ascent;
        self.descent = descent;
        self
    }

    /// Descent offset in user space for the given font size.
    pub fn descent_offset(&self, font_size: f32) -> f32 {
        self.descent * font_size / 1000.0
    }
}
