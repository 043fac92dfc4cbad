//! Single glyph occurrences.

use super::{PdfStyle, Rect};
use serde::{Deserialize, Serialize};

/// A glyph drawn on a page, in crop-box-relative page space.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfCharacter {
    pub pdf_style: PdfStyle,

    /// Glyph bounding box
    #[serde(rename = "box")]
    pub bbox: Rect,

    /// Drawn with a vertical text matrix
    pub vertical: bool,

    /// Relocation scale applied by typesetting
    pub scale: Option<f32>,

    /// Character code in the font (glyph id for substituted fonts)
    pub pdf_character_id: Option<u32>,

    /// Decoded text; `(cid:N)` when the code could not be mapped
    pub char_unicode: String,

    /// Horizontal advance in user space
    pub advance: Option<f32>,

    /// Owning XObject, `None` for page content
    pub xobj_id: Option<u32>,

    /// Debug-only glyph, emitted in dual output only
    pub debug_info: bool,
}

impl PdfCharacter {
    /// Create a new character.
    pub fn new(char_unicode: impl Into<String>, bbox: Rect, pdf_style: PdfStyle) -> Self {
        Self {
            pdf_style,
            bbox,
            char_unicode: char_unicode.into(),
            ..Default::default()
        }
    }

    /// Builder: set the character code.
    pub fn with_code(mut self, code: u32) -> Self {
        self.pdf_character_id = Some(code);
        self
    }

    /// Builder: set the advance width.
    pub fn with_advance(mut self, advance: f32) -> Self {
        self.advance = Some(advance);
        self
    }

    /// Builder: set the owning XObject.
    pub fn with_xobj(mut self, xobj_id: Option<u32>) -> Self {
        self.xobj_id = xobj_id;
        self
    }

    /// Whether the glyph could not be decoded to Unicode.
    pub fn is_cid_sentinel(&self) -> bool {
        self.char_unicode.starts_with("(cid:")
    }

    /// Whether the decoded text is whitespace only.
    pub fn is_space(&self) -> bool {
        !self.char_unicode.is_empty() && self.char_unicode.chars().all(char::is_whitespace)
    }

    pub fn font_size(&self) -> f32 {
        self.pdf_style.font_size
    }

    /// Width of the glyph box.
    pub fn width(&self) -> f32 {
        self.bbox.width()
    }
}
