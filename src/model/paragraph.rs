//! Paragraphs: the unit of translation and typesetting.

use super::{Composition, PdfCharacter, PdfStyle, Rect};
use serde::{Deserialize, Serialize};

/// A paragraph of page content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfParagraph {
    /// Bounding box of all content
    #[serde(rename = "box")]
    pub bbox: Rect,

    /// Base style shared by most characters
    pub pdf_style: Option<PdfStyle>,

    /// Ordered content in reading order
    pub compositions: Vec<Composition>,

    /// Owning XObject, `None` for page content
    pub xobj_id: Option<u32>,

    /// Plain text cache used for translation
    pub unicode: String,

    /// Scale chosen by typesetting
    pub scale: Option<f32>,

    pub vertical: bool,

    /// First line starts right of the paragraph's left edge
    pub first_line_indent: bool,

    /// Identifier for debug output
    pub debug_id: Option<String>,

    /// Layout region the paragraph was grouped from
    pub layout_id: Option<u32>,
}

impl PdfParagraph {
    /// Create a new empty paragraph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a paragraph from compositions, computing box and text.
    pub fn with_compositions(compositions: Vec<Composition>) -> Self {
        let mut p = Self {
            compositions,
            ..Default::default()
        };
        p.refresh();
        p
    }

    /// All original characters in reading order.
    pub fn chars(&self) -> impl Iterator<Item = &PdfCharacter> {
        self.compositions.iter().flat_map(|c| c.chars().iter())
    }

    /// Mutable iterator over all original characters.
    pub fn chars_mut(&mut self) -> impl Iterator<Item = &mut PdfCharacter> {
        self.compositions.iter_mut().flat_map(|c| c.chars_mut().iter_mut())
    }

    /// Concatenated text of all compositions.
    pub fn text(&self) -> String {
        self.compositions.iter().map(Composition::text).collect()
    }

    /// Recompute the box and the unicode cache from the compositions.
    pub fn refresh(&mut self) {
        for comp in &mut self.compositions {
            comp.refresh_bbox();
        }
        let boxes: Vec<Rect> = self.compositions.iter().filter_map(Composition::bbox).collect();
        if let Some(bbox) = Rect::union_all(boxes.iter()) {
            self.bbox = bbox;
        }
        self.unicode = self.text();
    }

    /// Whether every composition still holds original glyphs.
    pub fn is_untranslated(&self) -> bool {
        self.compositions.iter().all(Composition::is_original)
    }

    /// Whether there is nothing to render.
    pub fn is_empty(&self) -> bool {
        self.compositions.is_empty()
    }
}
