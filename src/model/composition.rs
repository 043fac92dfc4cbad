//! Paragraph content elements.
//!
//! A paragraph is an ordered list of [`Composition`]s. Their shape changes as
//! the pipeline advances: raw lines from the paragraph finder, formula/text
//! splits from the segmenter, same-style runs, translated unicode runs and
//! finally positioned characters after typesetting.

use super::{PdfCharacter, PdfStyle, Rect};
use serde::{Deserialize, Serialize};

/// A visual line of characters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfLine {
    #[serde(rename = "box")]
    pub bbox: Rect,
    pub chars: Vec<PdfCharacter>,
}

/// An atomic, non-translatable run of characters.
///
/// `x_offset`/`y_offset` are measured from the nearest text composition on the
/// same line and preserve the formula's placement after reflow.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfFormula {
    #[serde(rename = "box")]
    pub bbox: Rect,
    pub chars: Vec<PdfCharacter>,
    pub x_offset: f32,
    pub y_offset: f32,
}

/// Consecutive characters sharing one style.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfSameStyleCharacters {
    #[serde(rename = "box")]
    pub bbox: Rect,
    pub pdf_style: PdfStyle,
    pub chars: Vec<PdfCharacter>,
}

/// Translated text awaiting typesetting.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfSameStyleUnicodeCharacters {
    pub pdf_style: Option<PdfStyle>,
    pub unicode: String,
    pub debug_info: bool,
}

/// One element of a paragraph's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Composition {
    Line(PdfLine),
    Formula(PdfFormula),
    SameStyleCharacters(PdfSameStyleCharacters),
    SameStyleUnicodeCharacters(PdfSameStyleUnicodeCharacters),
    Character(PdfCharacter),
}

impl PdfLine {
    /// Create a line from characters, computing its box.
    pub fn from_chars(chars: Vec<PdfCharacter>) -> Self {
        let bbox = chars_bbox(&chars);
        Self { bbox, chars }
    }
}

impl PdfFormula {
    /// Create a formula from characters, computing its box.
    pub fn from_chars(chars: Vec<PdfCharacter>) -> Self {
        let bbox = chars_bbox(&chars);
        Self {
            bbox,
            chars,
            x_offset: 0.0,
            y_offset: 0.0,
        }
    }
}

impl PdfSameStyleCharacters {
    /// Create a same-style run, computing its box.
    pub fn from_chars(pdf_style: PdfStyle, chars: Vec<PdfCharacter>) -> Self {
        let bbox = chars_bbox(&chars);
        Self {
            bbox,
            pdf_style,
            chars,
        }
    }
}

impl Composition {
    /// Original characters held by this composition (empty for unicode runs).
    pub fn chars(&self) -> &[PdfCharacter] {
        match self {
            Composition::Line(l) => &l.chars,
            Composition::Formula(f) => &f.chars,
            Composition::SameStyleCharacters(s) => &s.chars,
            Composition::SameStyleUnicodeCharacters(_) => &[],
            Composition::Character(c) => std::slice::from_ref(c),
        }
    }

    /// Mutable access to the original characters.
    pub fn chars_mut(&mut self) -> &mut [PdfCharacter] {
        match self {
            Composition::Line(l) => &mut l.chars,
            Composition::Formula(f) => &mut f.chars,
            Composition::SameStyleCharacters(s) => &mut s.chars,
            Composition::SameStyleUnicodeCharacters(_) => &mut [],
            Composition::Character(c) => std::slice::from_mut(c),
        }
    }

    /// Plain text of the composition.
    pub fn text(&self) -> String {
        match self {
            Composition::SameStyleUnicodeCharacters(u) => u.unicode.clone(),
            other => other.chars().iter().map(|c| c.char_unicode.as_str()).collect(),
        }
    }

    /// Bounding box, `None` for unicode runs and empty compositions.
    pub fn bbox(&self) -> Option<Rect> {
        match self {
            Composition::Line(l) if !l.chars.is_empty() => Some(l.bbox),
            Composition::Formula(f) if !f.chars.is_empty() => Some(f.bbox),
            Composition::SameStyleCharacters(s) if !s.chars.is_empty() => Some(s.bbox),
            Composition::Character(c) => Some(c.bbox),
            _ => None,
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, Composition::Formula(_))
    }

    /// Whether the composition still holds untouched original glyphs.
    pub fn is_original(&self) -> bool {
        !matches!(self, Composition::SameStyleUnicodeCharacters(_))
    }

    /// Recompute the cached box from the characters.
    pub fn refresh_bbox(&mut self) {
        match self {
            Composition::Line(l) => l.bbox = chars_bbox(&l.chars),
            Composition::Formula(f) => f.bbox = chars_bbox(&f.chars),
            Composition::SameStyleCharacters(s) => s.bbox = chars_bbox(&s.chars),
            _ => {}
        }
    }
}

/// Union of the characters' boxes, or an empty rectangle.
pub fn chars_bbox(chars: &[PdfCharacter]) -> Rect {
    Rect::union_all(chars.iter().map(|c| &c.bbox)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GraphicState, PdfStyle};

    fn ch(text: &str, x: f32) -> PdfCharacter {
        PdfCharacter::new(
            text,
            Rect::new(x, 0.0, x + 5.0, 10.0),
            PdfStyle::new("F1", 10.0, GraphicState::default()),
        )
    }

    #[test]
    fn test_composition_text_and_box() {
        let line = Composition::Line(PdfLine::from_chars(vec![ch("a", 0.0), ch("b", 5.0)]));
        assert_eq!(line.text(), "ab");
        assert_eq!(line.bbox(), Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(line.is_original());

        let uni = Composition::SameStyleUnicodeCharacters(PdfSameStyleUnicodeCharacters {
            unicode: "你好".into(),
            ..Default::default()
        });
        assert_eq!(uni.text(), "你好");
        assert!(uni.chars().is_empty());
        assert!(uni.bbox().is_none());
        assert!(!uni.is_original());
    }

    #[test]
    fn test_tagged_json_shape() {
        let c = Composition::Formula(PdfFormula::from_chars(vec![ch("x", 0.0)]));
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "formula");
        assert_eq!(json["chars"][0]["char_unicode"], "x");
    }
}
