//! Page-level types.

use super::{GraphicState, PdfCharacter, PdfFont, PdfParagraph, Rect};
use serde::{Deserialize, Serialize};

/// A region detected by the layout model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageLayout {
    #[serde(rename = "box")]
    pub bbox: Rect,

    /// Region id, unique within the page, starting at 1
    pub id: u32,

    /// Detection confidence
    pub conf: f32,

    /// Class label (`plain text`, `title`, `isolate_formula`, ...)
    pub class_name: String,
}

/// An image or other non-text drawing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfFigure {
    #[serde(rename = "box")]
    pub bbox: Rect,
}

/// A rectangle drawn for debugging.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfRectangle {
    #[serde(rename = "box")]
    pub bbox: Rect,
    pub graphic_state: Option<GraphicState>,
    pub debug_info: bool,
}

/// A Form XObject whose content is regenerated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PdfXobject {
    #[serde(rename = "box")]
    pub bbox: Rect,

    /// Fonts from the XObject's own resources
    pub pdf_font: Vec<PdfFont>,

    /// Non-text operators of the XObject stream
    pub base_operations: String,

    /// Document-wide XObject id
    pub xobj_id: u32,

    /// Object number of the XObject stream
    pub xref_id: u32,

    /// Generation number of the XObject stream
    pub xref_gen: u16,
}

/// A page of the IL document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Page {
    pub mediabox: Rect,
    pub cropbox: Rect,
    pub pdf_xobject: Vec<PdfXobject>,
    pub page_layout: Vec<PageLayout>,
    pub pdf_rectangle: Vec<PdfRectangle>,
    pub pdf_font: Vec<PdfFont>,
    pub pdf_paragraph: Vec<PdfParagraph>,
    pub pdf_figure: Vec<PdfFigure>,

    /// Characters not yet grouped into paragraphs
    pub pdf_character: Vec<PdfCharacter>,

    /// Non-text operators of the page stream
    pub base_operations: String,

    /// Page index in the source document (0-based)
    pub page_number: u32,

    /// Coordinate unit
    pub unit: String,
}

impl Page {
    /// Create a new empty page.
    pub fn new(page_number: u32) -> Self {
        Self {
            page_number,
            unit: "point".to_string(),
            ..Default::default()
        }
    }

    /// Look up a font in the XObject scope, then in the page scope.
    pub fn find_font(&self, xobj_id: Option<u32>, font_id: &str) -> Option<&PdfFont> {
        if let Some(id) = xobj_id {
            let found = self
                .pdf_xobject
                .iter()
                .find(|x| x.xobj_id == id)
                .and_then(|x| x.pdf_font.iter().find(|f| f.font_id == font_id));
            if found.is_some() {
                return found;
            }
        }
        self.pdf_font.iter().find(|f| f.font_id == font_id)
    }

    /// Look up a font strictly in one scope.
    pub fn font_in_scope(&self, xobj_id: Option<u32>, font_id: &str) -> Option<&PdfFont> {
        match xobj_id {
            Some(id) => self
                .pdf_xobject
                .iter()
                .find(|x| x.xobj_id == id)
                .and_then(|x| x.pdf_font.iter().find(|f| f.font_id == font_id)),
            None => self.pdf_font.iter().find(|f| f.font_id == font_id),
        }
    }

    pub fn xobject(&self, xobj_id: u32) -> Option<&PdfXobject> {
        self.pdf_xobject.iter().find(|x| x.xobj_id == xobj_id)
    }

    /// Crop box width and height.
    pub fn dimensions(&self) -> (f32, f32) {
        (self.cropbox.width(), self.cropbox.height())
    }

    /// Plain text of the paragraphs.
    pub fn plain_text(&self) -> String {
        self.pdf_paragraph
            .iter()
            .map(PdfParagraph::text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_scope_lookup() {
        let mut page = Page::new(0);
        page.pdf_font.push(PdfFont::new("F1", "Times"));
        page.pdf_xobject.push(PdfXobject {
            xobj_id: 3,
            pdf_font: vec![PdfFont::new("F1", "Inner")],
            ..Default::default()
        });
        assert_eq!(page.find_font(Some(3), "F1").unwrap().name, "Inner");
        assert_eq!(page.find_font(None, "F1").unwrap().name, "Times");
        assert_eq!(page.find_font(Some(9), "F1").unwrap().name, "Times");
        assert!(page.font_in_scope(Some(9), "F1").is_none());
    }
}
