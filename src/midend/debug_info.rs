//! Debug overlays: coloured boxes and labels drawn into the dual output.

use crate::config::TranslationConfig;
use crate::error::Result;
use crate::fontmap::BASE_FONT_ID;
use crate::model::{
    Composition, Document, GraphicState, Page, PdfParagraph, PdfRectangle,
    PdfSameStyleUnicodeCharacters, PdfStyle, Rect,
};

pub const ORANGE: &str = "1.0000000000 0.5843137255 0.0000000000 rg 1.0000000000 0.5843137255 0.0000000000 RG";
pub const YELLOW: &str = "1.0000000000 0.8000000000 0.0000000000 rg 1.0000000000 0.8000000000 0.0000000000 RG";
pub const GREEN: &str = "0.2039215686 0.7803921569 0.3490196078 rg 0.2039215686 0.7803921569 0.3490196078 RG";
pub const BLUE: &str = "0.0000000000 0.4784313725 1.0000000000 rg 0.0000000000 0.4784313725 1.0000000000 RG";

const LABEL_FONT_SIZE: f32 = 4.0;

/// A debug-only rectangle around `bbox`.
pub fn debug_rectangle(bbox: Rect, color: &str) -> PdfRectangle {
    PdfRectangle {
        bbox,
        graphic_state: Some(GraphicState::with_passthrough(color)),
        debug_info: true,
    }
}

/// A debug-only text paragraph laid out inside `bbox`.
pub fn debug_text_in(text: &str, color: &str, bbox: Rect) -> PdfParagraph {
    let style = PdfStyle::new(BASE_FONT_ID, LABEL_FONT_SIZE, GraphicState::with_passthrough(color));
    PdfParagraph {
        bbox,
        pdf_style: Some(style.clone()),
        unicode: text.to_string(),
        compositions: vec![Composition::SameStyleUnicodeCharacters(
            PdfSameStyleUnicodeCharacters {
                pdf_style: Some(style),
                unicode: text.to_string(),
                debug_info: true,
            },
        )],
        ..Default::default()
    }
}

/// A debug label sitting on top of `bbox`.
pub fn debug_label(text: &str, color: &str, bbox: Rect) -> PdfParagraph {
    debug_text_in(text, color, Rect::new(bbox.x, bbox.y2, bbox.x2, bbox.y2 + 5.0))
}

/// Whether the paragraph is a debug overlay rather than page content.
pub fn is_debug_paragraph(paragraph: &PdfParagraph) -> bool {
    paragraph.compositions.iter().any(|c| {
        matches!(c, Composition::SameStyleUnicodeCharacters(u) if u.debug_info)
    })
}

/// Overlay paragraph, formula and XObject boxes when debugging.
pub struct AddDebugInformation;

impl AddDebugInformation {
    pub fn process(document: &mut Document, config: &TranslationConfig) -> Result<()> {
        if !config.debug {
            return Ok(());
        }
        for page in &mut document.page {
            config.raise_if_cancelled()?;
            Self::process_page(page);
        }
        Ok(())
    }

    pub fn process_page(page: &mut Page) {
        let crop = page.cropbox;
        let (w, h) = (crop.width(), crop.height());
        let number_box = Rect::new(crop.x + w * 0.02, crop.y, crop.x2, crop.y2 - h * 0.02);
        page.pdf_paragraph.push(debug_text_in(
            &format!("pagenumber: {}", page.page_number),
            BLUE,
            number_box,
        ));

        let mut labels = Vec::new();
        for paragraph in &page.pdf_paragraph {
            if paragraph.compositions.is_empty() || is_debug_paragraph(paragraph) {
                continue;
            }
            page.pdf_rectangle.push(debug_rectangle(paragraph.bbox, BLUE));
            let text = match &paragraph.debug_id {
                Some(id) => format!("paragraph[{}]", id),
                None => "paragraph".to_string(),
            };
            labels.push(debug_label(&text, BLUE, paragraph.bbox));

            for comp in &paragraph.compositions {
                if let Composition::Formula(f) = comp {
                    labels.push(debug_label("formula", ORANGE, f.bbox));
                    page.pdf_rectangle.push(debug_rectangle(f.bbox, ORANGE));
                }
            }
        }
        for xobj in &page.pdf_xobject {
            labels.push(debug_label("xobj", YELLOW, xobj.bbox));
            page.pdf_rectangle.push(debug_rectangle(xobj.bbox, YELLOW));
        }
        page.pdf_paragraph.extend(labels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PdfCharacter, PdfFormula, PdfLine, PdfXobject};

    fn ch(text: &str, x: f32) -> PdfCharacter {
        PdfCharacter::new(
            text,
            Rect::new(x, 100.0, x + 5.0, 110.0),
            PdfStyle::new("F1", 10.0, GraphicState::default()),
        )
    }

    #[test]
    fn test_overlays_added_once_per_item() {
        let mut page = Page::new(2);
        page.cropbox = Rect::new(0.0, 0.0, 600.0, 800.0);
        let mut p = PdfParagraph::with_compositions(vec![
            Composition::Line(PdfLine::from_chars(vec![ch("a", 10.0)])),
            Composition::Formula(PdfFormula::from_chars(vec![ch("x", 20.0)])),
        ]);
        p.debug_id = Some("abcde".into());
        page.pdf_paragraph.push(p);
        page.pdf_xobject.push(PdfXobject {
            bbox: Rect::new(0.0, 0.0, 50.0, 50.0),
            xobj_id: 1,
            ..Default::default()
        });

        AddDebugInformation::process_page(&mut page);

        let texts: Vec<&str> = page.pdf_paragraph.iter().map(|p| p.unicode.as_str()).collect();
        assert_eq!(
            texts,
            vec!["ax", "pagenumber: 2", "paragraph[abcde]", "formula", "xobj"]
        );
        assert_eq!(page.pdf_rectangle.len(), 3);
        assert!(page.pdf_rectangle.iter().all(|r| r.debug_info));
        assert!(is_debug_paragraph(&page.pdf_paragraph[1]));
        assert!(!is_debug_paragraph(&page.pdf_paragraph[0]));
    }

    #[test]
    fn test_label_sits_above_box() {
        let label = debug_label("x", GREEN, Rect::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(label.bbox, Rect::new(1.0, 4.0, 3.0, 9.0));
        assert_eq!(label.pdf_style.unwrap().font_size, 4.0);
    }
}
