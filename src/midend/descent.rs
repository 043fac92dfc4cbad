//! Moves glyph boxes back onto the baseline.
//!
//! Parsed boxes start at the font's descent; typesetting wants them to start
//! at the baseline so that mixed fonts line up.

use crate::config::TranslationConfig;
use crate::error::Result;
use crate::model::{Document, Page, PdfCharacter};
use crate::progress::STAGE_REMOVE_DESCENT;

use super::helpers::mode_f32;

pub struct RemoveDescent;

impl RemoveDescent {
    pub fn process(document: &mut Document, config: &TranslationConfig) -> Result<()> {
        let stage = config
            .progress
            .stage_start(STAGE_REMOVE_DESCENT, document.page.len());
        for page in &mut document.page {
            config.raise_if_cancelled()?;
            Self::process_page(page);
            stage.advance(1);
        }
        Ok(())
    }

    pub fn process_page(page: &mut Page) {
        let mut chars = std::mem::take(&mut page.pdf_character);
        for ch in &mut chars {
            remove_char_descent(page, ch);
        }
        page.pdf_character = chars;

        let mut paragraphs = std::mem::take(&mut page.pdf_paragraph);
        for paragraph in &mut paragraphs {
            let mut descents = Vec::new();
            let mut all_vertical = true;
            for ch in paragraph.chars_mut() {
                if let Some(d) = remove_char_descent(page, ch) {
                    descents.push(d);
                    all_vertical &= ch.vertical;
                }
            }
            let Some(descent) = mode_f32(descents) else {
                continue;
            };
            let b = &mut paragraph.bbox;
            if all_vertical {
                b.x += descent;
                b.x2 += descent;
            } else {
                b.y -= descent;
                b.y2 -= descent;
            }
            for comp in &mut paragraph.compositions {
                comp.refresh_bbox();
            }
        }
        page.pdf_paragraph = paragraphs;
    }
}

/// Shift one glyph and return the descent that was removed.
fn remove_char_descent(page: &Page, ch: &mut PdfCharacter) -> Option<f32> {
    let font = page.find_font(ch.xobj_id, &ch.pdf_style.font_id)?;
    let descent = font.descent_offset(ch.pdf_style.font_size);
    ch.bbox = if ch.vertical {
        ch.bbox.offset(descent, 0.0)
    } else {
        ch.bbox.offset(0.0, -descent)
    };
    Some(descent)
}
