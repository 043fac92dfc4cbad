//! Groups a page's loose characters into lines and paragraphs.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::TranslationConfig;
use crate::error::Result;
use crate::model::{Composition, Document, Page, PdfCharacter, PdfLine, PdfParagraph, Rect};
use crate::progress::STAGE_PARAGRAPHS;

use super::helpers::{add_space_dummy_chars, char_unicode_string, is_newline, median};

/// Layout classes whose characters form translatable paragraphs.
pub const TEXT_LAYOUT_CLASSES: &[&str] = &[
    "plain text",
    "tiny text",
    "title",
    "abandon",
    "figure_caption",
    "table_caption",
];

/// Overlapping regions resolve to the earliest class in this list.
pub const LAYOUT_PRIORITY: &[&str] = &[
    "formula_caption",
    "isolate_formula",
    "table_footnote",
    "table_caption",
    "figure_caption",
    "table",
    "figure",
    "abandon",
    "plain text",
    "tiny text",
    "title",
];

const ISOLATE_FORMULA: &str = "isolate_formula";

/// Glyphs that always belong to display formulas.
const ISOLATED_FORMULA_CHARS: &[&str] = &["(cid:122)", "(cid:123)", "(cid:124)", "(cid:125)"];

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// A layout region resolved for one character.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLayout {
    pub id: u32,
    pub name: String,
}

impl ResolvedLayout {
    pub fn is_text(&self) -> bool {
        TEXT_LAYOUT_CLASSES.contains(&self.name.as_str())
    }
}

/// Random five-character identifier for debug output.
pub fn generate_debug_id() -> String {
    uuid::Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(5)
        .map(|b| BASE58_ALPHABET[*b as usize % BASE58_ALPHABET.len()] as char)
        .collect()
}

fn toc_leader_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.{20,}").unwrap())
}

/// Paragraph detection settings.
#[derive(Debug, Clone, Copy)]
pub struct ParagraphFinder {
    split_short_lines: bool,
    short_line_split_factor: f32,
}

impl ParagraphFinder {
    pub fn new(split_short_lines: bool, short_line_split_factor: f32) -> Self {
        Self {
            split_short_lines,
            short_line_split_factor,
        }
    }

    pub fn from_config(config: &TranslationConfig) -> Self {
        Self::new(config.split_short_lines, config.short_line_split_factor)
    }

    pub fn process(&self, document: &mut Document, config: &TranslationConfig) -> Result<()> {
        let stage = config.progress.stage_start(STAGE_PARAGRAPHS, document.page.len());
        for page in &mut document.page {
            config.raise_if_cancelled()?;
            self.process_page(page);
            stage.advance(1);
        }
        Ok(())
    }

    pub fn process_page(&self, page: &mut Page) {
        let mut paragraphs = self.create_paragraphs(page);

        for paragraph in &mut paragraphs {
            add_space_dummy_chars(paragraph);
            process_paragraph_spacing(paragraph);
            update_paragraph_data(paragraph, false);
        }

        let median_width = median_line_width(&paragraphs);
        self.process_independent_paragraphs(&mut paragraphs, median_width);

        for paragraph in &mut paragraphs {
            update_paragraph_data(paragraph, true);
        }
        page.pdf_paragraph = paragraphs;
    }

    fn create_paragraphs(&self, page: &mut Page) -> Vec<PdfParagraph> {
        let mut paragraphs = std::mem::take(&mut page.pdf_paragraph);
        let chars = std::mem::take(&mut page.pdf_character);

        let mut current: Option<usize> = None;
        let mut current_layout: Option<ResolvedLayout> = None;
        let mut line: Vec<PdfCharacter> = Vec::new();
        let mut skipped = Vec::new();

        for ch in chars {
            let layout = match get_layout(&ch, page) {
                Some(layout) if layout.is_text() && !is_isolated_formula(&ch) => layout,
                _ => {
                    skipped.push(ch);
                    continue;
                }
            };

            if line.last().is_some_and(|last| is_newline(last, &ch)) {
                flush_line(&mut paragraphs, &mut current, &mut line, current_layout.as_ref());
            }

            let region_changed = current_layout.as_ref().map_or(true, |l| l.id != layout.id);
            let xobj_changed = line.last().is_some_and(|last| last.xobj_id != ch.xobj_id);
            if region_changed || xobj_changed {
                flush_line(&mut paragraphs, &mut current, &mut line, current_layout.as_ref());
                current = None;
                current_layout = Some(layout);
            }
            line.push(ch);
        }
        flush_line(&mut paragraphs, &mut current, &mut line, current_layout.as_ref());

        page.pdf_character = skipped;
        paragraphs
    }

    fn process_independent_paragraphs(&self, paragraphs: &mut Vec<PdfParagraph>, median_width: f32) {
        let mut i = 0;
        while i < paragraphs.len() {
            if paragraphs[i].compositions.len() <= 1 {
                i += 1;
                continue;
            }
            let split_at = (1..paragraphs[i].compositions.len()).find(|&j| {
                let Composition::Line(prev) = &paragraphs[i].compositions[j - 1] else {
                    return false;
                };
                let prev_text: String = prev.chars.iter().map(|c| c.char_unicode.as_str()).collect();
                if toc_leader_regex().is_match(&prev_text) {
                    return true;
                }
                self.split_short_lines
                    && prev.bbox.width() < median_width * self.short_line_split_factor
            });
            if let Some(j) = split_at {
                let tail = paragraphs[i].compositions.split_off(j);
                let mut new_paragraph = PdfParagraph {
                    compositions: tail,
                    debug_id: Some(generate_debug_id()),
                    layout_id: paragraphs[i].layout_id,
                    ..Default::default()
                };
                update_paragraph_data(&mut paragraphs[i], false);
                update_paragraph_data(&mut new_paragraph, false);
                paragraphs.insert(i + 1, new_paragraph);
            }
            i += 1;
        }
    }
}

fn flush_line(
    paragraphs: &mut Vec<PdfParagraph>,
    current: &mut Option<usize>,
    line: &mut Vec<PdfCharacter>,
    layout: Option<&ResolvedLayout>,
) {
    if line.is_empty() {
        return;
    }
    let composition = Composition::Line(PdfLine::from_chars(std::mem::take(line)));
    match current {
        Some(idx) => {
            paragraphs[*idx].compositions.push(composition);
            update_paragraph_data(&mut paragraphs[*idx], false);
        }
        None => {
            let mut paragraph = PdfParagraph {
                compositions: vec![composition],
                debug_id: Some(generate_debug_id()),
                layout_id: layout.map(|l| l.id),
                ..Default::default()
            };
            update_paragraph_data(&mut paragraph, false);
            paragraphs.push(paragraph);
            *current = Some(paragraphs.len() - 1);
        }
    }
}

fn is_isolated_formula(ch: &PdfCharacter) -> bool {
    ISOLATED_FORMULA_CHARS.contains(&ch.char_unicode.as_str())
}

/// Highest-priority layout region containing the point.
fn layout_at(page: &Page, x: f32, y: f32) -> Option<ResolvedLayout> {
    page.page_layout
        .iter()
        .filter(|l| l.bbox.contains_point(x, y))
        .min_by_key(|l| {
            LAYOUT_PRIORITY
                .iter()
                .position(|name| *name == l.class_name)
                .unwrap_or(usize::MAX)
        })
        .filter(|l| LAYOUT_PRIORITY.contains(&l.class_name.as_str()))
        .map(|l| ResolvedLayout {
            id: l.id,
            name: l.class_name.clone(),
        })
}

/// Layout region of a character, probing its top-left, bottom-right and center.
///
/// An `isolate_formula` hit at any anchor wins; otherwise the center's region
/// is used, then the top-left's, then the bottom-right's.
pub fn get_layout(ch: &PdfCharacter, page: &Page) -> Option<ResolvedLayout> {
    let Rect { x, y, x2, y2 } = ch.bbox;
    let top_left = layout_at(page, x, y2);
    let bottom_right = layout_at(page, x2, y);
    let (cx, cy) = ch.bbox.center();
    let middle = layout_at(page, cx, cy);

    for candidate in [&top_left, &bottom_right, &middle] {
        if let Some(layout) = candidate {
            if layout.name == ISOLATE_FORMULA {
                return Some(layout.clone());
            }
        }
    }
    middle.or(top_left).or(bottom_right)
}

/// Drop blank lines and strip leading and trailing spaces of each line.
fn process_paragraph_spacing(paragraph: &mut PdfParagraph) {
    if paragraph.compositions.is_empty() {
        return;
    }
    let compositions = std::mem::take(&mut paragraph.compositions);
    let mut processed = Vec::with_capacity(compositions.len());
    for comp in compositions {
        let Composition::Line(line) = comp else {
            processed.push(comp);
            continue;
        };
        let mut chars: Vec<PdfCharacter> = line
            .chars
            .into_iter()
            .skip_while(|c| c.char_unicode.trim().is_empty())
            .collect();
        while chars.last().is_some_and(|c| c.char_unicode.trim().is_empty()) {
            chars.pop();
        }
        if !chars.is_empty() {
            processed.push(Composition::Line(PdfLine::from_chars(chars)));
        }
    }
    paragraph.compositions = processed;
    update_paragraph_data(paragraph, false);
}

/// Recompute box, flags and, optionally, the unicode text from the characters.
pub fn update_paragraph_data(paragraph: &mut PdfParagraph, update_unicode: bool) {
    if paragraph.compositions.is_empty() {
        return;
    }
    for comp in &mut paragraph.compositions {
        comp.refresh_bbox();
    }
    let chars: Vec<&PdfCharacter> = paragraph
        .compositions
        .iter()
        .filter(|c| matches!(c, Composition::Line(_) | Composition::Formula(_)))
        .flat_map(|c| c.chars().iter())
        .collect();
    let Some(first) = chars.first() else {
        return;
    };
    if update_unicode {
        let owned: Vec<PdfCharacter> = chars.iter().map(|c| (*c).clone()).collect();
        paragraph.unicode = char_unicode_string(&owned);
    }
    let vertical = first.vertical;
    let xobj_id = first.xobj_id;
    if let Some(bbox) = Rect::union_all(chars.iter().map(|c| &c.bbox)) {
        paragraph.bbox = bbox;
    }
    paragraph.vertical = vertical;
    paragraph.xobj_id = xobj_id;
    paragraph.first_line_indent = match paragraph.compositions.first() {
        Some(Composition::Line(line)) => line
            .chars
            .first()
            .is_some_and(|c| c.bbox.x - paragraph.bbox.x > 1.0),
        _ => false,
    };
}

fn median_line_width(paragraphs: &[PdfParagraph]) -> f32 {
    let mut widths: Vec<f32> = paragraphs
        .iter()
        .flat_map(|p| p.compositions.iter())
        .filter_map(|c| match c {
            Composition::Line(line) => Some(line.bbox.width()),
            _ => None,
        })
        .collect();
    median(&mut widths).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GraphicState, PageLayout, PdfStyle};

    fn ch(text: &str, x: f32, y: f32) -> PdfCharacter {
        PdfCharacter::new(
            text,
            Rect::new(x, y, x + 6.0, y + 10.0),
            PdfStyle::new("F1", 10.0, GraphicState::default()),
        )
        .with_code(1)
    }

    fn region(id: u32, class_name: &str, bbox: Rect) -> PageLayout {
        PageLayout {
            bbox,
            id,
            conf: 0.9,
            class_name: class_name.to_string(),
        }
    }

    #[test]
    fn test_layout_priority() {
        let mut page = Page::new(0);
        page.page_layout.push(region(1, "plain text", Rect::new(0.0, 0.0, 100.0, 100.0)));
        page.page_layout.push(region(2, "figure", Rect::new(0.0, 0.0, 50.0, 50.0)));
        page.page_layout.push(region(3, "isolate_formula", Rect::new(60.0, 60.0, 70.0, 70.0)));

        assert_eq!(get_layout(&ch("a", 10.0, 10.0), &page).unwrap().name, "figure");
        assert_eq!(get_layout(&ch("a", 80.0, 80.0), &page).unwrap().id, 1);
        // only the top-left corner touches the formula region
        assert_eq!(get_layout(&ch("a", 62.0, 50.0), &page).unwrap().name, "isolate_formula");
        assert!(get_layout(&ch("a", 200.0, 200.0), &page).is_none());
    }

    #[test]
    fn test_toc_leader_split() {
        let mut page = Page::new(0);
        page.page_layout.push(region(1, "plain text", Rect::new(0.0, 0.0, 500.0, 500.0)));
        let mut x = 10.0;
        for _ in 0..22 {
            page.pdf_character.push(ch(".", x, 100.0));
            x += 6.0;
        }
        page.pdf_character.push(ch("1", 10.0, 80.0));
        ParagraphFinder::new(false, 0.8).process_page(&mut page);
        assert_eq!(page.pdf_paragraph.len(), 2);
        assert_eq!(page.pdf_paragraph[1].unicode, "1");
    }

    #[test]
    fn test_non_text_chars_stay_on_page() {
        let mut page = Page::new(0);
        page.page_layout.push(region(1, "figure", Rect::new(0.0, 0.0, 500.0, 500.0)));
        page.pdf_character.push(ch("a", 10.0, 10.0));
        ParagraphFinder::new(false, 0.8).process_page(&mut page);
        assert!(page.pdf_paragraph.is_empty());
        assert_eq!(page.pdf_character.len(), 1);
    }

    #[test]
    fn test_first_line_indent_and_trim() {
        let mut page = Page::new(0);
        page.page_layout.push(region(1, "plain text", Rect::new(0.0, 0.0, 500.0, 500.0)));
        page.pdf_character.push(ch(" ", 14.0, 100.0));
        page.pdf_character.push(ch("a", 20.0, 100.0));
        page.pdf_character.push(ch("b", 10.0, 80.0));
        page.pdf_character.push(ch("c", 16.0, 80.0));
        ParagraphFinder::new(false, 0.8).process_page(&mut page);
        let p = &page.pdf_paragraph[0];
        assert_eq!(p.compositions.len(), 2);
        assert_eq!(p.compositions[0].text(), "a");
        assert!(p.first_line_indent);
        assert_eq!(p.bbox, Rect::new(10.0, 80.0, 26.0, 110.0));
    }
}
