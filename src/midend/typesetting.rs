//! Lays translated paragraphs back into their boxes.
//!
//! Every paragraph is flattened into [`TypesettingUnit`]s: original glyphs,
//! whole formulas, and single translated code points bound to a substitute
//! font. Units are placed greedily line by line; when they do not fit, the
//! box is widened, the line spacing tightened and finally the scale reduced.

use std::sync::Arc;

use regex::Regex;
use std::sync::OnceLock;

use crate::config::{TranslationConfig, WatermarkOutputMode};
use crate::error::Result;
use crate::fontmap::{FontMapper, FontTraits, GlyphSource, BASE_FONT_ID};
use crate::model::{
    chars_bbox, Composition, Document, GraphicState, Page, PdfCharacter, PdfFormula,
    PdfParagraph, PdfSameStyleUnicodeCharacters, PdfStyle, Rect,
};
use crate::progress::STAGE_TYPESETTING;

use super::helpers::mode_f32;

const INITIAL_LINE_SPACING: f32 = 1.5;
const MIN_LINE_SPACING: f32 = 1.4;
const RELAXED_LINE_SPACING: f32 = 1.1;
const MIN_SCALE: f32 = 0.1;
const RELAX_BELOW_SCALE: f32 = 0.6;

const MIXED_SPACE_BLACKLIST: &[&str] = &["。", "，", "：", "？", "！"];

/// Full stops after which no CJK/Latin gap is inserted.
const NO_GAP_AFTER: &[&str] = &["。", "！", "？", "；", "：", "，"];

const FULLWIDTH_PUNCTUATION: &[&str] = &[
    "（", "）", "【", "】", "《", "》", "〔", "〕", "〈", "〉", "〖", "〗", "「", "」", "『", "』",
    "、", "。", "：", "？", "！", "，",
];

/// Closing punctuation allowed to overhang the right margin.
const HUNG_PUNCTUATION: &[&str] = &[
    ",", ".", ":", ";", "?", "!", "，", "。", "．", "、", "：", "；", "！", "‼", "？", "⁇", "”",
    "’", "」", "』", ")", "]", "}", "）", "〕", "〉", "】", "〗", "］", "｝", "》", "～", "-",
    "–", "—", "·", "・", "‧", "/", "／", "⁄",
];

/// Opening punctuation that must not end a line.
const NO_LINE_END_PUNCTUATION: &[&str] = &[
    "“", "‘", "「", "『", "(", "[", "{", "（", "〔", "〈", "《", "〖", "〘", "〚",
];

fn latin_word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9]+$").unwrap())
}

/// Whether the code point is a CJK unified ideograph or a fullwidth form.
fn is_cjk_or_fullwidth(c: char) -> bool {
    matches!(
        c as u32,
        0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2EBEF
            | 0x30000..=0x323AF
            | 0xFF01..=0xFF60
            | 0xFFE0..=0xFFE6
    )
}

/// A translated code point drawn with a substitute font.
#[derive(Clone)]
pub struct UnicodeUnit {
    pub text: String,
    pub font: Arc<dyn GlyphSource>,
    pub font_size: f32,
    pub style: PdfStyle,
    pub xobj_id: Option<u32>,
    pub debug_info: bool,
    /// `(x, y, scale)` once placed
    pub position: Option<(f32, f32, f32)>,
}

impl UnicodeUnit {
    fn code_point(&self) -> char {
        self.text.chars().next().unwrap_or(' ')
    }

    fn advance(&self) -> f32 {
        self.font.advance(self.code_point(), self.font_size)
    }
}

/// The atom of line breaking.
#[derive(Clone)]
pub enum TypesettingUnit {
    Char(PdfCharacter),
    Formula(PdfFormula),
    Unicode(UnicodeUnit),
}

impl TypesettingUnit {
    /// Text of the unit; formulas have none.
    pub fn text(&self) -> Option<&str> {
        match self {
            TypesettingUnit::Char(c) => Some(c.char_unicode.as_str()),
            TypesettingUnit::Formula(_) => None,
            TypesettingUnit::Unicode(u) => Some(u.text.as_str()),
        }
    }

    fn text_in(&self, list: &[&str]) -> bool {
        self.text().is_some_and(|t| list.contains(&t))
    }

    pub fn bbox(&self) -> Rect {
        match self {
            TypesettingUnit::Char(c) => c.bbox,
            TypesettingUnit::Formula(f) => f.bbox,
            TypesettingUnit::Unicode(u) => {
                let w = u.advance();
                match u.position {
                    Some((x, y, _)) => Rect::new(x, y, x + w, y + u.font_size),
                    None => Rect::new(0.0, 0.0, w, u.font_size),
                }
            }
        }
    }

    pub fn width(&self) -> f32 {
        self.bbox().width()
    }

    pub fn height(&self) -> f32 {
        self.bbox().height()
    }

    pub fn mixed_character_blacklist(&self) -> bool {
        self.text_in(MIXED_SPACE_BLACKLIST)
    }

    /// Latin letters and digits keep their word together.
    pub fn can_break_line(&self) -> bool {
        match self.text() {
            Some(t) => !latin_word_regex().is_match(t),
            None => true,
        }
    }

    pub fn is_chinese_char(&self) -> bool {
        let Some(text) = self.text() else {
            return false;
        };
        if text.contains("(cid") {
            return false;
        }
        let mut chars = text.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return false;
        };
        FULLWIDTH_PUNCTUATION.contains(&text) || is_cjk_or_fullwidth(c)
    }

    pub fn is_space(&self) -> bool {
        self.text() == Some(" ")
    }

    pub fn is_hung_punctuation(&self) -> bool {
        self.text_in(HUNG_PUNCTUATION)
    }

    pub fn is_cannot_appear_in_line_end_punctuation(&self) -> bool {
        self.text_in(NO_LINE_END_PUNCTUATION)
    }

    /// Whether the unit still holds original glyphs.
    pub fn can_passthrough(&self) -> bool {
        !matches!(self, TypesettingUnit::Unicode(_))
    }

    /// Original glyphs of the unit.
    pub fn passthrough(&self) -> Vec<PdfCharacter> {
        match self {
            TypesettingUnit::Char(c) => vec![c.clone()],
            TypesettingUnit::Formula(f) => f.chars.clone(),
            TypesettingUnit::Unicode(u) => {
                log::error!("cannot pass through translated text {:?}", u.text);
                Vec::new()
            }
        }
    }

    /// Place the unit with its bottom-left corner at `(x, y)`, scaled.
    pub fn relocate(&self, x: f32, y: f32, scale: f32) -> TypesettingUnit {
        match self {
            TypesettingUnit::Char(c) => {
                let mut ch = c.clone();
                ch.bbox = Rect::new(x, y, x + c.bbox.width() * scale, y + c.bbox.height() * scale);
                ch.pdf_style.font_size = c.pdf_style.font_size * scale;
                ch.scale = Some(scale);
                ch.advance = c.advance.map(|a| a * scale);
                TypesettingUnit::Char(ch)
            }
            TypesettingUnit::Formula(f) => {
                let min_x = f.chars.iter().map(|c| c.bbox.x).fold(f32::INFINITY, f32::min);
                let min_y = f.chars.iter().map(|c| c.bbox.y).fold(f32::INFINITY, f32::min);
                let chars: Vec<PdfCharacter> = f
                    .chars
                    .iter()
                    .map(|c| {
                        let rel_x = c.bbox.x - min_x + f.x_offset;
                        let rel_y = c.bbox.y - min_y + f.y_offset;
                        let mut ch = c.clone();
                        ch.bbox = Rect::new(
                            x + rel_x * scale,
                            y + rel_y * scale,
                            x + (rel_x + c.bbox.width()) * scale,
                            y + (rel_y + c.bbox.height()) * scale,
                        );
                        ch.pdf_style.font_size = c.pdf_style.font_size * scale;
                        ch.scale = Some(scale);
                        ch.advance = c.advance.map(|a| a * scale);
                        ch
                    })
                    .collect();
                TypesettingUnit::Formula(PdfFormula {
                    bbox: chars_bbox(&chars),
                    chars,
                    x_offset: f.x_offset * scale,
                    y_offset: f.y_offset * scale,
                })
            }
            TypesettingUnit::Unicode(u) => {
                let mut placed = u.clone();
                placed.font_size = u.font_size * scale;
                placed.position = Some((x, y, scale));
                TypesettingUnit::Unicode(placed)
            }
        }
    }

    /// Final glyphs of a placed unit.
    pub fn render(&self) -> Vec<PdfCharacter> {
        let TypesettingUnit::Unicode(u) = self else {
            return self.passthrough();
        };
        let Some((x, y, scale)) = u.position else {
            log::error!("translated text {:?} rendered before placement", u.text);
            return Vec::new();
        };
        let width = u.advance();
        vec![PdfCharacter {
            pdf_style: PdfStyle {
                font_id: u.font.font_id().to_string(),
                font_size: u.font_size,
                graphic_state: u.style.graphic_state.clone(),
            },
            bbox: Rect::new(x, y, x + width, y + u.font_size),
            vertical: false,
            scale: Some(scale),
            pdf_character_id: u.font.glyph_id(u.code_point()).map(u32::from),
            char_unicode: u.text.clone(),
            advance: Some(width),
            xobj_id: u.xobj_id,
            debug_info: u.debug_info,
        }]
    }
}

/// Rightmost x a paragraph may grow to: 90% of the crop box, stopped by
/// any paragraph or figure to its right that overlaps it vertically.
pub fn get_max_right_space(current: &Rect, index: Option<usize>, others: &[Rect], page: &Page) -> f32 {
    let blocks = |b: &Rect| b.x > current.x && !(b.y >= current.y2 || b.y2 <= current.y);
    let mut max_x = page.cropbox.x2 * 0.9;
    for (i, b) in others.iter().enumerate() {
        if Some(i) != index && blocks(b) {
            max_x = max_x.min(b.x);
        }
    }
    for fig in &page.pdf_figure {
        if blocks(&fig.bbox) {
            max_x = max_x.min(fig.bbox.x);
        }
    }
    max_x
}

/// Outcome of one layout attempt.
struct LayoutAttempt {
    units: Vec<TypesettingUnit>,
    fits: bool,
    scale: f32,
}

/// The typesetting stage.
pub struct Typesetting<'a> {
    config: &'a TranslationConfig,
    font_mapper: Arc<FontMapper>,
}

impl<'a> Typesetting<'a> {
    pub fn new(config: &'a TranslationConfig, font_mapper: Arc<FontMapper>) -> Self {
        Self {
            config,
            font_mapper,
        }
    }

    pub fn typeset_document(&self, document: &mut Document) -> Result<()> {
        let stage = self
            .config
            .progress
            .stage_start(STAGE_TYPESETTING, document.page.len());
        let watermarked = self.config.watermark_output_mode == WatermarkOutputMode::Watermarked;
        for (i, page) in document.page.iter_mut().enumerate() {
            self.config.raise_if_cancelled()?;
            if i == 0 && watermarked {
                self.add_watermark(page);
            }
            self.render_page(page);
            stage.advance(1);
        }
        Ok(())
    }

    pub fn render_page(&self, page: &mut Page) {
        let mut paragraphs = std::mem::take(&mut page.pdf_paragraph);
        let mut boxes: Vec<Rect> = paragraphs.iter().map(|p| p.bbox).collect();
        for (i, paragraph) in paragraphs.iter_mut().enumerate() {
            self.render_paragraph(paragraph, i, &boxes, page);
            boxes[i] = paragraph.bbox;
        }
        page.pdf_paragraph = paragraphs;
    }

    /// Add the translation notice to the first page.
    pub fn add_watermark(&self, page: &mut Page) {
        let crop = page.cropbox;
        let (w, h) = (crop.width(), crop.height());
        let style = PdfStyle::new(BASE_FONT_ID, 6.0, GraphicState::default());
        let mut text = format!(
            "This document was translated by pdftranslate {}. Layout and formulas are \
             preserved on a best-effort basis.",
            env!("CARGO_PKG_VERSION")
        );
        if self.config.debug {
            text.push_str(
                " DEBUG mode: extra boxes are drawn; some of them refer to the original text \
                 and may be misplaced in the translation.",
            );
        }
        page.pdf_paragraph.push(PdfParagraph {
            bbox: Rect::new(crop.x + w * 0.05, crop.y, crop.x2, crop.y2 - h * 0.05),
            pdf_style: Some(style.clone()),
            unicode: text.clone(),
            compositions: vec![Composition::SameStyleUnicodeCharacters(
                PdfSameStyleUnicodeCharacters {
                    pdf_style: Some(style),
                    unicode: text,
                    debug_info: false,
                },
            )],
            ..Default::default()
        });
    }

    fn render_paragraph(&self, paragraph: &mut PdfParagraph, index: usize, boxes: &[Rect], page: &Page) {
        let units = self.create_typesetting_units(paragraph, page);
        if units.iter().all(TypesettingUnit::can_passthrough) {
            paragraph.scale = Some(1.0);
            paragraph.compositions = units
                .iter()
                .flat_map(TypesettingUnit::passthrough)
                .map(Composition::Character)
                .collect();
            return;
        }

        let attempt = match self.retypeset(paragraph, index, boxes, page, &units, true) {
            Ok(attempt) => attempt,
            Err(_) => {
                log::debug!("paragraph does not fit, retry without word breaking");
                match self.retypeset(paragraph, index, boxes, page, &units, false) {
                    Ok(attempt) => attempt,
                    Err(last) => {
                        log::warn!(
                            "page {}: paragraph {:?} does not fit its box, keep scale {:.2}",
                            page.page_number,
                            paragraph.debug_id,
                            last.scale
                        );
                        last
                    }
                }
            }
        };
        paragraph.scale = Some(attempt.scale);
        paragraph.compositions = attempt
            .units
            .iter()
            .flat_map(TypesettingUnit::render)
            .map(Composition::Character)
            .collect();
    }

    fn traits_for(&self, page: &Page, xobj_id: Option<u32>, font_id: &str) -> FontTraits {
        if let Some(font) = page.find_font(xobj_id, font_id) {
            return FontTraits::of(font);
        }
        self.font_mapper
            .by_id(font_id)
            .map(|f| f.traits())
            .unwrap_or_default()
    }

    pub fn create_typesetting_units(&self, paragraph: &PdfParagraph, page: &Page) -> Vec<TypesettingUnit> {
        let mut units = Vec::new();
        for comp in &paragraph.compositions {
            match comp {
                Composition::Line(l) => units.extend(l.chars.iter().cloned().map(TypesettingUnit::Char)),
                Composition::SameStyleCharacters(s) => {
                    units.extend(s.chars.iter().cloned().map(TypesettingUnit::Char))
                }
                Composition::Character(c) => units.push(TypesettingUnit::Char(c.clone())),
                Composition::Formula(f) => units.push(TypesettingUnit::Formula(f.clone())),
                Composition::SameStyleUnicodeCharacters(u) => {
                    let Some(style) = u.pdf_style.as_ref().or(paragraph.pdf_style.as_ref()) else {
                        log::warn!("translated text without a style, dropped: {:?}", u.unicode);
                        continue;
                    };
                    let traits = self.traits_for(page, paragraph.xobj_id, &style.font_id);
                    for c in u.unicode.chars().filter(|c| *c != '\n') {
                        let Some(font) = self.font_mapper.map(&traits, c) else {
                            continue;
                        };
                        units.push(TypesettingUnit::Unicode(UnicodeUnit {
                            text: c.to_string(),
                            font,
                            font_size: style.font_size,
                            style: style.clone(),
                            xobj_id: paragraph.xobj_id,
                            debug_info: u.debug_info,
                            position: None,
                        }));
                    }
                }
            }
        }
        units
    }

    /// Width of the unbreakable run that follows, scaled.
    fn width_before_next_break_point(units: &[TypesettingUnit], scale: f32) -> f32 {
        match units.first() {
            None => return 0.0,
            Some(u) if u.can_break_line() => return 0.0,
            _ => {}
        }
        units
            .iter()
            .take_while(|u| !u.can_break_line())
            .map(TypesettingUnit::width)
            .sum::<f32>()
            * scale
    }

    fn space_width(&self, font_size: f32) -> f32 {
        match self.font_mapper.base() {
            Some(base) => base.advance('你', font_size) * 0.5,
            None => font_size * 0.5,
        }
    }

    /// Place units greedily inside `bbox`; every unit is placed and `fits`
    /// turns false once a line falls below the box.
    fn layout_units(
        &self,
        units: &[TypesettingUnit],
        bbox: &Rect,
        scale: f32,
        line_spacing: f32,
        first_line_indent: bool,
        use_english_line_break: bool,
    ) -> LayoutAttempt {
        let sizes = units.iter().filter_map(|u| match u {
            TypesettingUnit::Char(c) => Some(c.pdf_style.font_size),
            TypesettingUnit::Unicode(u) => Some(u.font_size),
            TypesettingUnit::Formula(_) => None,
        });
        let mut sizes: Vec<f32> = sizes.collect();
        sizes.sort_by(f32::total_cmp);
        let font_size = mode_f32(sizes).unwrap_or(10.0);
        let space_width = self.space_width(font_size * scale);

        let avg_height = if units.is_empty() {
            0.0
        } else {
            units.iter().map(|u| u.height() * scale).sum::<f32>() / units.len() as f32
        };

        let mut x = bbox.x;
        let mut y = bbox.y2 - avg_height;
        let mut line_height = 0.0f32;
        let mut placed: Vec<TypesettingUnit> = Vec::with_capacity(units.len());
        let mut fits = true;

        if first_line_indent {
            x += space_width * 4.0;
        }

        for (i, unit) in units.iter().enumerate() {
            let unit_width = unit.width() * scale;
            let unit_height = unit.height() * scale;

            if x == bbox.x && unit.is_space() {
                continue;
            }

            if let Some(last) = placed.last() {
                let last_box = last.bbox();
                let same_line = y - 0.1 <= last_box.y2 && last_box.y2 <= y + line_height + 0.1;
                if last.is_chinese_char() != unit.is_chinese_char()
                    && same_line
                    && !last.mixed_character_blacklist()
                    && !unit.mixed_character_blacklist()
                    && x > bbox.x
                    && !unit.is_space()
                    && !last.is_space()
                    && !last.text_in(NO_GAP_AFTER)
                {
                    x += space_width * 0.5;
                }
            }

            let lookahead = if use_english_line_break {
                Self::width_before_next_break_point(&units[i + 1..], scale)
            } else {
                0.0
            };

            let overflows = x + unit_width > bbox.x2
                || (use_english_line_break && x + unit_width + lookahead > bbox.x2)
                || (unit.is_cannot_appear_in_line_end_punctuation()
                    && x + unit_width * 2.0 > bbox.x2);
            if !unit.is_hung_punctuation() && overflows {
                x = bbox.x;
                y -= line_height * line_spacing;
                line_height = 0.0;
                if y - unit_height < bbox.y {
                    fits = false;
                }
                if unit.is_space() {
                    line_height = line_height.max(unit_height);
                    continue;
                }
            }

            let relocated = unit.relocate(x, y, scale);
            if line_height == 0.0 || (line_height * 1.2 > unit_height && unit_height > line_height) {
                line_height = unit_height;
            }
            x = relocated.bbox().x2;
            placed.push(relocated);
        }

        LayoutAttempt {
            units: placed,
            fits,
            scale,
        }
    }

    /// Search scale and line spacing until the units fit.
    ///
    /// `Ok` carries the fitting layout, `Err` the last attempt.
    fn retypeset(
        &self,
        paragraph: &mut PdfParagraph,
        index: usize,
        boxes: &[Rect],
        page: &Page,
        units: &[TypesettingUnit],
        use_english_line_break: bool,
    ) -> std::result::Result<LayoutAttempt, LayoutAttempt> {
        let mut scale = 1.0f32;
        let mut line_spacing = INITIAL_LINE_SPACING;
        let mut min_line_spacing = MIN_LINE_SPACING;
        let mut expanded = false;
        let mut last = None;

        while scale >= MIN_SCALE {
            let attempt = self.layout_units(
                units,
                &paragraph.bbox,
                scale,
                line_spacing,
                paragraph.first_line_indent,
                use_english_line_break,
            );
            if attempt.fits {
                return Ok(attempt);
            }
            last = Some(attempt);

            if !expanded {
                let max_x = get_max_right_space(&paragraph.bbox, Some(index), boxes, page);
                if max_x > paragraph.bbox.x2 {
                    paragraph.bbox.x2 = max_x;
                }
                expanded = true;
                continue;
            }

            if line_spacing > min_line_spacing {
                line_spacing -= 0.1;
            } else {
                scale -= if scale > 0.6 { 0.05 } else { 0.1 };
                line_spacing = INITIAL_LINE_SPACING;
            }

            if scale < RELAX_BELOW_SCALE && min_line_spacing > RELAXED_LINE_SPACING {
                min_line_spacing = RELAXED_LINE_SPACING;
                scale = 1.0;
                line_spacing = INITIAL_LINE_SPACING;
            }
        }

        Err(last.unwrap_or(LayoutAttempt {
            units: Vec::new(),
            fits: false,
            scale,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fontmap::{FontRole, SyntheticFace};
    use crate::model::{PdfFont, PdfSameStyleCharacters};
    use crate::translator::EchoTranslator;

    fn mapper() -> Arc<FontMapper> {
        Arc::new(FontMapper::new().with_font(
            Arc::new(SyntheticFace::universal("noto")),
            &[FontRole::Normal, FontRole::Fallback, FontRole::Base],
        ))
    }

    fn config() -> TranslationConfig {
        TranslationConfig::new("in.pdf", "en", "zh", Arc::new(EchoTranslator))
            .with_watermark_mode(WatermarkOutputMode::NoWatermark)
    }

    fn page() -> Page {
        let mut page = Page::new(1);
        page.cropbox = Rect::new(0.0, 0.0, 600.0, 800.0);
        page.pdf_font.push(PdfFont::new("F1", "Times-Roman"));
        page
    }

    fn style() -> PdfStyle {
        PdfStyle::new("F1", 10.0, GraphicState::default())
    }

    fn translated(text: &str, bbox: Rect) -> PdfParagraph {
        PdfParagraph {
            bbox,
            pdf_style: Some(style()),
            compositions: vec![Composition::SameStyleUnicodeCharacters(
                PdfSameStyleUnicodeCharacters {
                    pdf_style: Some(style()),
                    unicode: text.to_string(),
                    debug_info: false,
                },
            )],
            ..Default::default()
        }
    }

    fn rendered_chars(p: &PdfParagraph) -> Vec<&PdfCharacter> {
        p.compositions
            .iter()
            .map(|c| match c {
                Composition::Character(ch) => ch,
                other => panic!("unexpected composition {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_unit_predicates() {
        let m = mapper();
        let unit = |t: &str| {
            TypesettingUnit::Unicode(UnicodeUnit {
                text: t.to_string(),
                font: m.base().unwrap().clone(),
                font_size: 10.0,
                style: style(),
                xobj_id: None,
                debug_info: false,
                position: None,
            })
        };
        assert!(unit("你").is_chinese_char());
        assert!(unit("，").is_chinese_char());
        assert!(!unit("a").is_chinese_char());
        assert!(!unit("a").can_break_line());
        assert!(unit("你").can_break_line());
        assert!(unit("。").is_hung_punctuation());
        assert!(unit("（").is_cannot_appear_in_line_end_punctuation());
        assert!(unit("，").mixed_character_blacklist());
        assert!(unit(" ").is_space());
        assert_eq!(unit("你").width(), 5.0);

        let formula = TypesettingUnit::Formula(PdfFormula::default());
        assert!(formula.can_break_line());
        assert!(!formula.is_chinese_char());
        assert!(formula.can_passthrough());
    }

    #[test]
    fn test_untranslated_paragraph_passes_through() {
        let cfg = config();
        let ts = Typesetting::new(&cfg, mapper());
        let ch = PdfCharacter::new("a", Rect::new(10.0, 10.0, 15.0, 20.0), style());
        let mut page = page();
        page.pdf_paragraph.push(PdfParagraph::with_compositions(vec![
            Composition::SameStyleCharacters(PdfSameStyleCharacters::from_chars(style(), vec![ch.clone()])),
        ]));
        ts.render_page(&mut page);
        let p = &page.pdf_paragraph[0];
        assert_eq!(p.scale, Some(1.0));
        assert_eq!(rendered_chars(p), vec![&ch]);
    }

    #[test]
    fn test_translated_text_wraps_inside_box() {
        let cfg = config();
        let ts = Typesetting::new(&cfg, mapper());
        let mut page = page();
        // 5pt per glyph at size 10, 20 glyphs per 100pt line
        page.pdf_paragraph
            .push(translated(&"你".repeat(30), Rect::new(100.0, 600.0, 200.0, 700.0)));
        ts.render_page(&mut page);

        let p = &page.pdf_paragraph[0];
        assert_eq!(p.scale, Some(1.0));
        let chars = rendered_chars(p);
        assert_eq!(chars.len(), 30);
        assert!(chars.iter().all(|c| c.pdf_style.font_id == "noto"));
        assert!(chars.iter().all(|c| c.pdf_character_id == Some(0x4f60)));
        assert_eq!(chars[0].bbox, Rect::new(100.0, 690.0, 105.0, 700.0));
        // second line starts back at the left edge, 1.5 lines lower
        assert_eq!(chars[20].bbox.x, 100.0);
        assert_eq!(chars[20].bbox.y, 675.0);
    }

    #[test]
    fn test_overflowing_text_shrinks() {
        let cfg = config();
        let ts = Typesetting::new(&cfg, mapper());
        let mut page = page();
        // a blocking paragraph stops the box from growing to the right
        page.pdf_paragraph
            .push(translated(&"你".repeat(200), Rect::new(100.0, 600.0, 200.0, 640.0)));
        page.pdf_paragraph.push(PdfParagraph {
            bbox: Rect::new(201.0, 590.0, 300.0, 650.0),
            ..Default::default()
        });
        ts.render_page(&mut page);

        let p = &page.pdf_paragraph[0];
        let scale = p.scale.unwrap();
        assert!(scale < 1.0 && scale >= MIN_SCALE, "scale {}", scale);
        assert_eq!(p.bbox.x2, 201.0);
        let chars = rendered_chars(p);
        assert_eq!(chars.len(), 200);
        assert!(chars.iter().all(|c| c.bbox.y >= 600.0 && c.bbox.x2 <= 201.0 + 1e-3));
    }

    #[test]
    fn test_formula_relocation_keeps_relative_layout() {
        let a = PdfCharacter::new("x", Rect::new(50.0, 50.0, 55.0, 60.0), style());
        let b = PdfCharacter::new("2", Rect::new(55.0, 56.0, 58.0, 62.0), style());
        let unit = TypesettingUnit::Formula(PdfFormula {
            bbox: chars_bbox(&[a.clone(), b.clone()]),
            chars: vec![a, b],
            x_offset: 0.0,
            y_offset: -2.0,
        });
        let TypesettingUnit::Formula(f) = unit.relocate(10.0, 20.0, 0.5) else {
            panic!("expected a formula");
        };
        assert_eq!(f.chars[0].bbox, Rect::new(10.0, 19.0, 12.5, 24.0));
        assert_eq!(f.chars[1].bbox, Rect::new(12.5, 22.0, 14.0, 25.0));
        assert_eq!(f.chars[1].pdf_style.font_size, 5.0);
        assert_eq!(f.y_offset, -1.0);
    }

    #[test]
    fn test_watermark_on_first_page() {
        let cfg = config().with_watermark_mode(WatermarkOutputMode::Watermarked);
        let ts = Typesetting::new(&cfg, mapper());
        let mut doc = Document::new(2);
        let mut second = page();
        second.page_number = 1;
        doc.page.push(page());
        doc.page.push(second);
        ts.typeset_document(&mut doc).unwrap();
        assert!(doc.page[1].pdf_paragraph.is_empty());
        let page = &doc.page[0];
        assert_eq!(page.pdf_paragraph.len(), 1);
        let chars = rendered_chars(&page.pdf_paragraph[0]);
        assert!(!chars.is_empty());
        assert!(chars.iter().all(|c| c.pdf_style.font_size <= 6.0));
        assert!(chars[0].bbox.x >= 30.0);
    }

    #[test]
    fn test_max_right_space() {
        let p = page();
        let current = Rect::new(100.0, 100.0, 200.0, 200.0);
        assert_eq!(get_max_right_space(&current, None, &[], &p), 540.0);
        let others = [
            Rect::new(300.0, 150.0, 400.0, 250.0),
            Rect::new(250.0, 300.0, 400.0, 400.0),
        ];
        assert_eq!(get_max_right_space(&current, None, &others, &p), 300.0);
    }
}
