//! Splits paragraph lines into formulas and text, then groups text by style.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use base64::Engine as _;
use regex::Regex;

use crate::config::{
    Thresholds, TranslationConfig, DEFAULT_FORMULA_FONT_PATTERN, FORMULA_FONT_EXCLUSION_PATTERN,
};
use crate::error::Result;
use crate::fontmap::FontMapper;
use crate::model::{
    chars_bbox, Composition, Document, GraphicState, Page, PdfCharacter, PdfFormula, PdfLine,
    PdfParagraph, PdfSameStyleCharacters, PdfStyle, Rect, FONT_SIZE_TOLERANCE,
};
use crate::progress::STAGE_FORMULAS;

use super::helpers::{
    formula_height_ignore_char, is_same_style, mode, mode_f32, LEFT_BRACKETS, RIGHT_BRACKETS,
};

fn symbol_category_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[\p{Lm}\p{Mn}\p{Sk}\p{Sm}\p{Zl}\p{Zp}\p{Zs}\p{Co}\p{So}]").unwrap()
    })
}

fn digit_bracket_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9\[\]•]").unwrap())
}

fn translatable_formula_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9, ]+$").unwrap())
}

fn basic_formula_chars_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9\[\],\s]").unwrap())
}

/// Anchor a user pattern at the start of the haystack.
fn anchored(pattern: &str) -> Result<Regex> {
    Ok(Regex::new(&format!("^(?:{})", pattern))?)
}

/// Formula and style segmentation.
pub struct StylesAndFormulas {
    font_pattern: Regex,
    font_exclusion: Regex,
    char_pattern: Option<Regex>,
    font_mapper: Option<Arc<FontMapper>>,
    thresholds: Thresholds,
}

impl StylesAndFormulas {
    pub fn new(config: &TranslationConfig, font_mapper: Option<Arc<FontMapper>>) -> Result<Self> {
        let font_pattern = config
            .formular_font_pattern
            .as_deref()
            .unwrap_or(DEFAULT_FORMULA_FONT_PATTERN);
        Ok(Self {
            font_pattern: anchored(font_pattern)?,
            font_exclusion: Regex::new(FORMULA_FONT_EXCLUSION_PATTERN)?,
            char_pattern: config
                .formular_char_pattern
                .as_deref()
                .map(anchored)
                .transpose()?,
            font_mapper,
            thresholds: config.thresholds,
        })
    }

    pub fn process(&self, document: &mut Document, config: &TranslationConfig) -> Result<()> {
        let stage = config.progress.stage_start(STAGE_FORMULAS, document.page.len());
        for page in &mut document.page {
            config.raise_if_cancelled()?;
            self.process_page(page);
            stage.advance(1);
        }
        Ok(())
    }

    pub fn process_page(&self, page: &mut Page) {
        self.process_page_formulas(page);
        for paragraph in &mut page.pdf_paragraph {
            process_paragraph_offsets(paragraph);
            process_comma_formulas(paragraph);
            merge_overlapping_formulas(paragraph);
            process_paragraph_offsets(paragraph);
            process_translatable_formulas(paragraph);
            process_paragraph_styles(paragraph);
        }
    }

    /// Whether a font name denotes a math font.
    ///
    /// Only the part after the last `+` (the subset tag separator) is
    /// matched. `BASE64:` names are decoded first.
    pub fn is_formulas_font(&self, font_name: &str) -> bool {
        let decoded;
        let name = match font_name.strip_prefix("BASE64:") {
            Some(encoded) => {
                decoded = base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map(|b| String::from_utf8_lossy(&b).into_owned())
                    .unwrap_or_default();
                decoded.as_str()
            }
            None => font_name,
        };
        let name = name.rsplit('+').next().unwrap_or(name);
        if self.font_exclusion.is_match(name) {
            return false;
        }
        self.font_pattern.is_match(name)
    }

    /// Whether `text` may start a formula.
    pub fn is_formulas_start_char(&self, text: &str) -> bool {
        if text.contains("(cid:") {
            return true;
        }
        if let Some(mapper) = self.font_mapper.as_deref().filter(|m| !m.is_empty()) {
            if text.chars().any(|c| !mapper.has_char(c)) {
                return true;
            }
        }
        if let Some(re) = &self.char_pattern {
            if re.is_match(text) {
                return true;
            }
        }
        if let Some(first) = text.chars().next() {
            if text != " "
                && (symbol_category_regex().is_match(text) || ('\u{370}'..'\u{400}').contains(&first))
            {
                return true;
            }
        }
        digit_bracket_regex().is_match(text)
    }

    /// Whether `text` may continue a formula; commas only continue.
    pub fn is_formulas_middle_char(&self, text: &str) -> bool {
        self.is_formulas_start_char(text) || text.starts_with(',')
    }

    fn process_page_formulas(&self, page: &mut Page) {
        let mut font_cache: HashMap<(Option<u32>, String), bool> = HashMap::new();
        let mut paragraphs = std::mem::take(&mut page.pdf_paragraph);
        for paragraph in &mut paragraphs {
            let mut is_formula_font = |ch: &PdfCharacter| {
                *font_cache
                    .entry((ch.xobj_id, ch.pdf_style.font_id.clone()))
                    .or_insert_with(|| {
                        page.find_font(ch.xobj_id, &ch.pdf_style.font_id)
                            .is_some_and(|f| self.is_formulas_font(&f.name))
                    })
            };
            let mut compositions = Vec::with_capacity(paragraph.compositions.len());
            for comp in std::mem::take(&mut paragraph.compositions) {
                match comp {
                    Composition::Line(line) => {
                        self.split_line(line.chars, &mut is_formula_font, &mut compositions)
                    }
                    other => compositions.push(other),
                }
            }
            paragraph.compositions = compositions;
        }
        page.pdf_paragraph = paragraphs;
    }

    fn split_line(
        &self,
        chars: Vec<PdfCharacter>,
        is_formula_font: &mut impl FnMut(&PdfCharacter) -> bool,
        out: &mut Vec<Composition>,
    ) {
        let mut current: Vec<PdfCharacter> = Vec::new();
        let mut in_formula = false;
        let mut in_corner_mark = false;

        for ch in chars {
            let text = ch.char_unicode.as_str();
            let mut is_formula = (!in_formula && self.is_formulas_start_char(text))
                || (in_formula && self.is_formulas_middle_char(text))
                || is_formula_font(&ch)
                || ch.vertical
                || (ch.pdf_character_id.is_none() && in_formula);

            let is_corner_mark = match current.last() {
                Some(prev) if !current.iter().all(PdfCharacter::is_space) => {
                    let ratio = if in_corner_mark {
                        self.thresholds.corner_mark_stay
                    } else {
                        self.thresholds.corner_mark_enter
                    };
                    ch.pdf_style.font_size < prev.pdf_style.font_size * ratio
                }
                _ => false,
            };
            is_formula |= is_corner_mark;

            if text == " " {
                is_formula = in_formula;
            }

            if is_formula != in_formula && !current.is_empty() {
                out.push(create_composition(std::mem::take(&mut current), in_formula));
            }
            in_formula = is_formula;
            in_corner_mark = is_corner_mark;
            current.push(ch);
        }
        if !current.is_empty() {
            out.push(create_composition(current, in_formula));
        }
    }
}

/// Formula box; glyphs with unreliable height are left out of the vertical
/// extent unless nothing else is left.
pub fn formula_bbox(chars: &[PdfCharacter]) -> Rect {
    let all = chars_bbox(chars);
    let reliable: Vec<Rect> = chars
        .iter()
        .filter(|c| !formula_height_ignore_char(c))
        .map(|c| c.bbox)
        .collect();
    match Rect::union_all(reliable.iter()) {
        Some(r) => Rect::new(all.x, r.y, all.x2, r.y2),
        None => all,
    }
}

fn new_formula(chars: Vec<PdfCharacter>) -> PdfFormula {
    let bbox = formula_bbox(&chars);
    PdfFormula {
        bbox,
        chars,
        x_offset: 0.0,
        y_offset: 0.0,
    }
}

fn create_composition(chars: Vec<PdfCharacter>, is_formula: bool) -> Composition {
    if is_formula {
        Composition::Formula(new_formula(chars))
    } else {
        Composition::Line(PdfLine::from_chars(chars))
    }
}

/// Median distance between consecutive line baselines, 10 when unknown.
fn line_spacing(paragraph: &PdfParagraph) -> f32 {
    let ys: Vec<f32> = paragraph
        .compositions
        .iter()
        .filter_map(|c| match c {
            Composition::Line(l) => Some(l.bbox.y),
            _ => None,
        })
        .collect();
    let mut spacings: Vec<f32> = ys
        .windows(2)
        .map(|w| (w[0] - w[1]).abs())
        .filter(|s| *s > 0.0)
        .collect();
    if spacings.is_empty() {
        return 10.0;
    }
    spacings.sort_by(f32::total_cmp);
    spacings[spacings.len() / 2]
}

fn process_paragraph_offsets(paragraph: &mut PdfParagraph) {
    let tolerance = line_spacing(paragraph) * 0.8;
    let line_boxes: Vec<Option<Rect>> = paragraph
        .compositions
        .iter()
        .map(|c| match c {
            Composition::Line(l) => Some(l.bbox),
            _ => None,
        })
        .collect();

    for (i, comp) in paragraph.compositions.iter_mut().enumerate() {
        let Composition::Formula(formula) = comp else {
            continue;
        };
        let same_line = |b: &&Rect| (b.y - formula.bbox.y).abs() <= tolerance;
        let left = line_boxes[..i].iter().rev().flatten().find(same_line);
        let right = line_boxes[i + 1..].iter().flatten().find(same_line);

        let mut x_offset = left.map_or(0.0, |l| formula.bbox.x - l.x2);
        if x_offset.abs() < 0.1 || x_offset > 0.0 {
            x_offset = 0.0;
        }
        let mut y_offset = match (left, right) {
            (Some(l), _) => formula.bbox.y - l.y,
            (None, Some(r)) => formula.bbox.y - r.y,
            (None, None) => 0.0,
        };
        if y_offset.abs() < 0.1 {
            y_offset = 0.0;
        }
        formula.x_offset = x_offset;
        formula.y_offset = y_offset;
    }
}

fn should_split_formula(formula: &PdfFormula) -> bool {
    let text: String = formula.chars.iter().map(|c| c.char_unicode.as_str()).collect();
    text.contains(',') && !basic_formula_chars_regex().replace_all(&text, "").is_empty()
}

/// Split at top-level commas; each group is paired with the comma after it.
fn split_formula_by_comma(chars: Vec<PdfCharacter>) -> Vec<(Vec<PdfCharacter>, Option<PdfCharacter>)> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;
    for ch in chars {
        let text = ch.char_unicode.as_str();
        if LEFT_BRACKETS.contains(&text) {
            depth += 1;
            current.push(ch);
        } else if RIGHT_BRACKETS.contains(&text) {
            depth = depth.saturating_sub(1);
            current.push(ch);
        } else if text == "," && depth == 0 {
            if !current.is_empty() {
                groups.push((std::mem::take(&mut current), Some(ch)));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        groups.push((current, None));
    }
    groups
}

fn process_comma_formulas(paragraph: &mut PdfParagraph) {
    let mut compositions = Vec::with_capacity(paragraph.compositions.len());
    for comp in std::mem::take(&mut paragraph.compositions) {
        match comp {
            Composition::Formula(f) if should_split_formula(&f) => {
                for (chars, comma) in split_formula_by_comma(f.chars) {
                    compositions.push(Composition::Formula(new_formula(chars)));
                    if let Some(comma) = comma {
                        compositions.push(Composition::Line(PdfLine::from_chars(vec![comma])));
                    }
                }
            }
            other => compositions.push(other),
        }
    }
    paragraph.compositions = compositions;
}

fn merge_overlapping_formulas(paragraph: &mut PdfParagraph) {
    let comps = &mut paragraph.compositions;
    let mut i = 0;
    while i + 1 < comps.len() {
        let merge = match (&comps[i], &comps[i + 1]) {
            (Composition::Formula(a), Composition::Formula(b)) => {
                a.bbox.x_nested(&b.bbox) && a.bbox.y_intersects(&b.bbox)
            }
            _ => false,
        };
        if !merge {
            i += 1;
            continue;
        }
        let second = comps.remove(i + 1);
        if let Composition::Formula(a) = &mut comps[i] {
            let mut chars = std::mem::take(&mut a.chars);
            chars.extend(second.chars().iter().cloned());
            chars.sort_by(|p, q| {
                p.bbox
                    .y
                    .total_cmp(&q.bbox.y)
                    .then(p.bbox.x.total_cmp(&q.bbox.x))
            });
            *a = new_formula(chars);
        }
    }
}

fn is_translatable_formula(formula: &PdfFormula) -> bool {
    if formula.y_offset > 0.1 {
        return false;
    }
    let text: String = formula.chars.iter().map(|c| c.char_unicode.as_str()).collect();
    translatable_formula_regex().is_match(&text)
}

fn process_translatable_formulas(paragraph: &mut PdfParagraph) {
    for comp in &mut paragraph.compositions {
        if let Composition::Formula(f) = comp {
            if is_translatable_formula(f) {
                let chars = std::mem::take(&mut f.chars);
                *comp = Composition::Line(PdfLine::from_chars(chars));
            }
        }
    }
}

fn same<T: PartialEq + Clone>(a: &T, b: &T) -> Option<T> {
    (a == b).then(|| a.clone())
}

/// Field-wise intersection of two graphic states.
pub fn merge_graphic_states(a: &GraphicState, b: &GraphicState) -> GraphicState {
    GraphicState {
        linewidth: same(&a.linewidth, &b.linewidth).flatten(),
        dash: same(&a.dash, &b.dash).unwrap_or_default(),
        flatness: same(&a.flatness, &b.flatness).flatten(),
        intent: same(&a.intent, &b.intent).flatten(),
        linecap: same(&a.linecap, &b.linecap).flatten(),
        linejoin: same(&a.linejoin, &b.linejoin).flatten(),
        miterlimit: same(&a.miterlimit, &b.miterlimit).flatten(),
        ncolor: same(&a.ncolor, &b.ncolor).unwrap_or_default(),
        scolor: same(&a.scolor, &b.scolor).unwrap_or_default(),
        stroking_color_space_name: same(&a.stroking_color_space_name, &b.stroking_color_space_name)
            .flatten(),
        non_stroking_color_space_name: same(
            &a.non_stroking_color_space_name,
            &b.non_stroking_color_space_name,
        )
        .flatten(),
        passthrough_per_char_instruction: same(
            &a.passthrough_per_char_instruction,
            &b.passthrough_per_char_instruction,
        )
        .flatten(),
    }
}

/// Intersection of the styles of all text characters, with the most common
/// font and size standing in where they disagree.
pub fn calculate_base_style(paragraph: &PdfParagraph) -> Option<PdfStyle> {
    let styles: Vec<&PdfStyle> = paragraph
        .compositions
        .iter()
        .filter_map(|c| match c {
            Composition::Line(l) => Some(l.chars.iter().map(|ch| &ch.pdf_style)),
            _ => None,
        })
        .flatten()
        .collect();
    let (first, rest) = styles.split_first()?;

    let mut font_id = Some(first.font_id.clone());
    let mut font_size = Some(first.font_size);
    let mut graphic_state = first.graphic_state.clone();
    for style in rest {
        if font_id.as_deref() != Some(style.font_id.as_str()) {
            font_id = None;
        }
        if font_size.is_some_and(|s| (s - style.font_size).abs() >= FONT_SIZE_TOLERANCE) {
            font_size = None;
        }
        graphic_state = merge_graphic_states(&graphic_state, &style.graphic_state);
    }

    let font_id = match font_id {
        Some(id) => id,
        None => mode(styles.iter().map(|s| s.font_id.clone()))?,
    };
    let font_size = match font_size {
        Some(size) => size,
        None => mode_f32(styles.iter().map(|s| s.font_size))?,
    };
    Some(PdfStyle {
        font_id,
        font_size,
        graphic_state,
    })
}

fn process_paragraph_styles(paragraph: &mut PdfParagraph) {
    if paragraph.compositions.is_empty() {
        return;
    }
    paragraph.pdf_style = calculate_base_style(paragraph);

    let mut compositions = Vec::new();
    let mut current: Vec<PdfCharacter> = Vec::new();
    let mut current_style: Option<PdfStyle> = None;

    let flush = |current: &mut Vec<PdfCharacter>, style: &Option<PdfStyle>, out: &mut Vec<Composition>| {
        if current.is_empty() {
            return;
        }
        let style = style.clone().unwrap_or_else(|| current[0].pdf_style.clone());
        out.push(Composition::SameStyleCharacters(PdfSameStyleCharacters::from_chars(
            style,
            std::mem::take(current),
        )));
    };

    for comp in std::mem::take(&mut paragraph.compositions) {
        match comp {
            Composition::Line(line) => {
                for ch in line.chars {
                    match &current_style {
                        Some(style) if is_same_style(Some(&ch.pdf_style), Some(style)) => {
                            current.push(ch)
                        }
                        _ => {
                            flush(&mut current, &current_style, &mut compositions);
                            current_style = Some(ch.pdf_style.clone());
                            current.push(ch);
                        }
                    }
                }
            }
            other => {
                flush(&mut current, &current_style, &mut compositions);
                compositions.push(other);
            }
        }
    }
    flush(&mut current, &current_style, &mut compositions);
    paragraph.compositions = compositions;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PdfFont;
    use base64::Engine as _;
    use crate::translator::EchoTranslator;

    fn config() -> TranslationConfig {
        TranslationConfig::new("in.pdf", "en", "zh", Arc::new(EchoTranslator))
    }

    fn segmenter() -> StylesAndFormulas {
        StylesAndFormulas::new(&config(), None).unwrap()
    }

    fn ch(text: &str, font: &str, x: f32, size: f32) -> PdfCharacter {
        PdfCharacter::new(
            text,
            Rect::new(x, 100.0, x + 5.0, 100.0 + size),
            PdfStyle::new(font, size, GraphicState::default()),
        )
        .with_code(1)
    }

    fn page_with_line(chars: Vec<PdfCharacter>) -> Page {
        let mut page = Page::new(0);
        page.pdf_font.push(PdfFont::new("F1", "ABCDEF+NimbusRomNo9L-Regu"));
        page.pdf_font.push(PdfFont::new("F2", "GHIJKL+CMSY10"));
        page.pdf_paragraph.push(PdfParagraph::with_compositions(vec![Composition::Line(
            PdfLine::from_chars(chars),
        )]));
        page
    }

    fn shape(page: &Page) -> Vec<(bool, String)> {
        page.pdf_paragraph[0]
            .compositions
            .iter()
            .map(|c| (c.is_formula(), c.text()))
            .collect()
    }

    #[test]
    fn test_formula_font_detection() {
        let s = segmenter();
        assert!(s.is_formulas_font("ABCDEF+CMSY10"));
        assert!(s.is_formulas_font("CMMI12"));
        assert!(!s.is_formulas_font("CMR10"));
        assert!(!s.is_formulas_font("ABCDEF+NimbusRomNo9L-Regu"));
        assert!(s.is_formulas_font("Courier-Mono"));
        assert!(!s.is_formulas_font("Times-Roman"));
        let encoded = base64::engine::general_purpose::STANDARD.encode("XYZ+CMSY10");
        assert!(s.is_formulas_font(&format!("BASE64:{}", encoded)));
    }

    #[test]
    fn test_start_and_middle_chars() {
        let s = segmenter();
        for text in ["(cid:3)", "∑", "α", "1", "[", "•", "\u{E000}"] {
            assert!(s.is_formulas_start_char(text), "{}", text);
        }
        for text in ["a", " ", ",", "你"] {
            assert!(!s.is_formulas_start_char(text), "{}", text);
        }
        assert!(s.is_formulas_middle_char(","));
        assert!(!s.is_formulas_middle_char("a"));
    }

    #[test]
    fn test_formula_font_run_split() {
        let mut page = page_with_line(vec![
            ch("a", "F1", 0.0, 10.0),
            ch("b", "F1", 5.0, 10.0),
            ch("∑", "F2", 10.0, 10.0),
        ]);
        segmenter().process_page_formulas(&mut page);
        assert_eq!(
            shape(&page),
            vec![(false, "ab".to_string()), (true, "∑".to_string())]
        );
    }

    #[test]
    fn test_corner_mark_becomes_formula() {
        let mut page = page_with_line(vec![
            ch("x", "F1", 0.0, 10.0),
            ch("y", "F1", 5.0, 10.0),
            ch("i", "F1", 10.0, 6.0),
            ch("j", "F1", 13.0, 6.0),
            ch("z", "F1", 16.0, 10.0),
        ]);
        segmenter().process_page_formulas(&mut page);
        assert_eq!(
            shape(&page),
            vec![
                (false, "xy".to_string()),
                (true, "ij".to_string()),
                (false, "z".to_string())
            ]
        );
    }

    #[test]
    fn test_comma_split_respects_brackets() {
        let chars = ["f", "(", "a", ",", "b", ")", ",", "∑"]
            .iter()
            .enumerate()
            .map(|(i, t)| ch(t, "F2", i as f32 * 5.0, 10.0))
            .collect();
        let mut p = PdfParagraph::with_compositions(vec![Composition::Formula(new_formula(chars))]);
        process_comma_formulas(&mut p);
        let texts: Vec<String> = p.compositions.iter().map(Composition::text).collect();
        assert_eq!(texts, vec!["f(a,b)", ",", "∑"]);
        assert!(p.compositions[0].is_formula());
        assert!(!p.compositions[1].is_formula());
    }

    #[test]
    fn test_digits_are_promoted_to_text() {
        let mut page = page_with_line(vec![
            ch("a", "F1", 0.0, 10.0),
            ch("b", "F1", 5.0, 10.0),
            ch("1", "F1", 10.0, 10.0),
            ch("2", "F1", 15.0, 10.0),
        ]);
        segmenter().process_page(&mut page);
        let p = &page.pdf_paragraph[0];
        assert!(p.compositions.iter().all(|c| !c.is_formula()));
        // one style throughout, so the line collapses into a single run
        assert_eq!(p.compositions.len(), 1);
        assert_eq!(p.compositions[0].text(), "ab12");
    }

    #[test]
    fn test_offsets_relative_to_left_text() {
        let mut sub = ch("2", "F2", 9.0, 6.0);
        sub.bbox = Rect::new(9.0, 97.0, 12.0, 103.0);
        let mut p = PdfParagraph::with_compositions(vec![
            Composition::Line(PdfLine::from_chars(vec![ch("x", "F1", 0.0, 10.0)])),
            Composition::Formula(new_formula(vec![sub])),
        ]);
        process_paragraph_offsets(&mut p);
        let Composition::Formula(f) = &p.compositions[1] else {
            panic!("expected a formula");
        };
        assert_eq!(f.x_offset, 0.0);
        assert_eq!(f.y_offset, -3.0);
    }

    #[test]
    fn test_overlapping_formulas_merge() {
        let mut base = ch("x", "F2", 0.0, 10.0);
        base.bbox = Rect::new(0.0, 100.0, 10.0, 110.0);
        let mut sup = ch("2", "F2", 2.0, 5.0);
        sup.bbox = Rect::new(2.0, 108.0, 6.0, 113.0);
        let mut p = PdfParagraph::with_compositions(vec![
            Composition::Formula(new_formula(vec![base])),
            Composition::Formula(new_formula(vec![sup])),
        ]);
        merge_overlapping_formulas(&mut p);
        assert_eq!(p.compositions.len(), 1);
        assert_eq!(p.compositions[0].text(), "x2");
        assert_eq!(p.compositions[0].bbox(), Some(Rect::new(0.0, 100.0, 10.0, 113.0)));
    }

    #[test]
    fn test_base_style_falls_back_to_mode() {
        let mut red = ch("c", "F2", 10.0, 12.0);
        red.pdf_style.graphic_state = GraphicState::with_passthrough("1 0 0 rg");
        let p = PdfParagraph::with_compositions(vec![Composition::Line(PdfLine::from_chars(vec![
            ch("a", "F1", 0.0, 10.0),
            ch("b", "F1", 5.0, 10.0),
            red,
        ]))]);
        let style = calculate_base_style(&p).unwrap();
        assert_eq!(style.font_id, "F1");
        assert_eq!(style.font_size, 10.0);
        assert_eq!(style.graphic_state.passthrough_per_char_instruction, None);
    }
}
