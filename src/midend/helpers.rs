//! Geometry and text heuristics shared by the midend stages.

use std::collections::HashMap;
use std::hash::Hash;

use crate::model::{Composition, PdfCharacter, PdfParagraph, PdfStyle, Rect};

/// Glyphs whose boxes misreport their height (large operators, tall brackets).
pub const HEIGHT_NOT_USEFUL_CHARS: &[&str] = &[
    "∑︁",
    "(cid:17)",
    "(cid:16)",
    "(cid:104)",
    "(cid:105)",
    "(cid:13)",
    "(cid:88)",
    "(cid:89)",
    "(cid:90)",
    "(cid:2)",
    "(cid:3)",
];

pub const LEFT_BRACKETS: &[&str] = &["(cid:8)", "(", "(cid:16)", "{", "[", "(cid:104)", "(cid:2)"];
pub const RIGHT_BRACKETS: &[&str] = &["(cid:9)", ")", "(cid:17)", "}", "]", "(cid:105)", "(cid:3)"];

/// Whether a glyph's height should be ignored for line and formula geometry.
pub fn formula_height_ignore_char(ch: &PdfCharacter) -> bool {
    ch.pdf_character_id.is_none() || HEIGHT_NOT_USEFUL_CHARS.contains(&ch.char_unicode.as_str())
}

/// Whether `curr` starts a new visual line after `prev`.
///
/// True when `curr` lies entirely below `prev`, or jumps back left by more
/// than ten glyph widths. Glyphs with unreliable height never break lines.
pub fn is_newline(prev: &PdfCharacter, curr: &PdfCharacter) -> bool {
    let char_width = curr.bbox.width().max(prev.bbox.width());
    let should_new_line =
        curr.bbox.y2 < prev.bbox.y || curr.bbox.x2 < prev.bbox.x - char_width * 10.0;
    if should_new_line && (formula_height_ignore_char(curr) || formula_height_ignore_char(prev)) {
        return false;
    }
    should_new_line
}

/// Gap threshold for implicit spaces: the second smallest distinct gap above 1pt.
pub(crate) fn space_gap_threshold<'a, I>(pairs: I) -> f32
where
    I: IntoIterator<Item = (&'a PdfCharacter, &'a PdfCharacter)>,
{
    let mut gaps: Vec<f32> = pairs
        .into_iter()
        .map(|(a, b)| b.bbox.x - a.bbox.x2)
        .filter(|d| *d > 1.0)
        .collect();
    gaps.sort_by(f32::total_cmp);
    gaps.dedup();
    match gaps.len() {
        0 => 1.0,
        1 => gaps[0],
        _ => gaps[1],
    }
}

/// Text of a glyph run with spaces inserted at wide gaps and line breaks.
pub fn char_unicode_string(chars: &[PdfCharacter]) -> String {
    let threshold = space_gap_threshold(chars.windows(2).map(|w| (&w[0], &w[1])));
    let mut out = String::new();
    for (i, ch) in chars.iter().enumerate() {
        out.push_str(&ch.char_unicode);
        if ch.char_unicode == " " {
            continue;
        }
        if let Some(next) = chars.get(i + 1) {
            let distance = next.bbox.x - ch.bbox.x2;
            if distance >= threshold || is_newline(ch, next) {
                out.push(' ');
            }
        }
    }
    out
}

/// Plain text of a paragraph; unicode runs are copied verbatim.
pub fn paragraph_unicode(paragraph: &PdfParagraph) -> String {
    let mut out = String::new();
    let mut pending: Vec<PdfCharacter> = Vec::new();
    for comp in &paragraph.compositions {
        match comp {
            Composition::SameStyleUnicodeCharacters(u) => {
                out.push_str(&char_unicode_string(&pending));
                pending.clear();
                out.push_str(&u.unicode);
            }
            other => pending.extend(other.chars().iter().cloned()),
        }
    }
    out.push_str(&char_unicode_string(&pending));
    out
}

fn space_char(after: &PdfCharacter, width: f32) -> PdfCharacter {
    let bbox = Rect::new(after.bbox.x2, after.bbox.y, after.bbox.x2 + width, after.bbox.y2);
    PdfCharacter {
        pdf_style: after.pdf_style.clone(),
        bbox,
        char_unicode: " ".to_string(),
        scale: after.scale,
        advance: Some(width),
        xobj_id: after.xobj_id,
        vertical: after.vertical,
        ..Default::default()
    }
}

fn add_space_dummy_chars_to_list(chars: &mut Vec<PdfCharacter>) {
    if chars.is_empty() {
        return;
    }
    let threshold = space_gap_threshold(chars.windows(2).map(|w| (&w[0], &w[1])));
    let mut i = 0;
    while i + 1 < chars.len() {
        let distance = chars[i + 1].bbox.x - chars[i].bbox.x2;
        if distance >= threshold || is_newline(&chars[i], &chars[i + 1]) {
            let space = space_char(&chars[i], distance.min(threshold));
            chars.insert(i + 1, space);
            i += 2;
        } else {
            i += 1;
        }
    }
}

fn composition_chars_mut(comp: &mut Composition) -> Option<&mut Vec<PdfCharacter>> {
    match comp {
        Composition::Line(l) => Some(&mut l.chars),
        Composition::Formula(f) => Some(&mut f.chars),
        Composition::SameStyleCharacters(s) => Some(&mut s.chars),
        _ => None,
    }
}

/// Insert explicit space glyphs where the PDF relied on positioning alone.
///
/// Gaps inside a composition use the run's gap threshold; a gap above 1pt
/// between two compositions appends a space to the first one.
pub fn add_space_dummy_chars(paragraph: &mut PdfParagraph) {
    for comp in &mut paragraph.compositions {
        if let Some(chars) = composition_chars_mut(comp) {
            add_space_dummy_chars_to_list(chars);
        }
    }

    for i in 0..paragraph.compositions.len().saturating_sub(1) {
        let (Some(last), Some(first)) = (
            paragraph.compositions[i].chars().last(),
            paragraph.compositions[i + 1].chars().first(),
        ) else {
            continue;
        };
        let distance = first.bbox.x - last.bbox.x2;
        if distance > 1.0 {
            let space = space_char(last, distance);
            if let Some(chars) = composition_chars_mut(&mut paragraph.compositions[i]) {
                chars.push(space);
            }
        }
    }
}

/// Same font, near-equal size and identical graphic state.
pub fn is_same_style(a: Option<&PdfStyle>, b: Option<&PdfStyle>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.is_close(b),
        (None, None) => true,
        _ => false,
    }
}

/// Same font and graphic state with a size ratio strictly inside `(min, max)`.
pub fn is_same_style_except_size(a: Option<&PdfStyle>, b: Option<&PdfStyle>, min: f32, max: f32) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            let ratio = (a.font_size / b.font_size).abs();
            a.same_face(b) && min < ratio && ratio < max
        }
        (None, None) => true,
        _ => false,
    }
}

/// Near-equal size and identical graphic state, any font.
pub fn is_same_style_except_font(a: Option<&PdfStyle>, b: Option<&PdfStyle>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            (a.font_size - b.font_size).abs() < crate::model::FONT_SIZE_TOLERANCE
                && a.graphic_state == b.graphic_state
        }
        (None, None) => true,
        _ => false,
    }
}

/// Most frequent value; ties go to the value seen first.
pub fn mode<T, I>(values: I) -> Option<T>
where
    T: Hash + Eq + Clone,
    I: IntoIterator<Item = T>,
{
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (order, v) in values.into_iter().enumerate() {
        counts.entry(v).or_insert((0, order)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, oa)), (_, (cb, ob))| ca.cmp(cb).then(ob.cmp(oa)))
        .map(|(v, _)| v)
}

/// Mode of floating point values, compared bit for bit.
pub fn mode_f32<I: IntoIterator<Item = f32>>(values: I) -> Option<f32> {
    mode(values.into_iter().map(f32::to_bits)).map(f32::from_bits)
}

/// Median of the values, averaging the middle pair for even counts.
pub fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
