//! Font resources: code splitting, Unicode mapping, widths and traits.

use std::collections::HashMap;
use std::sync::OnceLock;

use base64::Engine;
use lopdf::{Dictionary, Document as LopdfDocument, Object};
use regex::bytes::Regex;

use crate::model::PdfFont;
use crate::parser::backend::{stream_bytes, ObjectId};

/// Default glyph width in thousandths of an em.
const DEFAULT_SIMPLE_WIDTH: f32 = 500.0;
const DEFAULT_CID_WIDTH: f32 = 1000.0;

/// Descriptor flag bits (PDF 32000 table 123).
const FLAG_FIXED_PITCH: i64 = 1;
const FLAG_SERIF: i64 = 1 << 1;
const FLAG_ITALIC: i64 = 1 << 6;
const FLAG_FORCE_BOLD: i64 = 1 << 18;

/// How character codes are laid out in shown strings.
#[derive(Debug, Clone, PartialEq)]
pub enum FontKind {
    /// One byte per code
    Simple,
    /// Composite font
    Cid { identity: bool, vertical: bool },
}

/// A codespace range of a CMap: `len` bytes, codes in `low..=high`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CodespaceRange {
    len: usize,
    low: u32,
    high: u32,
}

/// A font resource loaded from a page or XObject.
#[derive(Debug, Clone)]
pub struct LoadedFont {
    /// Key in the `/Font` resource dictionary
    pub resource_name: String,
    /// Base font name, `BASE64:` prefixed when not UTF-8
    pub base_font: String,
    pub xref: Option<ObjectId>,
    pub kind: FontKind,
    pub ascent: f32,
    pub descent: f32,
    pub bold: bool,
    pub italic: bool,
    pub monospace: bool,
    pub serif: bool,
    encoding_length: u8,
    codespace: Vec<CodespaceRange>,
    widths: HashMap<u32, f32>,
    default_width: f32,
    to_unicode: HashMap<u32, String>,
    simple_table: Vec<Option<String>>,
}

impl LoadedFont {
    /// Load a font dictionary. Never fails: missing data falls back to defaults.
    pub fn load(
        doc: &LopdfDocument,
        resource_name: &[u8],
        xref: Option<ObjectId>,
        dict: &Dictionary,
    ) -> Self {
        let base_font_bytes = dict
            .get(b"BaseFont")
            .and_then(Object::as_name)
            .map(|n| n.to_vec())
            .unwrap_or_default();
        let base_font = font_name_string(&base_font_bytes);

        let subtype = dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .unwrap_or(&b""[..]);
        let encoding_name = dict
            .get(b"Encoding")
            .and_then(Object::as_name)
            .map(|n| String::from_utf8_lossy(n).to_string())
            .unwrap_or_default();

        let to_unicode_data = dict
            .get(b"ToUnicode")
            .ok()
            .and_then(|o| resolve(doc, o).as_stream().ok())
            .map(stream_bytes);
        let cmap = to_unicode_data
            .as_deref()
            .map(parse_to_unicode)
            .unwrap_or_default();

        let (kind, descriptor_holder, widths, default_width) = if subtype == b"Type0" {
            let descendant = dict
                .get(b"DescendantFonts")
                .ok()
                .and_then(|o| resolve(doc, o).as_array().ok())
                .and_then(|arr| arr.first())
                .and_then(|o| resolve(doc, o).as_dict().ok());
            let identity = encoding_name == "Identity-H" || encoding_name == "Identity-V";
            let vertical = encoding_name.ends_with("-V");
            let (widths, dw) = descendant
                .map(|d| cid_widths(doc, d))
                .unwrap_or_else(|| (HashMap::new(), DEFAULT_CID_WIDTH));
            (
                FontKind::Cid { identity, vertical },
                descendant,
                widths,
                dw,
            )
        } else {
            let (widths, missing) = simple_widths(doc, dict);
            let fallback = if base_font.contains("Courier") {
                600.0
            } else {
                DEFAULT_SIMPLE_WIDTH
            };
            (FontKind::Simple, Some(dict), widths, missing.unwrap_or(fallback))
        };

        let descriptor = descriptor_holder
            .and_then(|d| d.get(b"FontDescriptor").ok())
            .and_then(|o| resolve(doc, o).as_dict().ok());

        let (mut ascent, mut descent) = standard_metrics(&base_font);
        let mut flags = 0i64;
        let mut weight = 0.0f32;
        if let Some(desc) = descriptor {
            if let Some(a) = desc.get(b"Ascent").ok().and_then(number) {
                ascent = a;
            }
            if let Some(d) = desc.get(b"Descent").ok().and_then(number) {
                descent = d;
            }
            flags = desc.get(b"Flags").and_then(Object::as_i64).unwrap_or(0);
            weight = desc.get(b"FontWeight").ok().and_then(number).unwrap_or(0.0);
        }
        // Some producers write a positive descent
        if descent > 0.0 {
            descent = -descent;
        }

        let lower = base_font.to_ascii_lowercase();
        let bold = flags & FLAG_FORCE_BOLD != 0
            || weight >= 600.0
            || ["bold", "black", "heavy", "semibold"]
                .iter()
                .any(|k| lower.contains(k));
        let italic =
            flags & FLAG_ITALIC != 0 || lower.contains("italic") || lower.contains("oblique");
        let monospace =
            flags & FLAG_FIXED_PITCH != 0 || lower.contains("mono") || lower.contains("courier");
        let serif = flags & FLAG_SERIF != 0
            || lower.contains("times")
            || (lower.contains("serif") && !lower.contains("sans"));

        let encoding_length = match &kind {
            FontKind::Simple => 1,
            FontKind::Cid { identity: true, .. } => 2,
            FontKind::Cid { .. } => match cmap.codespace.first() {
                Some(range) => range.len as u8,
                None if cmap.map.keys().any(|&k| k > 255) => 2,
                None => 1,
            },
        };

        let simple_table = if kind == FontKind::Simple {
            simple_unicode_table(doc, dict)
        } else {
            Vec::new()
        };

        Self {
            resource_name: String::from_utf8_lossy(resource_name).to_string(),
            base_font,
            xref,
            kind,
            ascent,
            descent,
            bold,
            italic,
            monospace,
            serif,
            encoding_length,
            codespace: cmap.codespace,
            widths,
            default_width,
            to_unicode: cmap.map,
            simple_table,
        }
    }

    /// Bytes per code as recorded in the IL.
    pub fn encoding_length(&self) -> u8 {
        self.encoding_length
    }

    pub fn is_vertical(&self) -> bool {
        matches!(self.kind, FontKind::Cid { vertical: true, .. })
    }

    /// Split a shown string into character codes.
    pub fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        match self.kind {
            FontKind::Simple => bytes.iter().map(|&b| b as u32).collect(),
            FontKind::Cid { .. } => {
                let mut codes = Vec::with_capacity(bytes.len() / 2 + 1);
                let mut i = 0;
                while i < bytes.len() {
                    let len = self.code_len_at(&bytes[i..]);
                    let end = (i + len).min(bytes.len());
                    let code = bytes[i..end]
                        .iter()
                        .fold(0u32, |acc, &b| (acc << 8) | b as u32);
                    codes.push(code);
                    i = end;
                }
                codes
            }
        }
    }

    fn code_len_at(&self, rest: &[u8]) -> usize {
        for len in 1..=4usize {
            if rest.len() < len {
                break;
            }
            let value = rest[..len].iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
            if self
                .codespace
                .iter()
                .any(|r| r.len == len && r.low <= value && value <= r.high)
            {
                return len;
            }
        }
        self.encoding_length.max(1) as usize
    }

    /// Unicode text of a code, `(cid:N)` when unmapped.
    pub fn unicode(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.get(&code) {
            return text.clone();
        }
        if let Some(Some(text)) = self.simple_table.get(code as usize) {
            return text.clone();
        }
        format!("(cid:{})", code)
    }

    /// Advance width in thousandths of an em.
    pub fn width(&self, code: u32) -> f32 {
        self.widths.get(&code).copied().unwrap_or(self.default_width)
    }

    /// Whether a single-byte 32 in this font is subject to word spacing.
    pub fn word_space_applies(&self, code: u32) -> bool {
        code == 32 && self.encoding_length == 1
    }

    /// IL font entry for this resource.
    pub fn to_pdf_font(&self) -> PdfFont {
        PdfFont {
            name: self.base_font.clone(),
            font_id: self.resource_name.clone(),
            xref_id: self.xref.map(|(num, _)| num),
            encoding_length: self.encoding_length,
            bold: self.bold,
            italic: self.italic,
            monospace: self.monospace,
            serif: self.serif,
            ascent: self.ascent,
            descent: self.descent,
        }
    }
}

/// Font names that fail UTF-8 decoding are kept as `BASE64:<b64>`.
pub fn font_name_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => format!(
            "BASE64:{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ),
    }
}

fn resolve<'a>(doc: &'a LopdfDocument, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn simple_widths(doc: &LopdfDocument, dict: &Dictionary) -> (HashMap<u32, f32>, Option<f32>) {
    let mut widths = HashMap::new();
    let first = dict
        .get(b"FirstChar")
        .and_then(Object::as_i64)
        .unwrap_or(0)
        .max(0) as u32;
    if let Some(arr) = dict
        .get(b"Widths")
        .ok()
        .and_then(|o| resolve(doc, o).as_array().ok())
    {
        for (i, w) in arr.iter().enumerate() {
            if let Some(w) = number(resolve(doc, w)) {
                widths.insert(first + i as u32, w);
            }
        }
    }
    let missing = dict
        .get(b"FontDescriptor")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok())
        .and_then(|d| d.get(b"MissingWidth").ok())
        .and_then(number);
    (widths, missing)
}

/// Parse the `/W` array of a descendant CID font.
fn cid_widths(doc: &LopdfDocument, dict: &Dictionary) -> (HashMap<u32, f32>, f32) {
    let dw = dict
        .get(b"DW")
        .ok()
        .and_then(number)
        .unwrap_or(DEFAULT_CID_WIDTH);
    let mut widths = HashMap::new();
    let Some(arr) = dict
        .get(b"W")
        .ok()
        .and_then(|o| resolve(doc, o).as_array().ok())
    else {
        return (widths, dw);
    };
    let items: Vec<&Object> = arr.iter().map(|o| resolve(doc, o)).collect();
    let mut i = 0;
    while i < items.len() {
        let Some(start) = number(items[i]) else {
            i += 1;
            continue;
        };
        let start = start as u32;
        match items.get(i + 1) {
            Some(Object::Array(list)) => {
                for (k, w) in list.iter().enumerate() {
                    if let Some(w) = number(resolve(doc, w)) {
                        widths.insert(start + k as u32, w);
                    }
                }
                i += 2;
            }
            Some(end) => {
                let end = number(end).unwrap_or(start as f32) as u32;
                if let Some(w) = items.get(i + 2).and_then(|o| number(o)) {
                    for code in start..=end.min(start.saturating_add(0xFFFF)) {
                        widths.insert(code, w);
                    }
                }
                i += 3;
            }
            None => break,
        }
    }
    (widths, dw)
}

/// Map every single-byte code through the font's simple encoding.
fn simple_unicode_table(doc: &LopdfDocument, dict: &Dictionary) -> Vec<Option<String>> {
    let encoding = dict.get_font_encoding(doc).ok();
    let differences = differences(doc, dict);
    (0u32..256)
        .map(|code| {
            if let Some(name) = differences.get(&code) {
                if let Some(text) = glyph_name_to_unicode(name) {
                    return Some(text);
                }
            }
            let enc = encoding.as_ref()?;
            LopdfDocument::decode_text(enc, &[code as u8])
                .ok()
                .filter(|s| !s.is_empty() && !s.contains('\u{FFFD}'))
        })
        .collect()
}

fn differences(doc: &LopdfDocument, dict: &Dictionary) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    let Some(arr) = dict
        .get(b"Encoding")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok())
        .and_then(|d| d.get(b"Differences").ok())
        .and_then(|o| resolve(doc, o).as_array().ok())
    else {
        return map;
    };
    let mut code = 0u32;
    for item in arr {
        match item {
            Object::Integer(i) => code = (*i).max(0) as u32,
            Object::Name(n) => {
                map.insert(code, String::from_utf8_lossy(n).to_string());
                code += 1;
            }
            _ => {}
        }
    }
    map
}

/// Unicode for glyph names following the `uniXXXX` / `uXXXX` conventions or
/// naming a single character.
pub fn glyph_name_to_unicode(name: &str) -> Option<String> {
    let base = name.split('.').next().unwrap_or(name);
    if let Some(hex) = base.strip_prefix("uni") {
        if hex.len() >= 4 && hex.len() % 4 == 0 {
            let units: Vec<u16> = (0..hex.len())
                .step_by(4)
                .filter_map(|i| u16::from_str_radix(&hex[i..i + 4], 16).ok())
                .collect();
            return String::from_utf16(&units).ok();
        }
    }
    if let Some(hex) = base.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) {
            if let Some(c) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
                return Some(c.to_string());
            }
        }
    }
    let named = match base {
        "space" => " ",
        "period" => ".",
        "comma" => ",",
        "hyphen" | "minus" => "-",
        "colon" => ":",
        "semicolon" => ";",
        "parenleft" => "(",
        "parenright" => ")",
        "bracketleft" => "[",
        "bracketright" => "]",
        "quoteright" => "\u{2019}",
        "quoteleft" => "\u{2018}",
        "quotedblleft" => "\u{201C}",
        "quotedblright" => "\u{201D}",
        "endash" => "\u{2013}",
        "emdash" => "\u{2014}",
        "fi" => "\u{FB01}",
        "fl" => "\u{FB02}",
        "bullet" => "\u{2022}",
        _ => "",
    };
    if !named.is_empty() {
        return Some(named.to_string());
    }
    let mut chars = base.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c.to_string()),
        _ => None,
    }
}

/// Ascent/descent of the standard 14 fonts, used without a descriptor.
fn standard_metrics(base_font: &str) -> (f32, f32) {
    let name = base_font.rsplit('+').next().unwrap_or(base_font);
    if name.starts_with("Helvetica") || name.starts_with("Arial") {
        (718.0, -207.0)
    } else if name.starts_with("Times") {
        (683.0, -217.0)
    } else if name.starts_with("Courier") {
        (629.0, -157.0)
    } else if name.starts_with("Symbol") {
        (1010.0, -293.0)
    } else if name.starts_with("ZapfDingbats") {
        (820.0, -143.0)
    } else {
        (0.0, 0.0)
    }
}

/// Parsed `ToUnicode` CMap.
#[derive(Debug, Default)]
struct ToUnicodeCMap {
    codespace: Vec<CodespaceRange>,
    map: HashMap<u32, String>,
}

struct CMapPatterns {
    codespace_block: Regex,
    codespace_pair: Regex,
    bfchar_block: Regex,
    bfchar_pair: Regex,
    bfrange_block: Regex,
    bfrange_entry: Regex,
    hex_item: Regex,
}

fn cmap_patterns() -> &'static CMapPatterns {
    static PATTERNS: OnceLock<CMapPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CMapPatterns {
        codespace_block: Regex::new(r"(?s)begincodespacerange(.*?)endcodespacerange").unwrap(),
        codespace_pair: Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>").unwrap(),
        bfchar_block: Regex::new(r"(?s)beginbfchar(.*?)endbfchar").unwrap(),
        bfchar_pair: Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]*)>").unwrap(),
        bfrange_block: Regex::new(r"(?s)beginbfrange(.*?)endbfrange").unwrap(),
        bfrange_entry: Regex::new(
            r"(?s)<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*(?:<([0-9A-Fa-f]*)>|\[(.*?)\])",
        )
        .unwrap(),
        hex_item: Regex::new(r"<([0-9A-Fa-f]*)>").unwrap(),
    })
}

fn hex_value(hex: &[u8]) -> u32 {
    hex.iter().fold(0u32, |acc, &b| {
        let d = (b as char).to_digit(16).unwrap_or(0);
        acc.wrapping_shl(4) | d
    })
}

fn hex_to_utf16_string(hex: &[u8]) -> String {
    let units: Vec<u16> = hex
        .chunks(4)
        .filter(|c| c.len() == 4)
        .map(|c| hex_value(c) as u16)
        .collect();
    String::from_utf16_lossy(&units)
}

fn parse_to_unicode(data: &[u8]) -> ToUnicodeCMap {
    let re = cmap_patterns();
    let mut cmap = ToUnicodeCMap::default();

    for block in re.codespace_block.captures_iter(data) {
        for pair in re.codespace_pair.captures_iter(&block[1]) {
            cmap.codespace.push(CodespaceRange {
                len: pair[1].len() / 2,
                low: hex_value(&pair[1]),
                high: hex_value(&pair[2]),
            });
        }
    }
    for block in re.bfchar_block.captures_iter(data) {
        for pair in re.bfchar_pair.captures_iter(&block[1]) {
            cmap.map
                .insert(hex_value(&pair[1]), hex_to_utf16_string(&pair[2]));
        }
    }
    for block in re.bfrange_block.captures_iter(data) {
        for entry in re.bfrange_entry.captures_iter(&block[1]) {
            let low = hex_value(&entry[1]);
            let high = hex_value(&entry[2]).min(low.saturating_add(0xFFFF));
            if let Some(dst) = entry.get(3) {
                let mut units: Vec<u16> = dst
                    .as_bytes()
                    .chunks(4)
                    .filter(|c| c.len() == 4)
                    .map(|c| hex_value(c) as u16)
                    .collect();
                for code in low..=high {
                    cmap.map.insert(code, String::from_utf16_lossy(&units));
                    if let Some(last) = units.last_mut() {
                        *last = last.wrapping_add(1);
                    }
                }
            } else if let Some(list) = entry.get(4) {
                let items = re.hex_item.captures_iter(list.as_bytes());
                for (offset, item) in items.enumerate() {
                    let code = low + offset as u32;
                    if code > high {
                        break;
                    }
                    cmap.map.insert(code, hex_to_utf16_string(&item[1]));
                }
            }
        }
    }
    cmap
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    const CMAP: &[u8] = b"/CIDInit /ProcSet findresource begin\n\
        1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n\
        2 beginbfchar\n<0003> <0020>\n<0024> <0041>\nendbfchar\n\
        1 beginbfrange\n<0044> <0046> <0061>\nendbfrange\n\
        1 beginbfrange\n<0050> <0051> [<4F60> <597D>]\nendbfrange\nend";

    #[test]
    fn test_parse_to_unicode() {
        let cmap = parse_to_unicode(CMAP);
        assert_eq!(cmap.codespace[0].len, 2);
        assert_eq!(cmap.map[&0x03], " ");
        assert_eq!(cmap.map[&0x24], "A");
        assert_eq!(cmap.map[&0x45], "b");
        assert_eq!(cmap.map[&0x46], "c");
        assert_eq!(cmap.map[&0x51], "好");
    }

    #[test]
    fn test_font_name_base64_fallback() {
        assert_eq!(font_name_string(b"Times-Roman"), "Times-Roman");
        assert!(font_name_string(&[0xff, 0xfe]).starts_with("BASE64:"));
    }

    #[test]
    fn test_glyph_names() {
        assert_eq!(glyph_name_to_unicode("uni4F60").as_deref(), Some("你"));
        assert_eq!(glyph_name_to_unicode("a.sc").as_deref(), Some("a"));
        assert_eq!(glyph_name_to_unicode("space").as_deref(), Some(" "));
        assert_eq!(glyph_name_to_unicode("foobar"), None);
    }

    #[test]
    fn test_identity_font_codes_and_encoding_length() {
        let mut doc = LopdfDocument::with_version("1.5");
        let cmap_id = doc.add_object(Stream::new(dictionary! {}, CMAP.to_vec()));
        let descendant = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "SimSun",
            "DW" => 1000,
            "W" => vec![Object::Integer(3), Object::Array(vec![Object::Integer(250)])],
        });
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "SimSun",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(descendant)],
            "ToUnicode" => cmap_id,
        };
        let loaded = LoadedFont::load(&doc, b"F1", None, &font);
        assert_eq!(loaded.encoding_length(), 2);
        assert_eq!(loaded.codes(&[0x00, 0x24, 0x00, 0x03]), vec![0x24, 0x03]);
        assert_eq!(loaded.unicode(0x24), "A");
        assert_eq!(loaded.unicode(0x999), "(cid:2457)");
        assert_eq!(loaded.width(3), 250.0);
        assert_eq!(loaded.width(4), 1000.0);
        assert!(!loaded.is_vertical());
    }

    #[test]
    fn test_simple_font_widths_and_traits() {
        let doc = LopdfDocument::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
            "FirstChar" => 65,
            "Widths" => vec![Object::Integer(722), Object::Integer(667)],
        };
        let loaded = LoadedFont::load(&doc, b"F2", Some((9, 0)), &font);
        assert_eq!(loaded.encoding_length(), 1);
        assert_eq!(loaded.width(65), 722.0);
        assert_eq!(loaded.width(66), 667.0);
        assert_eq!(loaded.width(67), DEFAULT_SIMPLE_WIDTH);
        assert!(loaded.bold);
        assert_eq!(loaded.descent, -207.0);
        let pdf_font = loaded.to_pdf_font();
        assert_eq!(pdf_font.font_id, "F2");
        assert_eq!(pdf_font.xref_id, Some(9));
    }
}
