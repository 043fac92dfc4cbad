//! PDF re-emission.
//!
//! Every page and Form XObject listed in the IL gets a fresh content stream:
//! the preserved base operators followed by one `BT … Tj ET` block per
//! character, drawn exactly at the character's stored box. Substitute fonts
//! are embedded once per output document and added to each scope's
//! `/Resources /Font` dictionary.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId, Stream};

use crate::config::TranslationConfig;
use crate::error::{Error, Result};
use crate::fontmap::FontMapper;
use crate::model::{Composition, Document, GraphicState, Page, PdfCharacter, PdfRectangle, Rect};
use crate::parser::backend::{escape_name, format_real};
use crate::progress::STAGE_DRAWING;

use super::dual;
use super::fonts::{EmbeddedFonts, FontEmbedder, UsedGlyphs};
use super::save::save_pdf;

const MAX_INHERIT_DEPTH: usize = 32;

/// Page attributes a page may inherit from its `/Pages` ancestors.
const INHERITABLE: &[&[u8]] = &[b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Zlib-compress a stream body.
pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// A `FlateDecode` stream holding `content`.
pub fn flate_stream(dict: Dictionary, content: &[u8]) -> Result<Stream> {
    let mut dict = dict;
    dict.set("Filter", "FlateDecode");
    Ok(Stream::new(dict, deflate(content)?).with_compression(false))
}

pub(crate) fn deref<'a>(doc: &'a LopdfDocument, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

pub(crate) fn deref_dict<'a>(doc: &'a LopdfDocument, obj: &'a Object) -> Option<&'a Dictionary> {
    match deref(doc, obj) {
        Object::Dictionary(d) => Some(d),
        Object::Stream(s) => Some(&s.dict),
        _ => None,
    }
}

/// Page attribute, following `/Parent` for inherited keys.
pub(crate) fn inherited<'a>(doc: &'a LopdfDocument, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut dict = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = dict.get(key) {
            return Some(deref(doc, value));
        }
        dict = deref_dict(doc, dict.get(b"Parent").ok()?)?;
    }
    None
}

/// Copy inherited attributes into the page dictionary itself.
pub(crate) fn materialize_inherited(doc: &mut LopdfDocument, page_id: ObjectId) -> Result<()> {
    let missing: Vec<(&[u8], Object)> = {
        let dict = doc.get_dictionary(page_id)?;
        INHERITABLE
            .iter()
            .filter(|key| !dict.has(key))
            .filter_map(|key| inherited(doc, page_id, key).map(|v| (*key, v.clone())))
            .collect()
    };
    let dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
    for (key, value) in missing {
        dict.set(key.to_vec(), value);
    }
    Ok(())
}

pub(crate) fn rect_of(doc: &LopdfDocument, obj: &Object) -> Option<Rect> {
    let nums: Vec<f32> = deref(doc, obj)
        .as_array()
        .ok()?
        .iter()
        .filter_map(|o| match deref(doc, o) {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r),
            _ => None,
        })
        .collect();
    match nums.as_slice() {
        [x0, y0, x1, y1, ..] => Some(Rect::from_corners(*x0, *y0, *x1, *y1)),
        _ => None,
    }
}

pub(crate) fn rect_array(rect: Rect) -> Object {
    Object::Array(vec![
        Object::Real(rect.x),
        Object::Real(rect.y),
        Object::Real(rect.x2),
        Object::Real(rect.y2),
    ])
}

/// Characters a page draws: loose page characters, then every paragraph's.
pub fn page_chars(page: &Page) -> Vec<&PdfCharacter> {
    let mut chars: Vec<&PdfCharacter> = page.pdf_character.iter().collect();
    for paragraph in &page.pdf_paragraph {
        for comp in &paragraph.compositions {
            match comp {
                Composition::Character(c) => chars.push(c),
                Composition::SameStyleUnicodeCharacters(u) => log::warn!(
                    "page {}: text {:?} was never typeset, not drawn",
                    page.page_number + 1,
                    u.unicode
                ),
                other => chars.extend(other.chars()),
            }
        }
    }
    chars
}

/// Content operators for one page and its XObjects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDrawing {
    pub page_ops: String,
    pub xobject_ops: BTreeMap<u32, String>,
}

fn char_hex(ch: &PdfCharacter, page: &Page) -> Option<String> {
    let code = ch.pdf_character_id?;
    let len = page
        .find_font(ch.xobj_id, &ch.pdf_style.font_id)
        .map(|f| usize::from(f.encoding_length.max(1)))
        .unwrap_or(if code > 0xFF { 2 } else { 1 });
    Some(format!("{:0width$X}", code, width = len * 2))
}

fn draw_char(out: &mut String, ch: &PdfCharacter, hex: &str) {
    let font = escape_name(ch.pdf_style.font_id.as_bytes());
    let size = format_real(ch.pdf_style.font_size);
    let matrix = if ch.vertical {
        format!("0 1 -1 0 {} {}", format_real(ch.bbox.x2), format_real(ch.bbox.y))
    } else {
        format!("1 0 0 1 {} {}", format_real(ch.bbox.x), format_real(ch.bbox.y))
    };
    out.push_str(&format!(
        "q {} \nBT /{} {} Tf {} Tm <{}> Tj ET Q \n",
        ch.pdf_style.graphic_state.passthrough(),
        font,
        size,
        matrix,
        hex
    ));
}

fn draw_rect(out: &mut String, rect: &PdfRectangle) {
    let gs = rect
        .graphic_state
        .as_ref()
        .map(GraphicState::passthrough)
        .unwrap_or("");
    let b = rect.bbox;
    let (x, y, x2, y2) = (
        format_real(b.x),
        format_real(b.y),
        format_real(b.x2),
        format_real(b.y2),
    );
    out.push_str(&format!(
        "q {} 1 w {x} {y} m {x2} {y} l {x2} {y2} l {x} {y2} l h S Q \n",
        gs,
        x = x,
        y = y,
        x2 = x2,
        y2 = y2
    ));
}

/// Build the content streams of a page.
///
/// Characters whose font is not in their scope's resource dictionary are
/// skipped, as are line breaks and glyphs without a code. Debug characters
/// and rectangles are only drawn when `debug` is set.
pub fn draw_page(
    page: &Page,
    debug: bool,
    page_fonts: &BTreeSet<String>,
    xobject_fonts: &HashMap<u32, BTreeSet<String>>,
) -> PageDrawing {
    let crop = page.cropbox;
    let mut page_ops = format!(
        "q {} Q q Q 1 0 0 1 {} {} cm \n",
        page.base_operations,
        format_real(crop.x),
        format_real(crop.y)
    );
    let mut xobject_ops: BTreeMap<u32, String> = page
        .pdf_xobject
        .iter()
        .map(|x| (x.xobj_id, x.base_operations.clone()))
        .collect();

    for ch in page_chars(page) {
        if (ch.debug_info && !debug) || ch.char_unicode == "\n" {
            continue;
        }
        let Some(hex) = char_hex(ch, page) else {
            continue;
        };
        let (ops, fonts) = match ch.xobj_id {
            Some(id) => match xobject_ops.get_mut(&id) {
                Some(ops) => (ops, xobject_fonts.get(&id)),
                None => continue,
            },
            None => (&mut page_ops, Some(page_fonts)),
        };
        if !fonts.is_some_and(|f| f.contains(&ch.pdf_style.font_id)) {
            continue;
        }
        draw_char(ops, ch, &hex);
    }

    if debug {
        for rect in page.pdf_rectangle.iter().filter(|r| r.debug_info) {
            draw_rect(&mut page_ops, rect);
        }
    }

    PageDrawing {
        page_ops,
        xobject_ops,
    }
}

/// Insert the embedded fonts into a resource dictionary and list the font
/// names it then provides.
fn add_fonts(doc: &LopdfDocument, resources: &mut Dictionary, fonts: &EmbeddedFonts) -> BTreeSet<String> {
    let mut font_dict = resources
        .get(b"Font")
        .ok()
        .and_then(|o| deref_dict(doc, o))
        .cloned()
        .unwrap_or_default();
    for (name, id) in fonts {
        font_dict.set(name.as_bytes().to_vec(), Object::Reference(*id));
    }
    let names = font_dict
        .iter()
        .map(|(k, _)| String::from_utf8_lossy(k).into_owned())
        .collect();
    resources.set("Font", Object::Dictionary(font_dict));
    names
}

fn stamp_info(out: &mut LopdfDocument) {
    let now = chrono::Local::now().format("D:%Y%m%d%H%M%S").to_string();
    let producer = format!("pdftranslate {}", env!("CARGO_PKG_VERSION"));
    let info_id = match out.trailer.get(b"Info").and_then(Object::as_reference) {
        Ok(id) => id,
        Err(_) => {
            let id = out.add_object(Dictionary::new());
            out.trailer.set("Info", id);
            id
        }
    };
    if let Ok(Object::Dictionary(info)) = out.get_object_mut(info_id) {
        info.set("ModDate", Object::string_literal(now));
        info.set("Producer", Object::string_literal(producer));
    }
}

/// Paths written by one [`PdfCreator::write`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedFiles {
    pub mono: Option<PathBuf>,
    pub dual: Option<PathBuf>,
}

/// Writes the typeset IL back into copies of the source PDF.
pub struct PdfCreator<'a> {
    config: &'a TranslationConfig,
    font_mapper: Arc<FontMapper>,
}

impl<'a> PdfCreator<'a> {
    pub fn new(config: &'a TranslationConfig, font_mapper: Arc<FontMapper>) -> Self {
        Self {
            config,
            font_mapper,
        }
    }

    /// Write the mono and dual PDFs the configuration asks for.
    ///
    /// A failing output is logged and left out of the result; the call only
    /// fails when nothing could be written or the run was cancelled.
    pub fn write(&self, doc: &Document, source: &LopdfDocument, watermarked: bool) -> Result<RenderedFiles> {
        let used = FontEmbedder::new(&self.font_mapper).used_glyphs(doc);
        let mono = self.render_document(doc, source, &used, false)?;
        let translated_for_dual = match (self.config.no_dual, self.config.debug) {
            (true, _) => None,
            (false, true) => Some(self.render_document(doc, source, &used, true)?),
            (false, false) => Some(mono.clone()),
        };

        let mut files = RenderedFiles::default();
        if !self.config.no_mono {
            let path = self.config.output_path("mono", watermarked);
            files.mono = self.keep_going("mono", save_pdf(mono, &path, self.config).map(|_| path))?;
        }
        if let Some(translated) = translated_for_dual {
            let path = self.config.output_path("dual", watermarked);
            let written = self
                .create_dual(source, translated)
                .and_then(|dual| save_pdf(dual, &path, self.config))
                .map(|_| path);
            files.dual = self.keep_going("dual", written)?;
        }

        if files.mono.is_none() && files.dual.is_none() {
            return Err(Error::Render("no output PDF could be written".into()));
        }
        Ok(files)
    }

    fn keep_going(&self, kind: &str, written: Result<PathBuf>) -> Result<Option<PathBuf>> {
        match written {
            Ok(path) => Ok(Some(path)),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                log::error!("Failed to write the {} PDF: {}", kind, e);
                Ok(None)
            }
        }
    }

    fn create_dual(&self, source: &LopdfDocument, translated: LopdfDocument) -> Result<LopdfDocument> {
        if self.config.use_alternating_pages_dual {
            dual::alternating_pages(source, translated, self.config.dual_translate_first)
        } else {
            dual::side_by_side(source, translated, self.config.dual_translate_first)
        }
    }

    /// A copy of `source` with every IL page redrawn.
    pub fn render_document(
        &self,
        doc: &Document,
        source: &LopdfDocument,
        used: &BTreeMap<String, UsedGlyphs>,
        debug: bool,
    ) -> Result<LopdfDocument> {
        let mut out = source.clone();
        let fonts = FontEmbedder::new(&self.font_mapper).embed(&mut out, used)?;
        let page_ids = out.get_pages();

        let stage = self.config.progress.stage_start(STAGE_DRAWING, doc.page.len());
        for page in &doc.page {
            self.config.raise_if_cancelled()?;
            match page_ids.get(&(page.page_number + 1)) {
                Some(&page_id) => render_page(&mut out, page_id, page, &fonts, debug)?,
                None => log::warn!(
                    "page {} is missing from the source document, not redrawn",
                    page.page_number + 1
                ),
            }
            stage.advance(1);
        }
        stamp_info(&mut out);
        Ok(out)
    }
}

/// Replace the content of one page and of its Form XObjects.
pub fn render_page(
    out: &mut LopdfDocument,
    page_id: ObjectId,
    page: &Page,
    fonts: &EmbeddedFonts,
    debug: bool,
) -> Result<()> {
    let mut resources = inherited(out, page_id, b"Resources")
        .and_then(|o| deref_dict(out, o))
        .cloned()
        .unwrap_or_default();
    let page_fonts = add_fonts(out, &mut resources, fonts);

    let mut xobject_resources = HashMap::new();
    let mut xobject_fonts = HashMap::new();
    for xobj in &page.pdf_xobject {
        let id = (xobj.xref_id, xobj.xref_gen);
        let Ok(Object::Stream(stream)) = out.get_object(id) else {
            log::warn!("XObject {} {} R not found, its text is dropped", id.0, id.1);
            continue;
        };
        let mut res = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|o| deref_dict(out, o))
            .cloned()
            .unwrap_or_else(|| resources.clone());
        xobject_fonts.insert(xobj.xobj_id, add_fonts(out, &mut res, fonts));
        xobject_resources.insert(xobj.xobj_id, (id, res));
    }

    let drawing = draw_page(page, debug, &page_fonts, &xobject_fonts);

    for (xobj_id, ops) in &drawing.xobject_ops {
        let Some((id, res)) = xobject_resources.remove(xobj_id) else {
            continue;
        };
        let compressed = deflate(ops.as_bytes())?;
        if let Ok(Object::Stream(stream)) = out.get_object_mut(id) {
            stream.dict.remove(b"DecodeParms");
            stream.dict.set("Filter", "FlateDecode");
            stream.dict.set("Resources", Object::Dictionary(res));
            stream.set_content(compressed);
        }
    }

    let content = flate_stream(Dictionary::new(), drawing.page_ops.as_bytes())?;
    let content_id = out.add_object(content);
    let dict = out.get_object_mut(page_id)?.as_dict_mut()?;
    dict.set("Contents", content_id);
    dict.set("Resources", Object::Dictionary(resources));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PdfFont, PdfParagraph, PdfStyle, PdfXobject};

    fn style(font: &str) -> PdfStyle {
        PdfStyle::new(font, 12.0, GraphicState::with_passthrough("0 g"))
    }

    fn page() -> Page {
        let mut page = Page::new(0);
        page.cropbox = Rect::new(10.0, 20.0, 610.0, 820.0);
        page.base_operations = "0 0 m 10 10 l S".into();
        page.pdf_font.push(PdfFont::new("F1", "Helvetica"));
        page.pdf_font.push(PdfFont::new("noto", "noto").with_encoding_length(2));
        page
    }

    fn fonts(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_original_characters_are_drawn_at_their_box() {
        let mut page = page();
        page.pdf_character.push(
            PdfCharacter::new("A", Rect::new(72.5, 700.0, 80.0, 712.0), style("F1")).with_code(65),
        );
        let drawing = draw_page(&page, false, &fonts(&["F1"]), &HashMap::new());
        assert!(drawing.page_ops.starts_with("q 0 0 m 10 10 l S Q q Q 1 0 0 1 10 20 cm \n"));
        assert!(drawing
            .page_ops
            .contains("q 0 g \nBT /F1 12 Tf 1 0 0 1 72.5 700 Tm <41> Tj ET Q \n"));
    }

    #[test]
    fn test_substitute_codes_use_two_bytes_and_vertical_matrix() {
        let mut page = page();
        let mut ch = PdfCharacter::new("你", Rect::new(100.0, 50.0, 110.0, 60.0), style("noto"))
            .with_code(0x4F60);
        ch.vertical = true;
        page.pdf_paragraph
            .push(PdfParagraph::with_compositions(vec![Composition::Character(ch)]));
        let drawing = draw_page(&page, false, &fonts(&["noto"]), &HashMap::new());
        assert!(drawing.page_ops.contains("0 1 -1 0 110 50 Tm <4F60> Tj"));
    }

    #[test]
    fn test_unavailable_fonts_and_debug_glyphs_are_skipped() {
        let mut page = page();
        page.pdf_character
            .push(PdfCharacter::new("a", Rect::new(0.0, 0.0, 5.0, 5.0), style("F9")).with_code(97));
        let mut debug = PdfCharacter::new("d", Rect::new(0.0, 0.0, 5.0, 5.0), style("F1")).with_code(100);
        debug.debug_info = true;
        page.pdf_character.push(debug);
        page.pdf_rectangle.push(PdfRectangle {
            bbox: Rect::new(1.0, 2.0, 3.0, 4.0),
            graphic_state: None,
            debug_info: true,
        });

        let mono = draw_page(&page, false, &fonts(&["F1"]), &HashMap::new());
        assert!(!mono.page_ops.contains("Tj"));
        assert!(!mono.page_ops.contains("h S"));

        let dual = draw_page(&page, true, &fonts(&["F1"]), &HashMap::new());
        assert!(dual.page_ops.contains("<64> Tj"));
        assert!(!dual.page_ops.contains("<61> Tj"));
        assert!(dual.page_ops.contains("1 w 1 2 m 3 2 l 3 4 l 1 4 l h S"));
    }

    #[test]
    fn test_xobject_characters_go_to_their_stream() {
        let mut page = page();
        page.pdf_xobject.push(PdfXobject {
            xobj_id: 1,
            base_operations: "q Q 1 0 0 1 0 0 cm ".into(),
            ..Default::default()
        });
        page.pdf_character.push(
            PdfCharacter::new("x", Rect::new(0.0, 0.0, 5.0, 5.0), style("F1"))
                .with_code(120)
                .with_xobj(Some(1)),
        );
        let mut xfonts = HashMap::new();
        xfonts.insert(1, fonts(&["F1"]));
        let drawing = draw_page(&page, false, &fonts(&[]), &xfonts);
        assert!(!drawing.page_ops.contains("Tj"));
        assert!(drawing.xobject_ops[&1].starts_with("q Q 1 0 0 1 0 0 cm "));
        assert!(drawing.xobject_ops[&1].contains("<78> Tj"));
    }

    #[test]
    fn test_deflate_round_trip() {
        use flate2::read::ZlibDecoder;
        use std::io::Read;

        let compressed = deflate(b"BT ET").unwrap();
        let mut out = String::new();
        ZlibDecoder::new(compressed.as_slice())
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "BT ET");
    }
}
