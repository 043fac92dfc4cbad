//! Embedding substitute fonts as Type0 / CIDFontType2 resources.

use std::collections::BTreeMap;

use lopdf::{dictionary, Document as LopdfDocument, Object, ObjectId, Stream};

use crate::error::Result;
use crate::fontmap::{FontMapper, GlyphSource};
use crate::model::Document;

use super::pdf::{deflate, page_chars};

/// Glyphs a substitute font draws: glyph id to code point.
pub type UsedGlyphs = BTreeMap<u16, char>;

/// Resource name to the `/Type0` font object written for it.
pub type EmbeddedFonts = BTreeMap<String, ObjectId>;

const BFCHAR_CHUNK: usize = 100;

/// Writes the substitute fonts a document actually uses.
pub struct FontEmbedder<'a> {
    mapper: &'a FontMapper,
}

impl<'a> FontEmbedder<'a> {
    pub fn new(mapper: &'a FontMapper) -> Self {
        Self { mapper }
    }

    /// Glyphs drawn with each substitute font, keyed by resource name.
    pub fn used_glyphs(&self, doc: &Document) -> BTreeMap<String, UsedGlyphs> {
        let mut used: BTreeMap<String, UsedGlyphs> = BTreeMap::new();
        for page in &doc.page {
            for ch in page_chars(page) {
                if self.mapper.by_id(&ch.pdf_style.font_id).is_none() {
                    continue;
                }
                let (Some(code), Some(c)) = (ch.pdf_character_id, ch.char_unicode.chars().next()) else {
                    continue;
                };
                let Ok(gid) = u16::try_from(code) else {
                    continue;
                };
                used.entry(ch.pdf_style.font_id.clone())
                    .or_default()
                    .insert(gid, c);
            }
        }
        used
    }

    /// Add one font object per used substitute to `out`.
    pub fn embed(
        &self,
        out: &mut LopdfDocument,
        used: &BTreeMap<String, UsedGlyphs>,
    ) -> Result<EmbeddedFonts> {
        let mut fonts = EmbeddedFonts::new();
        for (resource_name, glyphs) in used {
            let Some(source) = self.mapper.by_id(resource_name) else {
                continue;
            };
            let id = embed_font(out, source.as_ref(), glyphs)?;
            log::debug!(
                "Embedded {} as /{} with {} glyphs",
                source.font_id(),
                resource_name,
                glyphs.len()
            );
            fonts.insert(resource_name.clone(), id);
        }
        Ok(fonts)
    }
}

fn descriptor_flags(source: &dyn GlyphSource) -> i64 {
    let traits = source.traits();
    let mut flags = 32;
    if traits.monospace {
        flags |= 1;
    }
    if traits.serif {
        flags |= 2;
    }
    if traits.italic {
        flags |= 64;
    }
    if traits.bold {
        flags |= 1 << 18;
    }
    flags
}

fn embed_font(out: &mut LopdfDocument, source: &dyn GlyphSource, glyphs: &UsedGlyphs) -> Result<ObjectId> {
    let base_font = Object::Name(source.font_id().as_bytes().to_vec());
    let ascent = source.ascent();
    let descent = source.descent();

    let mut descriptor = dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => base_font.clone(),
        "Flags" => Object::Integer(descriptor_flags(source)),
        "FontBBox" => vec![
            Object::Integer(0),
            Object::Real(descent),
            Object::Integer(1000),
            Object::Real(ascent),
        ],
        "ItalicAngle" => Object::Integer(0),
        "Ascent" => Object::Real(ascent),
        "Descent" => Object::Real(descent),
        "CapHeight" => Object::Real(ascent),
        "StemV" => Object::Integer(80),
    };
    if let Some(data) = source.font_data() {
        let program = Stream::new(
            dictionary! {
                "Length1" => Object::Integer(data.len() as i64),
                "Filter" => "FlateDecode",
            },
            deflate(data)?,
        )
        .with_compression(false);
        let program_id = out.add_object(program);
        descriptor.set("FontFile2", program_id);
    }
    let descriptor_id = out.add_object(descriptor);

    let mut widths = Vec::with_capacity(glyphs.len() * 2);
    for (gid, ch) in glyphs {
        widths.push(Object::Integer(i64::from(*gid)));
        widths.push(Object::Array(vec![Object::Real(source.advance(*ch, 1000.0))]));
    }

    let cid_font = dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => base_font.clone(),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => Object::Integer(0),
        },
        "FontDescriptor" => descriptor_id,
        "CIDToGIDMap" => "Identity",
        "DW" => Object::Integer(1000),
        "W" => widths,
    };
    let cid_font_id = out.add_object(cid_font);

    let cmap = Stream::new(
        dictionary! { "Filter" => "FlateDecode" },
        deflate(to_unicode_cmap(glyphs).as_bytes())?,
    )
    .with_compression(false);
    let cmap_id = out.add_object(cmap);

    Ok(out.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => base_font,
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
        "ToUnicode" => cmap_id,
    }))
}

/// ToUnicode CMap for two-byte glyph codes.
pub fn to_unicode_cmap(glyphs: &UsedGlyphs) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n\
         <0000> <FFFF>\n\
         endcodespacerange\n",
    );
    let entries: Vec<(&u16, &char)> = glyphs.iter().collect();
    for chunk in entries.chunks(BFCHAR_CHUNK) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, ch) in chunk {
            let mut units = [0u16; 2];
            let utf16: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{:04X}", u))
                .collect();
            cmap.push_str(&format!("<{:04X}> <{}>\n", gid, utf16));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str(
        "endcmap\n\
         CMapName currentdict /CMap defineresource pop\n\
         end\n\
         end\n",
    );
    cmap
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fontmap::{FontRole, SyntheticFace};
    use crate::model::{Composition, GraphicState, Page, PdfCharacter, PdfParagraph, PdfStyle, Rect};
    use std::sync::Arc;

    fn mapper() -> FontMapper {
        FontMapper::new().with_font(
            Arc::new(SyntheticFace::universal("noto")),
            &[FontRole::Normal, FontRole::Fallback, FontRole::Base],
        )
    }

    fn ch(text: &str, font: &str, code: u32) -> PdfCharacter {
        PdfCharacter::new(text, Rect::new(0.0, 0.0, 5.0, 10.0), PdfStyle::new(font, 10.0, GraphicState::default()))
            .with_code(code)
    }

    #[test]
    fn test_used_glyphs_only_counts_substitutes() {
        let mut page = Page::new(0);
        page.pdf_character.push(ch("a", "F1", 97));
        page.pdf_paragraph.push(PdfParagraph::with_compositions(vec![
            Composition::Character(ch("你", "noto", 0x4F60)),
            Composition::Character(ch("T", "base", 84)),
        ]));
        let mut doc = Document::new(1);
        doc.page.push(page);

        let m = mapper();
        let used = FontEmbedder::new(&m).used_glyphs(&doc);
        assert_eq!(used.len(), 2);
        assert_eq!(used["noto"].get(&0x4F60), Some(&'你'));
        assert_eq!(used["base"].get(&84), Some(&'T'));
    }

    #[test]
    fn test_embed_writes_type0_font() {
        let m = mapper();
        let mut used = BTreeMap::new();
        used.insert("noto".to_string(), UsedGlyphs::from([(0x4F60, '你')]));
        let mut out = LopdfDocument::with_version("1.7");
        let fonts = FontEmbedder::new(&m).embed(&mut out, &used).unwrap();

        let font = out.get_dictionary(fonts["noto"]).unwrap();
        assert_eq!(font.get(b"Subtype").unwrap().as_name().unwrap(), b"Type0");
        assert_eq!(font.get(b"Encoding").unwrap().as_name().unwrap(), b"Identity-H");
    }

    #[test]
    fn test_to_unicode_cmap_entries() {
        let glyphs = UsedGlyphs::from([(1, 'A'), (2, '😀')]);
        let cmap = to_unicode_cmap(&glyphs);
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0001> <0041>"));
        assert!(cmap.contains("<0002> <D83DDE00>"));
    }
}
