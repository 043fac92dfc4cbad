//! Substitute fonts for translated text.
//!
//! Translated code points are drawn with fonts the output PDF embeds. The
//! [`FontMapper`] holds those fonts in four roles (normal, script, fallback,
//! base), picks one per code point from the traits of the original font, and
//! memoises glyph coverage and mapping results behind mutexes so worker
//! threads can share it.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::model::{Document, PdfFont};
use crate::progress::{ProgressMonitor, STAGE_ADD_FONTS};

/// Resource key of the base font alias.
pub const BASE_FONT_ID: &str = "base";

/// Style traits of a font.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FontTraits {
    pub bold: bool,
    pub italic: bool,
    pub monospace: bool,
    pub serif: bool,
}

impl FontTraits {
    pub fn of(font: &PdfFont) -> Self {
        Self {
            bold: font.bold,
            italic: font.italic,
            monospace: font.monospace,
            serif: font.serif,
        }
    }
}

/// Role a substitute font plays in the mapping order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontRole {
    Normal,
    Script,
    Fallback,
    Base,
}

/// A font program able to draw code points.
pub trait GlyphSource: Send + Sync {
    /// Resource key used in the output PDF.
    fn font_id(&self) -> &str;

    /// Glyph id for a code point, if covered.
    fn glyph_id(&self, ch: char) -> Option<u16>;

    fn has_glyph(&self, ch: char) -> bool {
        self.glyph_id(ch).is_some()
    }

    /// Horizontal advance at `font_size`, in user space.
    fn advance(&self, ch: char, font_size: f32) -> f32;

    fn traits(&self) -> FontTraits;

    /// Ascent in thousandths of the font size.
    fn ascent(&self) -> f32;

    /// Descent in thousandths of the font size, normally negative.
    fn descent(&self) -> f32;

    /// Raw font program for embedding, when there is one.
    fn font_data(&self) -> Option<&[u8]>;

    /// Bytes per glyph code when drawn.
    fn encoding_length(&self) -> u8 {
        2
    }

    /// Advance of each glyph id, for the embedded `/W` array.
    fn glyph_widths(&self) -> Vec<(u16, f32)> {
        Vec::new()
    }
}

/// A TrueType/OpenType font loaded with `ttf-parser`.
///
/// The cmap and advances are extracted once at load time so the face does
/// not need to stay borrowed.
pub struct TtfGlyphSource {
    font_id: String,
    data: Vec<u8>,
    cmap: HashMap<u32, u16>,
    advances: HashMap<u16, u16>,
    units_per_em: f32,
    ascent: f32,
    descent: f32,
    traits: FontTraits,
}

impl TtfGlyphSource {
    /// Parse a font program.
    pub fn from_bytes(font_id: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        let font_id = font_id.into();
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|e| Error::FontDecode(format!("{}: {}", font_id, e)))?;

        let mut cmap = HashMap::new();
        if let Some(table) = face.tables().cmap {
            for subtable in table.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|cp| {
                    if let Some(gid) = subtable.glyph_index(cp) {
                        cmap.entry(cp).or_insert(gid.0);
                    }
                });
            }
        }
        let advances = cmap
            .values()
            .filter_map(|gid| {
                face.glyph_hor_advance(ttf_parser::GlyphId(*gid))
                    .map(|adv| (*gid, adv))
            })
            .collect();

        let units_per_em = f32::from(face.units_per_em().max(1));
        let scale = 1000.0 / units_per_em;
        let lower = font_id.to_ascii_lowercase();
        let traits = FontTraits {
            bold: face.is_bold(),
            italic: face.is_italic(),
            monospace: face.is_monospaced(),
            serif: lower.contains("serif") && !lower.contains("sans"),
        };
        let ascent = f32::from(face.ascender()) * scale;
        let descent = f32::from(face.descender()) * scale;
        drop(face);

        Ok(Self {
            font_id,
            data,
            cmap,
            advances,
            units_per_em,
            ascent,
            descent,
            traits,
        })
    }

    /// Load a font file; the resource key is derived from the file stem.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_bytes(font_id_from_stem(&stem), data)
    }
}

impl GlyphSource for TtfGlyphSource {
    fn font_id(&self) -> &str {
        &self.font_id
    }

    fn glyph_id(&self, ch: char) -> Option<u16> {
        self.cmap.get(&(ch as u32)).copied()
    }

    fn advance(&self, ch: char, font_size: f32) -> f32 {
        self.glyph_id(ch)
            .and_then(|gid| self.advances.get(&gid))
            .map(|adv| f32::from(*adv) / self.units_per_em * font_size)
            .unwrap_or(0.0)
    }

    fn traits(&self) -> FontTraits {
        self.traits
    }

    fn ascent(&self) -> f32 {
        self.ascent
    }

    fn descent(&self) -> f32 {
        self.descent
    }

    fn font_data(&self) -> Option<&[u8]> {
        Some(&self.data)
    }

    fn glyph_widths(&self) -> Vec<(u16, f32)> {
        let mut widths: Vec<(u16, f32)> = self
            .advances
            .iter()
            .map(|(gid, adv)| (*gid, f32::from(*adv) * 1000.0 / self.units_per_em))
            .collect();
        widths.sort_by_key(|(gid, _)| *gid);
        widths
    }
}

/// A face with one fixed advance covering a set of code point ranges.
///
/// Glyph ids are the code points themselves (clamped to `u16`). It has no
/// font program, so output using it is only useful for dry runs and tests.
#[derive(Debug, Clone)]
pub struct SyntheticFace {
    font_id: String,
    ranges: Vec<(char, char)>,
    /// Advance in thousandths of the font size
    width: f32,
    traits: FontTraits,
}

impl SyntheticFace {
    pub fn new(font_id: impl Into<String>, ranges: &[(char, char)], width: f32) -> Self {
        Self {
            font_id: font_id.into(),
            ranges: ranges.to_vec(),
            width,
            traits: FontTraits::default(),
        }
    }

    /// Covers printable ASCII and the CJK unified ideographs with a 500/1000 em advance.
    pub fn universal(font_id: impl Into<String>) -> Self {
        Self::new(
            font_id,
            &[(' ', '~'), ('\u{3000}', '\u{303f}'), ('\u{4e00}', '\u{9fff}'), ('\u{ff00}', '\u{ffef}')],
            500.0,
        )
    }

    pub fn with_traits(mut self, traits: FontTraits) -> Self {
        self.traits = traits;
        self
    }
}

impl GlyphSource for SyntheticFace {
    fn font_id(&self) -> &str {
        &self.font_id
    }

    fn glyph_id(&self, ch: char) -> Option<u16> {
        self.ranges
            .iter()
            .any(|(lo, hi)| (*lo..=*hi).contains(&ch))
            .then(|| (ch as u32).min(u32::from(u16::MAX)) as u16)
    }

    fn advance(&self, ch: char, font_size: f32) -> f32 {
        if self.has_glyph(ch) {
            self.width * font_size / 1000.0
        } else {
            0.0
        }
    }

    fn traits(&self) -> FontTraits {
        self.traits
    }

    fn ascent(&self) -> f32 {
        880.0
    }

    fn descent(&self) -> f32 {
        -120.0
    }

    fn font_data(&self) -> Option<&[u8]> {
        None
    }
}

type MapKey = (char, FontTraits);

/// Registry of substitute fonts.
pub struct FontMapper {
    fonts: Vec<Arc<dyn GlyphSource>>,
    normal: Vec<usize>,
    script: Vec<usize>,
    fallback: Vec<usize>,
    base: Option<usize>,
    coverage: Mutex<HashMap<(char, usize), bool>>,
    mapped: Mutex<HashMap<MapKey, Option<usize>>>,
}

impl FontMapper {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            normal: Vec::new(),
            script: Vec::new(),
            fallback: Vec::new(),
            base: None,
            coverage: Mutex::new(HashMap::new()),
            mapped: Mutex::new(HashMap::new()),
        }
    }

    /// Register a font in one or more roles.
    pub fn add(&mut self, font: Arc<dyn GlyphSource>, roles: &[FontRole]) -> &mut Self {
        let idx = match self
            .fonts
            .iter()
            .position(|f| f.font_id() == font.font_id())
        {
            Some(idx) => idx,
            None => {
                self.fonts.push(font);
                self.fonts.len() - 1
            }
        };
        for role in roles {
            let list = match role {
                FontRole::Normal => &mut self.normal,
                FontRole::Script => &mut self.script,
                FontRole::Fallback => &mut self.fallback,
                FontRole::Base => {
                    self.base = Some(idx);
                    continue;
                }
            };
            if !list.contains(&idx) {
                list.push(idx);
            }
        }
        if let Ok(mut mapped) = self.mapped.lock() {
            mapped.clear();
        }
        self
    }

    /// Builder form of [`FontMapper::add`].
    pub fn with_font(mut self, font: Arc<dyn GlyphSource>, roles: &[FontRole]) -> Self {
        self.add(font, roles);
        self
    }

    /// Load every `.ttf`/`.otf` in a directory.
    ///
    /// Italic faces become script fonts, upright faces normal fonts, and all
    /// faces serve as fallbacks. A face whose name contains `base` becomes the
    /// base font, otherwise the first upright face does.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("ttf") || e.eq_ignore_ascii_case("otf"))
            })
            .collect();
        paths.sort();

        let mut mapper = Self::new();
        for path in &paths {
            let font = match TtfGlyphSource::load(path) {
                Ok(font) => font,
                Err(e) => {
                    log::warn!("skipping font {}: {}", path.display(), e);
                    continue;
                }
            };
            let mut roles = vec![FontRole::Fallback];
            roles.push(if font.traits().italic {
                FontRole::Script
            } else {
                FontRole::Normal
            });
            if font.font_id().contains(BASE_FONT_ID) {
                roles.push(FontRole::Base);
            }
            log::debug!("loaded substitute font {} ({:?})", font.font_id(), roles);
            mapper.add(Arc::new(font), &roles);
        }
        if mapper.base.is_none() {
            mapper.base = mapper.normal.first().or(mapper.fallback.first()).copied();
        }
        if mapper.is_empty() {
            return Err(Error::Config(format!(
                "no usable fonts found in {}",
                dir.display()
            )));
        }
        Ok(mapper)
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// All registered fonts.
    pub fn fonts(&self) -> &[Arc<dyn GlyphSource>] {
        &self.fonts
    }

    /// The base font used for measurements and notices.
    pub fn base(&self) -> Option<&Arc<dyn GlyphSource>> {
        self.base.or_else(|| (!self.fonts.is_empty()).then_some(0)).map(|i| &self.fonts[i])
    }

    /// Look up a font by resource key; `base` resolves to the base font.
    pub fn by_id(&self, font_id: &str) -> Option<&Arc<dyn GlyphSource>> {
        if font_id == BASE_FONT_ID {
            return self.base();
        }
        self.fonts.iter().find(|f| f.font_id() == font_id)
    }

    fn covers(&self, idx: usize, ch: char) -> bool {
        if let Ok(cache) = self.coverage.lock() {
            if let Some(hit) = cache.get(&(ch, idx)) {
                return *hit;
            }
        }
        let covered = self.fonts[idx].has_glyph(ch);
        if let Ok(mut cache) = self.coverage.lock() {
            cache.insert((ch, idx), covered);
        }
        covered
    }

    /// Whether any registered font covers the code point.
    pub fn has_char(&self, ch: char) -> bool {
        (0..self.fonts.len()).any(|idx| self.covers(idx, ch))
    }

    fn map_in_role(&self, role: &[usize], traits: FontTraits, ch: char) -> Option<usize> {
        role.iter().copied().find(|&idx| {
            if !self.covers(idx, ch) {
                return false;
            }
            let font = &self.fonts[idx];
            if font.traits().bold != traits.bold {
                return false;
            }
            let serif_named = font.font_id().to_ascii_lowercase().contains("serif");
            traits.serif == serif_named
        })
    }

    /// Choose a substitute font for `ch` drawn in place of `original`.
    ///
    /// Italic text prefers a script font; then a normal font with matching
    /// weight and serif-ness; then a fallback font. `None` means no font
    /// covers the code point.
    pub fn map(&self, original: &FontTraits, ch: char) -> Option<Arc<dyn GlyphSource>> {
        let key = (ch, *original);
        if let Ok(cache) = self.mapped.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit.map(|idx| Arc::clone(&self.fonts[idx]));
            }
        }

        let found = if original.italic {
            self.script.iter().copied().find(|&idx| self.covers(idx, ch))
        } else {
            None
        }
        .or_else(|| self.map_in_role(&self.normal, *original, ch))
        .or_else(|| self.map_in_role(&self.fallback, *original, ch))
        .or_else(|| {
            self.fallback
                .iter()
                .copied()
                .find(|&idx| self.covers(idx, ch))
        });

        if found.is_none() {
            log::warn!("Can't find font for {:?} (U+{:04X})", ch, ch as u32);
        }
        if let Ok(mut cache) = self.mapped.lock() {
            cache.insert(key, found);
        }
        found.map(|idx| Arc::clone(&self.fonts[idx]))
    }

    /// IL font entries for every substitute font plus the `base` alias.
    pub fn pdf_fonts(&self) -> Vec<PdfFont> {
        let mut fonts: Vec<PdfFont> = self
            .fonts
            .iter()
            .map(|f| substitute_pdf_font(f.as_ref(), f.font_id()))
            .collect();
        if let Some(base) = self.base() {
            fonts.push(substitute_pdf_font(base.as_ref(), BASE_FONT_ID));
        }
        fonts
    }

    /// Register the substitute fonts in every page and XObject scope.
    pub fn add_fonts(&self, document: &mut Document, progress: &ProgressMonitor) -> Result<()> {
        let stage = progress.stage_start(STAGE_ADD_FONTS, document.page.len());
        let fonts = self.pdf_fonts();
        for page in &mut document.page {
            progress.raise_if_cancelled()?;
            extend_missing(&mut page.pdf_font, &fonts);
            for xobj in &mut page.pdf_xobject {
                extend_missing(&mut xobj.pdf_font, &fonts);
            }
            stage.advance(1);
        }
        Ok(())
    }
}

impl Default for FontMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FontMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMapper")
            .field(
                "fonts",
                &self.fonts.iter().map(|f| f.font_id()).collect::<Vec<_>>(),
            )
            .field("base", &self.base().map(|f| f.font_id()))
            .finish()
    }
}

fn substitute_pdf_font(source: &dyn GlyphSource, font_id: &str) -> PdfFont {
    let traits = source.traits();
    PdfFont {
        name: source.font_id().to_string(),
        font_id: font_id.to_string(),
        xref_id: None,
        encoding_length: source.encoding_length(),
        bold: traits.bold,
        italic: traits.italic,
        monospace: traits.monospace,
        serif: traits.serif,
        ascent: source.ascent(),
        descent: source.descent(),
    }
}

fn extend_missing(target: &mut Vec<PdfFont>, fonts: &[PdfFont]) {
    for font in fonts {
        if !target.iter().any(|f| f.font_id == font.font_id) {
            target.push(font.clone());
        }
    }
}

/// Lowercase PDF-name-safe resource key from a file stem.
pub fn font_id_from_stem(stem: &str) -> String {
    let id: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if id.is_empty() {
        "font".to_string()
    } else {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Page;

    fn mapper() -> FontMapper {
        let serif = SyntheticFace::universal("noto_serif");
        let sans = SyntheticFace::universal("noto_sans");
        let bold_sans = SyntheticFace::universal("noto_sans_bold").with_traits(FontTraits {
            bold: true,
            ..Default::default()
        });
        let script = SyntheticFace::new("script_italic", &[('a', 'z')], 400.0).with_traits(FontTraits {
            italic: true,
            ..Default::default()
        });
        let greek = SyntheticFace::new("fallback_greek", &[('\u{370}', '\u{3ff}')], 600.0);
        FontMapper::new()
            .with_font(Arc::new(serif), &[FontRole::Normal, FontRole::Fallback])
            .with_font(Arc::new(sans), &[FontRole::Normal, FontRole::Fallback, FontRole::Base])
            .with_font(Arc::new(bold_sans), &[FontRole::Normal])
            .with_font(Arc::new(script), &[FontRole::Script])
            .with_font(Arc::new(greek), &[FontRole::Fallback])
    }

    #[test]
    fn test_map_trait_order() {
        let m = mapper();
        let plain = FontTraits::default();
        assert_eq!(m.map(&plain, 'a').unwrap().font_id(), "noto_sans");

        let serif = FontTraits { serif: true, ..plain };
        assert_eq!(m.map(&serif, '你').unwrap().font_id(), "noto_serif");

        let bold = FontTraits { bold: true, ..plain };
        assert_eq!(m.map(&bold, 'a').unwrap().font_id(), "noto_sans_bold");

        let italic = FontTraits { italic: true, ..plain };
        assert_eq!(m.map(&italic, 'a').unwrap().font_id(), "script_italic");
        assert_eq!(m.map(&italic, '你').unwrap().font_id(), "noto_sans");

        assert_eq!(m.map(&plain, 'λ').unwrap().font_id(), "fallback_greek");
        assert!(m.map(&plain, '\u{1F600}').is_none());
    }

    #[test]
    fn test_has_char_and_base_alias() {
        let m = mapper();
        assert!(m.has_char('Z'));
        assert!(!m.has_char('\u{0E01}'));
        assert_eq!(m.by_id(BASE_FONT_ID).unwrap().font_id(), "noto_sans");
        let fonts = m.pdf_fonts();
        assert!(fonts.iter().any(|f| f.font_id == BASE_FONT_ID && f.name == "noto_sans"));
    }

    #[test]
    fn test_add_fonts_once_per_scope() {
        let m = mapper();
        let mut doc = Document::new(1);
        doc.page.push(Page::new(0));
        let progress = ProgressMonitor::for_translation();
        m.add_fonts(&mut doc, &progress).unwrap();
        m.add_fonts(&mut doc, &progress).unwrap();
        assert_eq!(doc.page[0].pdf_font.len(), m.fonts().len() + 1);
    }

    #[test]
    fn test_font_id_from_stem() {
        assert_eq!(font_id_from_stem("SourceHanSerifCN-Bold"), "sourcehanserifcn_bold");
        assert_eq!(font_id_from_stem(""), "font");
    }

    #[test]
    fn test_synthetic_advance() {
        let face = SyntheticFace::universal("x");
        assert_eq!(face.advance('a', 10.0), 5.0);
        assert_eq!(face.advance('\u{0E01}', 10.0), 0.0);
    }
}
