//! Paragraph translation with inline placeholders.
//!
//! Formulas and differently styled runs are replaced by placeholder tokens
//! before a paragraph is sent to the engine, and mapped back to the original
//! compositions when the translation returns.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, OnceLock};

use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use crate::config::TranslationConfig;
use crate::error::{Error, Result};
use crate::fontmap::{FontMapper, FontTraits};
use crate::midend::helpers::{
    is_newline, is_same_style, is_same_style_except_font, is_same_style_except_size,
    space_gap_threshold,
};
use crate::model::{
    Composition, Document, PdfCharacter, PdfFont, PdfFormula, PdfParagraph,
    PdfSameStyleCharacters, PdfSameStyleUnicodeCharacters, PdfStyle,
};
use crate::progress::STAGE_TRANSLATE;

use super::TranslationEngine;

/// Above this many placeholders rich text is flattened and the input rebuilt.
const MAX_PLACEHOLDERS: usize = 50;

fn dotted_leader_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[. 。…]{20,}").unwrap())
}

/// A token standing in for content the translator must not touch.
#[derive(Debug, Clone, PartialEq)]
pub enum Placeholder {
    Formula {
        id: u32,
        formula: PdfFormula,
        token: String,
    },
    RichText {
        id: u32,
        composition: PdfSameStyleCharacters,
        left: String,
        right: String,
    },
}

impl Placeholder {
    fn tokens(&self) -> Vec<&str> {
        match self {
            Placeholder::Formula { token, .. } => vec![token.as_str()],
            Placeholder::RichText { left, right, .. } => vec![left.as_str(), right.as_str()],
        }
    }

    /// Pattern matching this placeholder in translated text.
    fn pattern(&self) -> String {
        match self {
            Placeholder::Formula { token, .. } => regex::escape(token),
            Placeholder::RichText { left, right, .. } => {
                format!("{}.*?{}", regex::escape(left), regex::escape(right))
            }
        }
    }
}

/// Text sent to the translator for one paragraph.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateInput {
    pub unicode: String,
    pub placeholders: Vec<Placeholder>,
    pub base_style: Option<PdfStyle>,
}

enum Piece<'a> {
    Char(&'a PdfCharacter),
    Token(String),
}

/// Join characters and placeholder tokens; spaces go after a character when
/// the next character starts a new line or sits past the gap threshold.
fn pieces_text(pieces: &[Piece<'_>]) -> String {
    let threshold = space_gap_threshold(pieces.windows(2).filter_map(|w| match w {
        [Piece::Char(a), Piece::Char(b)] => Some((*a, *b)),
        _ => None,
    }));

    let mut out = String::new();
    for (i, piece) in pieces.iter().enumerate() {
        let ch = match piece {
            Piece::Token(token) => {
                out.push_str(token);
                continue;
            }
            Piece::Char(ch) => ch,
        };
        out.push_str(&ch.char_unicode);
        if ch.char_unicode == " " {
            continue;
        }
        if let Some(Piece::Char(next)) = pieces.get(i + 1) {
            let distance = next.bbox.x - ch.bbox.x2;
            if distance >= threshold || is_newline(ch, next) {
                out.push(' ');
            }
        }
    }
    out
}

/// Fonts visible to a page and its XObjects, detached from the page.
#[derive(Debug, Default)]
struct FontScopes {
    page: Vec<PdfFont>,
    xobjects: HashMap<u32, Vec<PdfFont>>,
}

impl FontScopes {
    fn of(page: &crate::model::Page) -> Self {
        Self {
            page: page.pdf_font.clone(),
            xobjects: page
                .pdf_xobject
                .iter()
                .map(|x| (x.xobj_id, x.pdf_font.clone()))
                .collect(),
        }
    }

    fn find(&self, xobj_id: Option<u32>, font_id: &str) -> Option<&PdfFont> {
        xobj_id
            .and_then(|id| self.xobjects.get(&id))
            .and_then(|fonts| fonts.iter().find(|f| f.font_id == font_id))
            .or_else(|| self.page.iter().find(|f| f.font_id == font_id))
    }
}

#[derive(Debug, Default, Serialize)]
struct ParagraphTrack {
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    pdf_unicode: String,
}

#[derive(Debug, Default, Serialize)]
struct PageTrack {
    paragraph: Vec<ParagraphTrack>,
}

#[derive(Debug, Default, Serialize)]
struct DocumentTrack {
    page: Vec<PageTrack>,
}

/// Translates every paragraph of a document in place.
pub struct ILTranslator<'a> {
    engine: &'a TranslationEngine,
    config: &'a TranslationConfig,
    font_mapper: Option<Arc<FontMapper>>,
}

impl<'a> ILTranslator<'a> {
    pub fn new(engine: &'a TranslationEngine, config: &'a TranslationConfig) -> Self {
        Self {
            engine,
            config,
            font_mapper: config.font_mapper.clone(),
        }
    }

    pub fn with_font_mapper(mut self, mapper: Arc<FontMapper>) -> Self {
        self.font_mapper = Some(mapper);
        self
    }

    /// Translate all paragraphs on a worker pool sized from the QPS.
    ///
    /// Failures are logged per paragraph and leave it untranslated; only
    /// cancellation aborts the stage.
    pub fn translate(&self, doc: &mut Document) -> Result<()> {
        let total: usize = doc.page.iter().map(|p| p.pdf_paragraph.len()).sum();
        let progress = self.config.progress.stage_start(STAGE_TRANSLATE, total);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.pool_size())
            .build()
            .map_err(|e| Error::Translation(format!("cannot start translation pool: {}", e)))?;

        let mut tracker = DocumentTrack::default();
        for page in &mut doc.page {
            self.config.raise_if_cancelled()?;
            let scopes = FontScopes::of(page);
            let page_number = page.page_number;
            let mut tracks: Vec<ParagraphTrack> = page
                .pdf_paragraph
                .iter()
                .map(|p| ParagraphTrack {
                    pdf_unicode: p.unicode.clone(),
                    ..Default::default()
                })
                .collect();

            pool.install(|| {
                page.pdf_paragraph
                    .par_iter_mut()
                    .zip(tracks.par_iter_mut())
                    .for_each(|(paragraph, track)| {
                        if !self.config.progress.is_cancelled() {
                            match self.translate_paragraph(paragraph, &scopes, track) {
                                Ok(()) => {}
                                Err(e) if e.is_cancelled() => {}
                                Err(e) => log::warn!(
                                    "Error translating paragraph on page {}: {}",
                                    page_number,
                                    e
                                ),
                            }
                        }
                        progress.advance(1);
                    });
            });

            tracker.page.push(PageTrack { paragraph: tracks });
        }
        self.config.raise_if_cancelled()?;

        if self.config.debug {
            self.write_tracking(&tracker)?;
        }
        Ok(())
    }

    fn write_tracking(&self, tracker: &DocumentTrack) -> Result<()> {
        let Some(dir) = &self.config.working_dir else {
            return Ok(());
        };
        let path = self.config.working_file(dir, "translate_tracking.json");
        fs::write(&path, serde_json::to_string_pretty(tracker)?)?;
        log::debug!("Translate tracking written to {}", path.display());
        Ok(())
    }

    fn translate_paragraph(
        &self,
        paragraph: &mut PdfParagraph,
        scopes: &FontScopes,
        track: &mut ParagraphTrack,
    ) -> Result<()> {
        if paragraph.vertical {
            return Ok(());
        }
        let Some(input) = self.translate_input(paragraph, scopes) else {
            return Ok(());
        };
        if input.unicode.chars().count() < self.config.min_text_length {
            return Ok(());
        }
        track.input = Some(input.unicode.clone());

        let translated = self.engine.translate(&input.unicode)?;
        let translated: String = translated.nfc().collect();
        let translated = dotted_leader_regex().replace_all(&translated, ".").into_owned();
        track.output = Some(translated.clone());
        if translated == input.unicode {
            return Ok(());
        }

        let mut compositions = parse_translate_output(&input, &translated)?;
        for comp in &mut compositions {
            if let Composition::SameStyleUnicodeCharacters(u) = comp {
                if u.pdf_style.is_none() {
                    u.pdf_style = paragraph.pdf_style.clone();
                }
            }
        }
        paragraph.compositions = compositions;
        paragraph.unicode = translated;
        Ok(())
    }

    /// Build the input, falling back to flat text when rich text explodes
    /// into too many placeholders.
    fn translate_input(&self, paragraph: &PdfParagraph, scopes: &FontScopes) -> Option<TranslateInput> {
        let rich = !self.config.disable_rich_text_translate;
        let translator = self.engine.translator();
        let ratio = (
            self.config.thresholds.size_ratio_min,
            self.config.thresholds.size_ratio_max,
        );
        let same_font = |a: &PdfStyle, b: &PdfStyle| self.same_substitute_font(paragraph, scopes, a, b);
        let input = get_translate_input(paragraph, translator, rich, same_font, ratio)?;
        if rich && input.placeholders.len() > MAX_PLACEHOLDERS {
            log::warn!(
                "Too many placeholders ({}) in paragraph {}, disabling rich text translation",
                input.placeholders.len(),
                paragraph.debug_id.as_deref().unwrap_or("?")
            );
            return get_translate_input(paragraph, translator, false, |_, _| false, ratio);
        }
        Some(input)
    }

    /// Whether two original fonts would be drawn with the same substitute.
    fn same_substitute_font(
        &self,
        paragraph: &PdfParagraph,
        scopes: &FontScopes,
        a: &PdfStyle,
        b: &PdfStyle,
    ) -> bool {
        let Some(mapper) = &self.font_mapper else {
            return false;
        };
        let (Some(fa), Some(fb)) = (
            scopes.find(paragraph.xobj_id, &a.font_id),
            scopes.find(paragraph.xobj_id, &b.font_id),
        ) else {
            return false;
        };
        match (
            mapper.map(&FontTraits::of(fa), '1'),
            mapper.map(&FontTraits::of(fb), '1'),
        ) {
            (Some(ma), Some(mb)) => ma.font_id() == mb.font_id(),
            _ => false,
        }
    }
}

fn next_free_id(paragraph: &PdfParagraph, mut id: u32, tokens: impl Fn(u32) -> Vec<String>) -> u32 {
    while tokens(id).iter().any(|t| paragraph.unicode.contains(t.as_str())) {
        id += 1;
    }
    id
}

/// Text and placeholders for a paragraph, or `None` when there is nothing
/// the translator should see.
///
/// `same_font` decides whether two styles differing only in font still
/// render with one substitute font, in which case the run is inlined.
pub fn get_translate_input(
    paragraph: &PdfParagraph,
    translator: &dyn super::Translator,
    rich_text: bool,
    same_font: impl Fn(&PdfStyle, &PdfStyle) -> bool,
    size_ratio: (f32, f32),
) -> Option<TranslateInput> {
    let base_style = paragraph.pdf_style.clone();

    if let [only] = paragraph.compositions.as_slice() {
        return match only {
            Composition::Line(_) | Composition::SameStyleCharacters(_) | Composition::Character(_) => {
                Some(TranslateInput {
                    unicode: paragraph.unicode.clone(),
                    placeholders: Vec::new(),
                    base_style,
                })
            }
            Composition::Formula(_) | Composition::SameStyleUnicodeCharacters(_) => None,
        };
    }

    let mut placeholder_id = 1;
    let mut placeholders = Vec::new();
    let mut pieces: Vec<Piece<'_>> = Vec::new();

    for comp in &paragraph.compositions {
        match comp {
            Composition::Line(line) => pieces.extend(line.chars.iter().map(Piece::Char)),
            Composition::Character(ch) => pieces.push(Piece::Char(ch)),
            Composition::Formula(formula) => {
                let id = next_free_id(paragraph, placeholder_id, |id| vec![translator.formula_placeholder(id)]);
                let token = translator.formula_placeholder(id);
                pieces.push(Piece::Token(token.clone()));
                placeholders.push(Placeholder::Formula {
                    id,
                    formula: formula.clone(),
                    token,
                });
                placeholder_id = id + 1;
            }
            Composition::SameStyleCharacters(run) => {
                let style = Some(&run.pdf_style);
                let inline = !rich_text
                    || is_same_style(style, base_style.as_ref())
                    || is_same_style_except_size(style, base_style.as_ref(), size_ratio.0, size_ratio.1)
                    || (is_same_style_except_font(style, base_style.as_ref())
                        && base_style.as_ref().is_some_and(|base| same_font(&run.pdf_style, base)));
                if inline {
                    pieces.extend(run.chars.iter().map(Piece::Char));
                    continue;
                }
                let id = next_free_id(paragraph, placeholder_id, |id| {
                    vec![
                        translator.rich_text_left_placeholder(id),
                        translator.rich_text_right_placeholder(id),
                    ]
                });
                let left = translator.rich_text_left_placeholder(id);
                let right = translator.rich_text_right_placeholder(id);
                pieces.push(Piece::Token(left.clone()));
                pieces.extend(run.chars.iter().map(Piece::Char));
                pieces.push(Piece::Token(right.clone()));
                placeholders.push(Placeholder::RichText {
                    id,
                    composition: run.clone(),
                    left,
                    right,
                });
                placeholder_id = id + 2;
            }
            Composition::SameStyleUnicodeCharacters(_) => {
                log::error!("Unexpected unicode run in untranslated paragraph");
                return None;
            }
        }
    }

    Some(TranslateInput {
        unicode: pieces_text(&pieces),
        placeholders,
        base_style,
    })
}

/// Map a translation back onto compositions.
///
/// Text between placeholders becomes unicode runs in the base style; formula
/// tokens restore the original formula; a rich-text span whose inner text is
/// unchanged (ignoring spaces) restores the original run, otherwise its text
/// is restyled with the run's style.
pub fn parse_translate_output(input: &TranslateInput, output: &str) -> Result<Vec<Composition>> {
    let unicode_run = |style: Option<PdfStyle>, text: &str| {
        Composition::SameStyleUnicodeCharacters(PdfSameStyleUnicodeCharacters {
            pdf_style: style,
            unicode: text.to_string(),
            debug_info: false,
        })
    };

    if input.placeholders.is_empty() {
        return Ok(vec![unicode_run(input.base_style.clone(), output)]);
    }

    let combined = input
        .placeholders
        .iter()
        .map(Placeholder::pattern)
        .collect::<Vec<_>>()
        .join("|");
    let pattern = Regex::new(&format!("(?s){}", combined))
        .map_err(|e| Error::Translation(format!("bad placeholder pattern: {}", e)))?;
    let removal = input
        .placeholders
        .iter()
        .flat_map(Placeholder::tokens)
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    let removal = Regex::new(&removal)
        .map_err(|e| Error::Translation(format!("bad placeholder pattern: {}", e)))?;
    let strip = |text: &str| removal.replace_all(text, "").into_owned();

    let mut compositions = Vec::new();
    let mut last_end = 0;
    for m in pattern.find_iter(output) {
        let before = &output[last_end..m.start()];
        if !before.is_empty() {
            compositions.push(unicode_run(input.base_style.clone(), &strip(before)));
        }
        last_end = m.end();

        let matched = m.as_str();
        let placeholder = input.placeholders.iter().find(|p| match p {
            Placeholder::Formula { token, .. } => matched == token,
            Placeholder::RichText { left, right, .. } => {
                matched.starts_with(left.as_str()) && matched.ends_with(right.as_str())
            }
        });
        match placeholder {
            Some(Placeholder::Formula { formula, .. }) => {
                compositions.push(Composition::Formula(formula.clone()));
            }
            Some(Placeholder::RichText {
                composition,
                left,
                right,
                ..
            }) => {
                let inner = &matched[left.len()..matched.len() - right.len()];
                let original: String = composition
                    .chars
                    .iter()
                    .map(|c| c.char_unicode.as_str())
                    .collect::<String>()
                    .replace(' ', "");
                if inner.replace(' ', "") == original {
                    compositions.push(Composition::SameStyleCharacters(composition.clone()));
                } else {
                    compositions.push(unicode_run(Some(composition.pdf_style.clone()), &strip(inner)));
                }
            }
            None => compositions.push(unicode_run(input.base_style.clone(), &strip(matched))),
        }
    }

    let rest = &output[last_end..];
    if !rest.is_empty() {
        compositions.push(unicode_run(input.base_style.clone(), &strip(rest)));
    }
    Ok(compositions)
}
