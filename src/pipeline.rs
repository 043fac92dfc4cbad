//! High-level translation driver.
//!
//! Runs the stages strictly in order over one IL document:
//! parse, scanned check, layout, paragraphs, styles and formulas, descent,
//! translation, typesetting, font registration and PDF emission.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::config::{TranslateResult, TranslationConfig, WatermarkOutputMode};
use crate::error::{Error, Result};
use crate::fontmap::FontMapper;
use crate::midend::{
    AddDebugInformation, DetectScannedFile, LayoutParser, ParagraphFinder, RemoveDescent,
    StylesAndFormulas, Typesetting,
};
use crate::model::Document;
use crate::parser::{open_input, ParseOptions, PdfParser};
use crate::render::{to_json, to_xml, JsonFormat, PdfCreator, RenderedFiles};
use crate::translator::{ILTranslator, TranslationEngine};

/// Translate the configured PDF and write the requested outputs.
///
/// Emits the `finish` or `error` progress event before returning.
pub fn translate(config: &TranslationConfig) -> Result<TranslateResult> {
    let started = Instant::now();
    let outcome = prepare(config).and_then(|config| run(&config, started));
    match &outcome {
        Ok(result) => {
            log::info!("{}", result);
            config.progress.translate_done(result.to_string());
        }
        Err(e) => {
            if e.is_cancelled() {
                log::info!("translation of {} cancelled", config.input_file.display());
            } else {
                log::error!("translation of {} failed: {}", config.input_file.display(), e);
            }
            config.progress.translate_error(e);
        }
    }
    outcome
}

/// Validate the configuration and fill in the font mapper and working dir.
pub fn prepare(config: &TranslationConfig) -> Result<TranslationConfig> {
    config.validate()?;
    let mut config = config.clone();
    config.font_mapper = Some(resolve_font_mapper(&config)?);

    if config.debug {
        let dir = config
            .working_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("pdftranslate-{}", Uuid::new_v4())));
        fs::create_dir_all(&dir)?;
        log::info!("debug artifacts go to {}", dir.display());
        config.working_dir = Some(dir);
    }
    fs::create_dir_all(&config.output_dir)?;
    Ok(config)
}

fn resolve_font_mapper(config: &TranslationConfig) -> Result<Arc<FontMapper>> {
    if let Some(mapper) = &config.font_mapper {
        return Ok(Arc::clone(mapper));
    }
    let dir = config
        .font_dir
        .as_deref()
        .ok_or_else(|| Error::Config("no substitute fonts: set a font directory or a font mapper".into()))?;
    let mapper = FontMapper::from_dir(dir)?;
    if mapper.base().is_none() {
        log::warn!("no base font in {}, watermark and debug labels are dropped", dir.display());
    }
    Ok(Arc::new(mapper))
}

fn font_mapper(config: &TranslationConfig) -> Result<Arc<FontMapper>> {
    config
        .font_mapper
        .clone()
        .ok_or_else(|| Error::Config("font mapper was not prepared".into()))
}

fn parse_options(config: &TranslationConfig) -> ParseOptions {
    ParseOptions::new()
        .with_pages(config.pages.clone())
        .with_page_limits(config.max_page_height, config.max_page_width)
}

/// Write `{name}.json` and `{name}.xml` into the working dir when debugging.
fn dump_il(config: &TranslationConfig, doc: &Document, name: &str) {
    let Some(dir) = config.working_dir.as_deref().filter(|_| config.debug) else {
        return;
    };
    if let Err(e) = write_il(dir, doc, name) {
        log::warn!("cannot write debug IL {}: {}", name, e);
    }
}

fn write_il(dir: &Path, doc: &Document, name: &str) -> Result<()> {
    fs::write(dir.join(format!("{}.json", name)), to_json(doc, JsonFormat::Pretty)?)?;
    fs::write(dir.join(format!("{}.xml", name)), to_xml(doc)?)?;
    Ok(())
}

/// Run every stage up to and including translation.
pub fn build_translated_il(config: &TranslationConfig, parser: &PdfParser) -> Result<Document> {
    let mapper = font_mapper(config)?;

    let mut doc = parser.parse_il(&config.progress)?;
    dump_il(config, &doc, "create_il");

    DetectScannedFile::new(config).process(&mut doc)?;
    LayoutParser::new(config).process(&mut doc)?;
    ParagraphFinder::from_config(config).process(&mut doc, config)?;
    dump_il(config, &doc, "paragraph_finder");

    StylesAndFormulas::new(config, Some(Arc::clone(&mapper)))?.process(&mut doc, config)?;
    RemoveDescent::process(&mut doc, config)?;
    dump_il(config, &doc, "styles_and_formulas");

    let engine = TranslationEngine::from_config(config)?;
    ILTranslator::new(&engine, config)
        .with_font_mapper(mapper)
        .translate(&mut doc)?;
    dump_il(config, &doc, "il_translated");

    AddDebugInformation::process(&mut doc, config)?;
    Ok(doc)
}

/// Typeset a copy-ready IL and write its PDFs.
fn emit(
    config: &TranslationConfig,
    mut doc: Document,
    parser: &PdfParser,
    watermarked: bool,
) -> Result<RenderedFiles> {
    let mapper = font_mapper(config)?;
    let mut config = config.clone();
    config.watermark_output_mode = if watermarked {
        WatermarkOutputMode::Watermarked
    } else {
        WatermarkOutputMode::NoWatermark
    };

    Typesetting::new(&config, Arc::clone(&mapper)).typeset_document(&mut doc)?;
    mapper.add_fonts(&mut doc, &config.progress)?;
    dump_il(
        &config,
        &doc,
        if watermarked { "typesetting" } else { "typesetting.no_watermark" },
    );
    PdfCreator::new(&config, mapper).write(&doc, parser.raw_doc(), watermarked)
}

fn run(config: &TranslationConfig, started: Instant) -> Result<TranslateResult> {
    log::info!(
        "translating {} from {} to {} with {}",
        config.input_file.display(),
        config.lang_in,
        config.lang_out,
        config.translator.name()
    );
    let parser = open_input(&config.input_file, parse_options(config))?;
    let doc = build_translated_il(config, &parser)?;

    let mut result = TranslateResult::new(config.input_file.clone());
    match config.watermark_output_mode {
        WatermarkOutputMode::Watermarked => {
            let files = emit(config, doc, &parser, true)?;
            result.mono_pdf_path = files.mono;
            result.dual_pdf_path = files.dual;
        }
        WatermarkOutputMode::NoWatermark => {
            let files = emit(config, doc, &parser, false)?;
            result.mono_pdf_path = files.mono.clone();
            result.dual_pdf_path = files.dual.clone();
            result.no_watermark_mono_pdf_path = files.mono;
            result.no_watermark_dual_pdf_path = files.dual;
        }
        WatermarkOutputMode::Both => {
            let plain = emit(config, doc.clone(), &parser, false)?;
            let marked = emit(config, doc, &parser, true)?;
            result.mono_pdf_path = marked.mono;
            result.dual_pdf_path = marked.dual;
            result.no_watermark_mono_pdf_path = plain.mono;
            result.no_watermark_dual_pdf_path = plain.dual;
        }
    }

    result.total_seconds = started.elapsed().as_secs_f64();
    Ok(result)
}

/// Parse `path` into the IL without translating it.
pub fn parse_il(path: impl AsRef<Path>, config: &TranslationConfig) -> Result<Document> {
    let parser = open_input(path.as_ref(), parse_options(config))?;
    parser.parse_il(&config.progress)
}
