//! End-to-end runs over small generated PDFs.

mod common;

use std::sync::{Arc, Mutex};

use common::{synthetic_mapper, write_pdf, BODY};
use pdftranslate::{
    parse_il, translate, EchoTranslator, Error, ProgressEvent, ProgressMonitor, TranslationConfig,
    WatermarkOutputMode,
};

fn config(input: &std::path::Path, out: &std::path::Path) -> TranslationConfig {
    TranslationConfig::new(input, "en", "zh", Arc::new(EchoTranslator))
        .with_font_mapper(synthetic_mapper())
        .with_output_dir(out)
}

#[test]
fn test_echo_translation_writes_mono_and_dual() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "paper.pdf", BODY);
    let out = dir.path().join("out");

    let result = translate(&config(&input, &out)).unwrap();

    let mono = result.mono_pdf_path.clone().unwrap();
    let dual = result.dual_pdf_path.clone().unwrap();
    assert_eq!(mono, out.join("paper.zh.mono.pdf"));
    assert_eq!(dual, out.join("paper.zh.dual.pdf"));
    assert!(result.no_watermark_mono_pdf_path.is_none());

    let mono_doc = lopdf::Document::load(&mono).unwrap();
    assert_eq!(mono_doc.get_pages().len(), 1);
    let dual_doc = lopdf::Document::load(&dual).unwrap();
    assert_eq!(dual_doc.get_pages().len(), 1);
}

#[test]
fn test_alternating_dual_doubles_pages() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "paper.pdf", BODY);
    let out = dir.path().join("out");
    let config = config(&input, &out)
        .with_outputs(false, true)
        .with_alternating_pages_dual(true)
        .with_watermark_mode(WatermarkOutputMode::NoWatermark);

    let result = translate(&config).unwrap();

    assert!(result.mono_pdf_path.is_none());
    let dual = result.no_watermark_dual_pdf_path.clone().unwrap();
    assert_eq!(dual, out.join("paper.no_watermark.zh.dual.pdf"));
    assert_eq!(lopdf::Document::load(&dual).unwrap().get_pages().len(), 2);
}

#[test]
fn test_both_watermark_modes_write_four_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "paper.pdf", BODY);
    let out = dir.path().join("out");
    let config = config(&input, &out).with_watermark_mode(WatermarkOutputMode::Both);

    let result = translate(&config).unwrap();

    for path in [
        &result.mono_pdf_path,
        &result.dual_pdf_path,
        &result.no_watermark_mono_pdf_path,
        &result.no_watermark_dual_pdf_path,
    ] {
        assert!(path.as_ref().unwrap().is_file());
    }
    assert_ne!(result.mono_pdf_path, result.no_watermark_mono_pdf_path);
}

#[test]
fn test_untranslated_text_is_redrawn_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "paper.pdf", BODY);
    let out = dir.path().join("out");
    // nothing is long enough to translate, so every character passes through
    let config = config(&input, &out)
        .with_min_text_length(10_000)
        .with_outputs(true, false)
        .with_watermark_mode(WatermarkOutputMode::NoWatermark);

    let before = parse_il(&input, &config).unwrap();
    let result = translate(&config).unwrap();
    let after = parse_il(result.mono_pdf_path.unwrap(), &config).unwrap();

    let chars = |doc: &pdftranslate::Document| {
        doc.page[0]
            .pdf_character
            .iter()
            .map(|c| (c.char_unicode.clone(), c.bbox))
            .collect::<Vec<_>>()
    };
    let (before, after) = (chars(&before), chars(&after));
    assert_eq!(before.len(), after.len());
    for ((text_a, box_a), (text_b, box_b)) in before.iter().zip(&after) {
        assert_eq!(text_a, text_b);
        assert!((box_a.x - box_b.x).abs() < 0.5, "{:?} vs {:?}", box_a, box_b);
        assert!((box_a.y - box_b.y).abs() < 0.5, "{:?} vs {:?}", box_a, box_b);
    }
}

#[test]
fn test_progress_events_end_with_finish() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "paper.pdf", BODY);
    let progress = Arc::new(ProgressMonitor::for_translation());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    progress.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    let config = config(&input, &dir.path().join("out")).with_progress(progress);
    translate(&config).unwrap();

    let events = events.lock().unwrap();
    assert!(matches!(events.first(), Some(ProgressEvent::StageSummary { .. })));
    assert!(matches!(events.last(), Some(ProgressEvent::Finish { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::ProgressEnd(s) if s.stage == "Translate Paragraphs")));
}

#[test]
fn test_cancelled_run_reports_error_event() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "paper.pdf", BODY);
    let progress = Arc::new(ProgressMonitor::for_translation());
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    progress.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    progress.cancel();

    let config = config(&input, &dir.path().join("out")).with_progress(progress);
    let err = translate(&config).unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    let events = events.lock().unwrap();
    assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
    assert!(!dir.path().join("out").join("paper.zh.mono.pdf").exists());
}

#[test]
fn test_debug_run_dumps_intermediate_il() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "paper.pdf", BODY);
    let work = dir.path().join("work");
    let config = config(&input, &dir.path().join("out"))
        .with_debug(true)
        .with_working_dir(&work);

    let result = translate(&config).unwrap();

    assert!(result
        .mono_pdf_path
        .unwrap()
        .ends_with("paper.debug.zh.mono.pdf"));
    for name in ["create_il", "paragraph_finder", "styles_and_formulas", "il_translated", "typesetting"] {
        assert!(work.join(format!("{}.json", name)).is_file(), "{}", name);
        assert!(work.join(format!("{}.xml", name)).is_file(), "{}", name);
    }
    let json = std::fs::read_to_string(work.join("paragraph_finder.json")).unwrap();
    let doc = pdftranslate::from_json(&json).unwrap();
    assert!(doc.paragraph_count() >= 1);
}
