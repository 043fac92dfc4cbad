//! Benchmarks for the midend stages.
//!
//! Run with: cargo bench

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use pdftranslate::midend::{ParagraphFinder, Typesetting};
use pdftranslate::model::PageLayout;
use pdftranslate::{
    Composition, Document, EchoTranslator, FontMapper, FontRole, GraphicState, Page, PdfCharacter,
    PdfFont, PdfParagraph, PdfSameStyleUnicodeCharacters, PdfStyle, Rect, SyntheticFace,
    TranslationConfig, WatermarkOutputMode,
};

fn style() -> PdfStyle {
    PdfStyle::new("F1", 10.0, GraphicState::default())
}

/// A page of `rows` lines of 80 characters inside one text region.
fn character_page(rows: usize) -> Page {
    let mut page = Page::new(0);
    page.cropbox = Rect::new(0.0, 0.0, 612.0, 792.0);
    page.page_layout.push(PageLayout {
        bbox: Rect::new(0.0, 0.0, 612.0, 792.0),
        id: 1,
        conf: 1.0,
        class_name: "plain text".to_string(),
    });
    for row in 0..rows {
        let y = 750.0 - 12.0 * row as f32;
        for col in 0..80 {
            let x = 40.0 + 6.0 * col as f32;
            let text = if col % 7 == 6 { " " } else { "a" };
            page.pdf_character.push(
                PdfCharacter::new(text, Rect::new(x, y, x + 6.0, y + 10.0), style()).with_code(97),
            );
        }
    }
    page
}

/// A page holding one translated paragraph of `len` CJK characters.
fn translated_page(len: usize) -> Document {
    let mut page = Page::new(0);
    page.cropbox = Rect::new(0.0, 0.0, 612.0, 792.0);
    page.pdf_font.push(PdfFont::new("F1", "Times-Roman"));
    page.pdf_paragraph.push(PdfParagraph {
        bbox: Rect::new(72.0, 400.0, 540.0, 500.0),
        pdf_style: Some(style()),
        compositions: vec![Composition::SameStyleUnicodeCharacters(
            PdfSameStyleUnicodeCharacters {
                pdf_style: Some(style()),
                unicode: "排版基准测试".repeat(len / 6),
                debug_info: false,
            },
        )],
        ..Default::default()
    });
    let mut doc = Document::new(1);
    doc.page.push(page);
    doc
}

fn bench_paragraph_finder(c: &mut Criterion) {
    let finder = ParagraphFinder::new(false, 0.8);
    let mut group = c.benchmark_group("paragraph_finder");
    for rows in [10, 50] {
        let page = character_page(rows);
        group.bench_function(format!("{}_rows", rows), |b| {
            b.iter_batched(
                || page.clone(),
                |mut page| finder.process_page(black_box(&mut page)),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_typesetting(c: &mut Criterion) {
    let config = TranslationConfig::new("in.pdf", "en", "zh", Arc::new(EchoTranslator))
        .with_watermark_mode(WatermarkOutputMode::NoWatermark);
    let mapper = Arc::new(FontMapper::new().with_font(
        Arc::new(SyntheticFace::universal("noto")),
        &[FontRole::Normal, FontRole::Fallback, FontRole::Base],
    ));
    let typesetting = Typesetting::new(&config, mapper);

    let mut group = c.benchmark_group("typesetting");
    // 600 characters fit at full scale, 6000 force the scale search
    for len in [600, 6000] {
        let doc = translated_page(len);
        group.bench_function(format!("{}_chars", len), |b| {
            b.iter_batched(
                || doc.clone(),
                |mut doc| typesetting.typeset_document(black_box(&mut doc)),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_il_json(c: &mut Criterion) {
    let mut doc = Document::new(1);
    let mut page = character_page(50);
    ParagraphFinder::new(false, 0.8).process_page(&mut page);
    doc.page.push(page);

    c.bench_function("il_to_json", |b| {
        b.iter(|| pdftranslate::to_json(black_box(&doc), pdftranslate::JsonFormat::Compact).unwrap());
    });
}

criterion_group!(benches, bench_paragraph_finder, bench_typesetting, bench_il_json);
criterion_main!(benches);
