//! The IL of a parsed PDF survives both serialized forms.

mod common;

use std::sync::Arc;

use common::{build_pdf_pages, synthetic_mapper, write_pdf, BODY};
use pdftranslate::midend::{LayoutParser, ParagraphFinder};
use pdftranslate::{
    from_json, from_xml, parse_il, to_json, to_xml, EchoTranslator, JsonFormat, PageSelection,
    TranslationConfig,
};

fn config(input: &std::path::Path) -> TranslationConfig {
    TranslationConfig::new(input, "en", "zh", Arc::new(EchoTranslator))
        .with_font_mapper(synthetic_mapper())
}

#[test]
fn test_parsed_il_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_pdf(dir.path(), "paper.pdf", BODY);
    let config = config(&input);
    let mut doc = parse_il(&input, &config).unwrap();
    LayoutParser::new(&config).process(&mut doc).unwrap();
    ParagraphFinder::from_config(&config)
        .process(&mut doc, &config)
        .unwrap();
    assert!(doc.paragraph_count() >= 1);

    for format in [JsonFormat::Pretty, JsonFormat::Compact] {
        assert_eq!(from_json(&to_json(&doc, format).unwrap()).unwrap(), doc);
    }
    assert_eq!(from_xml(&to_xml(&doc).unwrap()).unwrap(), doc);
}

#[test]
fn test_page_selection_limits_il() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("three.pdf");
    std::fs::write(&input, build_pdf_pages(&[BODY, BODY, BODY])).unwrap();
    let config = config(&input).with_pages(PageSelection::parse("1,3").unwrap());

    let doc = parse_il(&input, &config).unwrap();

    assert_eq!(doc.total_pages, 3);
    let numbers: Vec<u32> = doc.page.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, vec![0, 2]);
    let text: String = doc.page[1]
        .pdf_character
        .iter()
        .map(|c| c.char_unicode.as_str())
        .collect();
    assert!(text.starts_with("Hello world"), "{}", text);
}
