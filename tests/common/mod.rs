#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document as LopdfDocument, Object, Stream};
use pdftranslate::{FontMapper, FontRole, SyntheticFace};

/// A text run placed with `Td`: x, y, font size, text.
pub type Run<'a> = (f32, f32, f32, &'a str);

/// One-page letter-size PDF drawing `runs` in Helvetica.
pub fn build_pdf(runs: &[Run<'_>]) -> Vec<u8> {
    build_pdf_pages(&[runs])
}

pub fn build_pdf_pages(pages: &[&[Run<'_>]]) -> Vec<u8> {
    let mut doc = LopdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for runs in pages {
        let mut operations = Vec::new();
        for (x, y, size, text) in runs.iter() {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), (*size).into()]));
            operations.push(Operation::new("Td", vec![(*x).into(), (*y).into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

pub fn write_pdf(dir: &Path, name: &str, runs: &[Run<'_>]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, build_pdf(runs)).unwrap();
    path
}

/// A mapper whose single synthetic face covers ASCII and CJK.
pub fn synthetic_mapper() -> Arc<FontMapper> {
    Arc::new(FontMapper::new().with_font(
        Arc::new(SyntheticFace::universal("noto")),
        &[FontRole::Normal, FontRole::Fallback, FontRole::Base],
    ))
}

pub const BODY: &[Run<'static>] = &[
    (72.0, 700.0, 12.0, "Hello world from a PDF page"),
    (72.0, 686.0, 12.0, "with a second line of text"),
];
