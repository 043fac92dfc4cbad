//! Page-level driver that turns a PDF into the IL document.

use std::path::Path;

use lopdf::Document as LopdfDocument;

use crate::detect::detect_format_from_path;
use crate::error::{Error, Result};
use crate::model::{Document, Rect};
use crate::progress::{ProgressMonitor, STAGE_PARSE_PDF};

use super::backend::{LopdfBackend, PdfBackend};
use super::builder::ILBuilder;
use super::interpreter::{page_ctm, Interpreter};
use super::options::ParseOptions;

/// PDF document parser.
pub struct PdfParser {
    backend: LopdfBackend,
    options: ParseOptions,
}

impl PdfParser {
    /// Open a PDF file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, ParseOptions::default())
    }

    /// Open a PDF file with custom options.
    pub fn open_with_options<P: AsRef<Path>>(path: P, options: ParseOptions) -> Result<Self> {
        let path = path.as_ref();

        // Verify it's a PDF
        detect_format_from_path(path)?;

        let backend = LopdfBackend::load_file(path)?;
        Ok(Self { backend, options })
    }

    /// Parse a PDF from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with_options(data, ParseOptions::default())
    }

    /// Parse a PDF from bytes with custom options.
    pub fn from_bytes_with_options(data: &[u8], options: ParseOptions) -> Result<Self> {
        let backend = LopdfBackend::load_bytes(data)?;
        Ok(Self { backend, options })
    }

    /// Wrap an already loaded document.
    pub fn from_document(doc: LopdfDocument, options: ParseOptions) -> Result<Self> {
        Ok(Self {
            backend: LopdfBackend::from_document(doc)?,
            options,
        })
    }

    /// Number of pages in the source document.
    pub fn page_count(&self) -> u32 {
        self.backend.pages().len() as u32
    }

    /// Get PDF version string.
    pub fn version(&self) -> String {
        self.backend.version()
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Borrow the source document, e.g. to start the output from it.
    pub fn raw_doc(&self) -> &LopdfDocument {
        self.backend.raw_doc()
    }

    /// Take back the source document.
    pub fn into_document(self) -> LopdfDocument {
        self.backend.into_inner()
    }

    /// Interpret every selected page into an IL document.
    ///
    /// Pages that are too large or cannot be interpreted are skipped with a
    /// warning; only cancellation escapes as an error.
    pub fn parse_il(&self, progress: &ProgressMonitor) -> Result<Document> {
        let pages = self.backend.pages();
        let total_pages = pages.len() as u32;
        let selected: Vec<_> = pages
            .iter()
            .filter(|(number, _)| self.options.pages.includes(**number))
            .collect();

        let mut builder = ILBuilder::new(self.options.pages.clone());
        builder.on_total_pages(total_pages);

        let stage = progress.stage_start(STAGE_PARSE_PDF, selected.len());
        for (page_num, page_id) in selected {
            progress.raise_if_cancelled()?;
            let page_num = *page_num;

            let info = match self.backend.page_info(*page_id) {
                Ok(info) => info,
                Err(e) => {
                    log::warn!("page {}: unreadable page dictionary, skip: {}", page_num, e);
                    stage.advance(1);
                    continue;
                }
            };
            if self
                .options
                .is_oversized(info.crop_box.width(), info.crop_box.height())
            {
                log::warn!("page {} is too large, skip", page_num);
                stage.advance(1);
                continue;
            }

            builder.on_page_start(page_num - 1);
            builder.on_page_crop_box(info.crop_box);
            let ctm = page_ctm(&info);
            let media = info.crop_box.transform(&ctm);
            builder.on_page_media_box(Rect::new(0.0, 0.0, media.width().abs(), media.height().abs()));

            let result = Interpreter::new(&self.backend, &mut builder, &self.options)
                .process_page(*page_id, &info);
            match result {
                Ok(base_operations) => {
                    builder.on_page_base_operation(base_operations);
                    builder.on_page_end();
                }
                Err(e) => {
                    log::warn!("page {}: failed to interpret content, skip: {}", page_num, e);
                    builder.abandon_page();
                }
            }
            stage.advance(1);
        }
        drop(stage);

        let document = builder.create_il();
        log::info!(
            "Parsed {} of {} pages into the IL",
            document.page_count(),
            total_pages
        );
        Ok(document)
    }
}

/// Open `path`, reporting a missing or non-PDF file as a configuration error.
pub fn open_input(path: &Path, options: ParseOptions) -> Result<PdfParser> {
    if !path.is_file() {
        return Err(Error::Config(format!(
            "input file does not exist: {}",
            path.display()
        )));
    }
    PdfParser::open_with_options(path, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageSelection;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn build_pdf(pages: &[(f32, f32)]) -> Vec<u8> {
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
        for (w, h) in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal("Hi")]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), (*w).into(), (*h).into()],
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

    #[test]
    fn test_parse_il_skips_oversized_pages() {
        let data = build_pdf(&[(612.0, 792.0), (612.0, 1500.0)]);
        let parser = PdfParser::from_bytes(&data).unwrap();
        let progress = ProgressMonitor::for_translation();
        let doc = parser.parse_il(&progress).unwrap();

        assert_eq!(doc.total_pages, 2);
        assert_eq!(doc.page_count(), 1);
        let page = &doc.page[0];
        assert_eq!(page.page_number, 0);
        assert_eq!(page.mediabox, Rect::new(0.0, 0.0, 612.0, 792.0));
        let text: String = page.pdf_character.iter().map(|c| c.char_unicode.as_str()).collect();
        assert_eq!(text, "Hi");
        assert!(!page.pdf_font.is_empty());
    }

    #[test]
    fn test_parse_il_respects_selection() {
        let data = build_pdf(&[(612.0, 792.0), (612.0, 792.0), (612.0, 792.0)]);
        let options = ParseOptions::new().with_pages(PageSelection::parse("2-").unwrap());
        let parser = PdfParser::from_bytes_with_options(&data, options).unwrap();
        let doc = parser
            .parse_il(&ProgressMonitor::for_translation())
            .unwrap();
        let numbers: Vec<u32> = doc.page.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_parse_il_cancelled() {
        let data = build_pdf(&[(612.0, 792.0)]);
        let parser = PdfParser::from_bytes(&data).unwrap();
        let progress = ProgressMonitor::for_translation();
        progress.cancel();
        assert!(parser.parse_il(&progress).unwrap_err().is_cancelled());
    }
}
