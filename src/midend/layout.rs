//! Page layout detection.
//!
//! The detector itself is pluggable: a [`LayoutModel`] receives page images
//! and returns pixel-space boxes, which are converted to crop-box-relative
//! PDF coordinates here. Without a real model every page is treated as one
//! `plain text` region.

use image::RgbImage;

use crate::config::TranslationConfig;
use crate::error::{Error, Result};
use crate::model::{Document, Page, PageLayout, Rect};
use crate::progress::STAGE_LAYOUT;

use super::debug_info::{debug_label, debug_rectangle, GREEN};

/// A rendered page, or just its pixel size when nothing was rendered.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_number: u32,
    pub width: u32,
    pub height: u32,
    pub pixels: Option<RgbImage>,
}

impl PageImage {
    /// A blank image matching the page's crop box at 72 dpi.
    pub fn blank(page: &Page) -> Self {
        let (w, h) = page.dimensions();
        Self {
            page_number: page.page_number,
            width: w.abs().round().max(1.0) as u32,
            height: h.abs().round().max(1.0) as u32,
            pixels: None,
        }
    }

    pub fn from_rgb(page_number: u32, pixels: RgbImage) -> Self {
        Self {
            page_number,
            width: pixels.width(),
            height: pixels.height(),
            pixels: Some(pixels),
        }
    }

    /// Grayscale view used by similarity checks.
    pub fn to_luma(&self) -> Option<image::GrayImage> {
        self.pixels
            .as_ref()
            .map(|p| image::DynamicImage::ImageRgb8(p.clone()).to_luma8())
    }
}

/// One detected region in image pixel coordinates (y pointing down).
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDetection {
    /// `[x0, y0, x1, y1]` with `(x0, y0)` the top-left corner
    pub bbox: [f32; 4],
    pub class_name: String,
    pub conf: f32,
}

impl LayoutDetection {
    pub fn new(bbox: [f32; 4], class_name: impl Into<String>, conf: f32) -> Self {
        Self {
            bbox,
            class_name: class_name.into(),
            conf,
        }
    }
}

/// Document layout detector.
pub trait LayoutModel: Send + Sync {
    fn name(&self) -> &str;

    /// Pages handed to one `predict` call.
    fn batch_size(&self) -> usize {
        8
    }

    /// Detect regions, one result list per input image.
    fn predict(&self, images: &[PageImage]) -> Result<Vec<Vec<LayoutDetection>>>;

    /// Whether the model needs real pixels rather than page sizes.
    fn needs_pixels(&self) -> bool {
        true
    }
}

/// Renders pages of the source document to images.
pub trait PageRasterizer: Send + Sync {
    /// Render the page as it appears in the source.
    fn render(&self, page: &Page) -> Result<PageImage>;

    /// Render the page with its content replaced by the IL's reconstructed
    /// drawing stream.
    fn render_reconstructed(&self, page: &Page) -> Result<PageImage>;
}

/// Labels every page as a single `plain text` region.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullPageLayoutModel;

impl LayoutModel for FullPageLayoutModel {
    fn name(&self) -> &str {
        "full-page"
    }

    fn predict(&self, images: &[PageImage]) -> Result<Vec<Vec<LayoutDetection>>> {
        Ok(images
            .iter()
            .map(|img| {
                vec![LayoutDetection::new(
                    [0.0, 0.0, img.width as f32, img.height as f32],
                    "plain text",
                    1.0,
                )]
            })
            .collect())
    }

    fn needs_pixels(&self) -> bool {
        false
    }
}

/// Convert a pixel-space detection to a PDF-space box on `page`.
///
/// The box is flipped vertically, grown by one pixel on each side, clamped
/// to the image and then scaled from image size to crop-box size.
pub fn detection_to_pdf(det: &LayoutDetection, image: &PageImage, page: &Page) -> Rect {
    let w = image.width as f32;
    let h = image.height as f32;
    let [x0, y0, x1, y1] = det.bbox;
    let clamp_x = |v: f32| v.trunc().clamp(0.0, (w - 1.0).max(0.0));
    let clamp_y = |v: f32| v.trunc().clamp(0.0, (h - 1.0).max(0.0));
    let (px0, py0, px1, py1) = (
        clamp_x(x0 - 1.0),
        clamp_y(h - y1 - 1.0),
        clamp_x(x1 + 1.0),
        clamp_y(h - y0 + 1.0),
    );
    let (page_w, page_h) = page.dimensions();
    let sx = page_w / w;
    let sy = page_h / h;
    Rect::new(px0 * sx, py0 * sy, px1 * sx, py1 * sy)
}

/// Fills `page_layout` on every page from the configured model.
pub struct LayoutParser<'a> {
    config: &'a TranslationConfig,
}

impl<'a> LayoutParser<'a> {
    pub fn new(config: &'a TranslationConfig) -> Self {
        Self { config }
    }

    fn page_image(&self, model: &dyn LayoutModel, page: &Page) -> Result<PageImage> {
        match &self.config.rasterizer {
            Some(r) if model.needs_pixels() => r.render(page),
            _ => Ok(PageImage::blank(page)),
        }
    }

    pub fn process(&self, document: &mut Document) -> Result<()> {
        let fallback = FullPageLayoutModel;
        let model: &dyn LayoutModel = match &self.config.layout_model {
            Some(m) => m.as_ref(),
            None => &fallback,
        };
        if model.needs_pixels() && self.config.rasterizer.is_none() {
            return Err(Error::Config(format!(
                "layout model {} needs a page rasterizer",
                model.name()
            )));
        }

        let stage = self
            .config
            .progress
            .stage_start(STAGE_LAYOUT, document.page.len());
        let batch = model.batch_size().max(1);
        for pages in document.page.chunks_mut(batch) {
            self.config.raise_if_cancelled()?;
            let images = pages
                .iter()
                .map(|p| self.page_image(model, p))
                .collect::<Result<Vec<_>>>()?;
            let detections = model.predict(&images)?;
            if detections.len() != images.len() {
                return Err(Error::Layout(format!(
                    "{} returned {} results for {} pages",
                    model.name(),
                    detections.len(),
                    images.len()
                )));
            }
            for ((page, image), dets) in pages.iter_mut().zip(&images).zip(detections) {
                page.page_layout = dets
                    .iter()
                    .enumerate()
                    .map(|(i, det)| PageLayout {
                        bbox: detection_to_pdf(det, image, page),
                        id: i as u32 + 1,
                        conf: det.conf,
                        class_name: det.class_name.clone(),
                    })
                    .collect();
                log::debug!(
                    "page {}: {} layout regions",
                    page.page_number,
                    page.page_layout.len()
                );
                if self.config.debug {
                    add_debug_boxes(page);
                }
                stage.advance(1);
            }
        }
        Ok(())
    }
}

fn add_debug_boxes(page: &mut Page) {
    for layout in &page.page_layout {
        page.pdf_rectangle.push(debug_rectangle(layout.bbox, GREEN));
        page.pdf_paragraph
            .push(debug_label(&layout.class_name, GREEN, layout.bbox));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(w: f32, h: f32) -> Page {
        let mut p = Page::new(0);
        p.cropbox = Rect::new(0.0, 0.0, w, h);
        p
    }

    #[test]
    fn test_detection_flips_and_clamps() {
        let p = page(100.0, 200.0);
        let img = PageImage::blank(&p);
        let det = LayoutDetection::new([10.0, 20.0, 50.0, 60.0], "title", 0.9);
        assert_eq!(detection_to_pdf(&det, &img, &p), Rect::new(9.0, 139.0, 51.0, 181.0));

        let full = LayoutDetection::new([0.0, 0.0, 100.0, 200.0], "plain text", 1.0);
        assert_eq!(detection_to_pdf(&full, &img, &p), Rect::new(0.0, 0.0, 99.0, 199.0));
    }

    #[test]
    fn test_detection_scales_to_page() {
        let p = page(100.0, 100.0);
        let img = PageImage {
            page_number: 0,
            width: 200,
            height: 200,
            pixels: None,
        };
        let det = LayoutDetection::new([41.0, 41.0, 79.0, 79.0], "title", 0.9);
        assert_eq!(detection_to_pdf(&det, &img, &p), Rect::new(20.0, 60.0, 40.0, 80.0));
    }

    #[test]
    fn test_full_page_model_without_rasterizer() {
        let mut doc = Document::new(1);
        doc.page.push(page(612.0, 792.0));
        let config = crate::config::TranslationConfig::new(
            "in.pdf",
            "en",
            "zh",
            std::sync::Arc::new(crate::translator::EchoTranslator),
        )
        .with_debug(true);
        LayoutParser::new(&config).process(&mut doc).unwrap();
        let layouts = &doc.page[0].page_layout;
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].id, 1);
        assert_eq!(layouts[0].class_name, "plain text");
        assert_eq!(doc.page[0].pdf_rectangle.len(), 1);
        assert_eq!(doc.page[0].pdf_paragraph[0].unicode, "plain text");
    }
}
