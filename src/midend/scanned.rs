//! Rejects documents that are mostly image scans without a text layer.
//!
//! Each sampled page is rendered as in the source and again with its content
//! replaced by the reconstructed stream. Born-digital pages look the same
//! both ways; scans do not, because the reconstruction drops the image.

use image::GrayImage;

use crate::config::TranslationConfig;
use crate::error::{Error, Result};
use crate::model::{Document, Page, Rect};
use crate::progress::STAGE_DETECT_SCANNED;

use super::debug_info::{debug_text_in, GREEN};
use super::layout::PageRasterizer;

/// Pages at or below this similarity count as scanned.
pub const SCANNED_SIMILARITY: f64 = 0.9;

const SSIM_WINDOW: u32 = 7;
const SSIM_C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const SSIM_C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

/// Mean structural similarity of two grayscale images over 7x7 windows.
///
/// Images of different sizes are compared over their common area; images
/// smaller than the window fall back to a single global window.
pub fn structural_similarity(a: &GrayImage, b: &GrayImage) -> f64 {
    let w = a.width().min(b.width());
    let h = a.height().min(b.height());
    if w == 0 || h == 0 {
        return 1.0;
    }
    let win_w = SSIM_WINDOW.min(w);
    let win_h = SSIM_WINDOW.min(h);

    let mut total = 0.0;
    let mut count = 0usize;
    for y0 in 0..=(h - win_h) {
        for x0 in 0..=(w - win_w) {
            total += window_ssim(a, b, x0, y0, win_w, win_h);
            count += 1;
        }
    }
    total / count as f64
}

fn window_ssim(a: &GrayImage, b: &GrayImage, x0: u32, y0: u32, ww: u32, wh: u32) -> f64 {
    let n = (ww * wh) as f64;
    let (mut sa, mut sb, mut saa, mut sbb, mut sab) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for y in y0..y0 + wh {
        for x in x0..x0 + ww {
            let va = a.get_pixel(x, y).0[0] as f64;
            let vb = b.get_pixel(x, y).0[0] as f64;
            sa += va;
            sb += vb;
            saa += va * va;
            sbb += vb * vb;
            sab += va * vb;
        }
    }
    let mu_a = sa / n;
    let mu_b = sb / n;
    // unbiased estimates
    let norm = if n > 1.0 { n / (n - 1.0) } else { 1.0 };
    let var_a = (saa / n - mu_a * mu_a) * norm;
    let var_b = (sbb / n - mu_b * mu_b) * norm;
    let cov = (sab / n - mu_a * mu_b) * norm;

    ((2.0 * mu_a * mu_b + SSIM_C1) * (2.0 * cov + SSIM_C2))
        / ((mu_a * mu_a + mu_b * mu_b + SSIM_C1) * (var_a + var_b + SSIM_C2))
}

/// Early-exit bookkeeping for the scanned-page vote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanVote {
    pub total: usize,
    pub threshold: f64,
    pub scanned: usize,
    pub non_scanned: usize,
}

impl ScanVote {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            threshold: (0.8 * total as f64).max(1.0),
            scanned: 0,
            non_scanned: 0,
        }
    }

    /// Whether another page still needs to be examined. The first page is
    /// always examined, even when a single page decides the vote.
    pub fn undecided(&self) -> bool {
        let examined = self.scanned + self.non_scanned;
        (self.scanned as f64) < self.threshold
            && (examined == 0 || (self.non_scanned as f64) < self.total as f64 - self.threshold)
    }

    pub fn record(&mut self, scanned: bool) {
        if scanned {
            self.scanned += 1;
        } else {
            self.non_scanned += 1;
        }
    }

    /// Reaching the threshold is what stops detection, so it also decides.
    pub fn is_scanned_document(&self) -> bool {
        self.scanned as f64 >= self.threshold
    }
}

/// Scanned-document guard.
pub struct DetectScannedFile<'a> {
    config: &'a TranslationConfig,
}

impl<'a> DetectScannedFile<'a> {
    pub fn new(config: &'a TranslationConfig) -> Self {
        Self { config }
    }

    /// Similarity between the source rendering and the reconstruction.
    pub fn page_similarity(rasterizer: &dyn PageRasterizer, page: &Page) -> Result<Option<f64>> {
        let before = rasterizer.render(page)?;
        let after = rasterizer.render_reconstructed(page)?;
        Ok(match (before.to_luma(), after.to_luma()) {
            (Some(a), Some(b)) => Some(structural_similarity(&a, &b)),
            _ => None,
        })
    }

    pub fn process(&self, document: &mut Document) -> Result<()> {
        let Some(rasterizer) = self.config.rasterizer.as_deref() else {
            log::debug!("no page rasterizer configured, skip scanned detection");
            return Ok(());
        };

        let total = document.page.len();
        let mut vote = ScanVote::new(total);
        let stage = self.config.progress.stage_start(STAGE_DETECT_SCANNED, total);
        for page in &mut document.page {
            self.config.raise_if_cancelled()?;
            if vote.undecided() {
                match Self::page_similarity(rasterizer, page) {
                    Ok(Some(similarity)) => {
                        vote.record(similarity <= SCANNED_SIMILARITY);
                        if self.config.debug {
                            add_score_label(page, similarity);
                        }
                    }
                    Ok(None) => vote.record(false),
                    Err(e) => {
                        log::warn!("page {}: cannot render for scan check: {}", page.page_number, e);
                        vote.record(false);
                    }
                }
            } else {
                vote.record(false);
            }
            stage.advance(1);
        }
        drop(stage);

        if vote.is_scanned_document() {
            log::warn!(
                "Detected {} scanned pages, which is more than 80% of the total pages. \
                 Please check the input PDF file.",
                vote.scanned
            );
            return Err(Error::ScannedPdf {
                scanned: vote.scanned,
                total,
            });
        }
        Ok(())
    }
}

fn add_score_label(page: &mut Page, similarity: f64) {
    let crop = page.cropbox;
    let (w, h) = (crop.width(), crop.height());
    let bbox = Rect::new(crop.x + w * 0.03, crop.y, crop.x2, crop.y2 - h * 0.03);
    page.pdf_paragraph.push(debug_text_in(
        &format!("scanned score: {:.2} %", similarity * 100.0),
        GREEN,
        bbox,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midend::layout::PageImage;
    use image::{Luma, Rgb, RgbImage};
    use std::sync::Arc;

    fn noise(w: u32, h: u32, seed: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            Luma([((x * 37 + y * 91 + seed * 13) % 251) as u8])
        })
    }

    #[test]
    fn test_identical_images_are_similar() {
        let a = noise(20, 20, 1);
        assert!((structural_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_different_images_are_dissimilar() {
        let a = noise(20, 20, 1);
        let blank = GrayImage::from_pixel(20, 20, Luma([255]));
        assert!(structural_similarity(&a, &blank) < 0.5);
    }

    #[test]
    fn test_vote_early_exit() {
        let mut vote = ScanVote::new(10);
        assert_eq!(vote.threshold, 8.0);
        for _ in 0..2 {
            assert!(vote.undecided());
            vote.record(false);
        }
        // 2 non-scanned pages are enough to rule the document out
        assert!(!vote.undecided());
        assert!(!vote.is_scanned_document());

        let mut single = ScanVote::new(1);
        assert_eq!(single.threshold, 1.0);
        assert!(single.undecided());
        single.record(true);
        assert!(!single.undecided());
        assert!(single.is_scanned_document());
    }

    struct ScanRasterizer {
        reconstructed_matches: bool,
    }

    impl PageRasterizer for ScanRasterizer {
        fn render(&self, page: &Page) -> Result<PageImage> {
            let img = RgbImage::from_fn(16, 16, |x, y| {
                let v = ((x * 31 + y * 17) % 256) as u8;
                Rgb([v, v, v])
            });
            Ok(PageImage::from_rgb(page.page_number, img))
        }

        fn render_reconstructed(&self, page: &Page) -> Result<PageImage> {
            if self.reconstructed_matches {
                return self.render(page);
            }
            Ok(PageImage::from_rgb(
                page.page_number,
                RgbImage::from_pixel(16, 16, Rgb([255, 255, 255])),
            ))
        }
    }

    fn config(matches: bool) -> TranslationConfig {
        TranslationConfig::new("in.pdf", "en", "zh", Arc::new(crate::translator::EchoTranslator))
            .with_rasterizer(Arc::new(ScanRasterizer {
                reconstructed_matches: matches,
            }))
    }

    fn document(pages: u32) -> Document {
        let mut doc = Document::new(pages);
        for i in 0..pages {
            let mut p = Page::new(i);
            p.cropbox = Rect::new(0.0, 0.0, 100.0, 100.0);
            doc.page.push(p);
        }
        doc
    }

    #[test]
    fn test_scanned_document_rejected() {
        let cfg = config(false);
        let mut doc = document(10);
        let err = DetectScannedFile::new(&cfg).process(&mut doc).unwrap_err();
        // detection stops once 8 of 10 pages were found scanned
        assert!(matches!(err, Error::ScannedPdf { scanned: 8, total: 10 }));
    }

    #[test]
    fn test_single_scanned_page_rejected() {
        let cfg = config(false);
        let mut doc = document(1);
        let err = DetectScannedFile::new(&cfg).process(&mut doc).unwrap_err();
        assert!(matches!(err, Error::ScannedPdf { scanned: 1, total: 1 }));
    }

    #[test]
    fn test_single_digital_page_accepted() {
        let cfg = config(true);
        let mut doc = document(1);
        DetectScannedFile::new(&cfg).process(&mut doc).unwrap();

        let mut vote = ScanVote::new(1);
        vote.record(false);
        assert!(!vote.undecided());
        assert!(!vote.is_scanned_document());
    }

    #[test]
    fn test_digital_document_accepted() {
        let cfg = config(true).with_debug(true);
        let mut doc = document(3);
        DetectScannedFile::new(&cfg).process(&mut doc).unwrap();
        assert!(doc.page[0].pdf_paragraph[0]
            .unicode
            .starts_with("scanned score: 100.00"));
    }
}
