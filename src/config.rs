//! Translation configuration, page selection and run results.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fontmap::FontMapper;
use crate::midend::layout::{LayoutModel, PageRasterizer};
use crate::progress::ProgressMonitor;
use crate::translator::Translator;

/// Default font-name pattern for math fonts.
pub const DEFAULT_FORMULA_FONT_PATTERN: &str = r"(CM[^RB]|(MS|XY|MT|BL|RM|EU|LA|RS)[A-Z]|LINE|LCIRCLE|TeX-|rsfs|txsy|wasy|stmary|.*Mono|.*Code|.*Ital|.*Sym|.*Math)";

/// Font names that match the math pattern but hold regular text.
pub const FORMULA_FONT_EXCLUSION_PATTERN: &str =
    r"^(Cambria|Cambria-BoldItalic|Cambria-Bold|Cambria-Italic|EUAlbertina.+|NimbusRomNo9L.+|GlosaMath.+)$";

/// One `start-end` span of a page selection, 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    pub start: u32,
    /// `None` for an open end
    pub end: Option<u32>,
}

impl PageSpan {
    pub fn contains(&self, page: u32) -> bool {
        page >= self.start && self.end.map_or(true, |end| page <= end)
    }
}

/// Page selection for a translation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PageSelection {
    /// Translate all pages
    #[default]
    All,
    /// Translate the listed spans (1-indexed)
    Spans(Vec<PageSpan>),
}

impl PageSelection {
    /// Check if a 1-based page number should be included.
    pub fn includes(&self, page: u32) -> bool {
        match self {
            PageSelection::All => true,
            PageSelection::Spans(spans) => spans.iter().any(|s| s.contains(page)),
        }
    }

    /// Parse a page selection string (e.g. `"1,2,4-7,-3"` or `"5-"`).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }

        let invalid = || Error::InvalidPageRange(s.to_string());
        let number = |part: &str| -> Result<u32> {
            match part.trim().parse::<u32>() {
                Ok(n) if n > 0 => Ok(n),
                _ => Err(invalid()),
            }
        };

        let mut spans = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(invalid());
            }
            let span = match part.split_once('-') {
                Some((start, end)) => {
                    let start = if start.trim().is_empty() { 1 } else { number(start)? };
                    let end = if end.trim().is_empty() { None } else { Some(number(end)?) };
                    if start == 1 && end.is_none() && part.trim() == "-" {
                        return Err(invalid());
                    }
                    if end.is_some_and(|end| end < start) {
                        return Err(invalid());
                    }
                    PageSpan { start, end }
                }
                None => {
                    let page = number(part)?;
                    PageSpan {
                        start: page,
                        end: Some(page),
                    }
                }
            };
            spans.push(span);
        }
        Ok(PageSelection::Spans(spans))
    }
}

impl FromStr for PageSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Which output variants carry the watermark notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkOutputMode {
    #[default]
    Watermarked,
    NoWatermark,
    Both,
}

impl FromStr for WatermarkOutputMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "watermarked" => Ok(Self::Watermarked),
            "no_watermark" => Ok(Self::NoWatermark),
            "both" => Ok(Self::Both),
            other => Err(Error::Config(format!("unknown watermark mode: {}", other))),
        }
    }
}

impl fmt::Display for WatermarkOutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Watermarked => "watermarked",
            Self::NoWatermark => "no_watermark",
            Self::Both => "both",
        };
        f.write_str(s)
    }
}

/// Empirical thresholds used by the segmenter and the translation layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// A char smaller than this ratio of the previous one enters corner-mark state
    pub corner_mark_enter: f32,
    /// While in corner-mark state, chars below this ratio stay in it
    pub corner_mark_stay: f32,
    /// Lower bound of the size ratio treated as "same style except size"
    pub size_ratio_min: f32,
    /// Upper bound of the size ratio treated as "same style except size"
    pub size_ratio_max: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            corner_mark_enter: 0.79,
            corner_mark_stay: 1.1,
            size_ratio_min: 0.7,
            size_ratio_max: 1.3,
        }
    }
}

/// Everything one translation run needs.
#[derive(Clone)]
pub struct TranslationConfig {
    pub input_file: PathBuf,
    pub lang_in: String,
    pub lang_out: String,
    pub translator: Arc<dyn Translator>,
    pub layout_model: Option<Arc<dyn LayoutModel>>,
    pub rasterizer: Option<Arc<dyn PageRasterizer>>,
    /// Substitute fonts; loaded from `font_dir` when unset
    pub font_mapper: Option<Arc<FontMapper>>,
    pub font_dir: Option<PathBuf>,
    pub pages: PageSelection,
    pub output_dir: PathBuf,
    /// Scratch directory; a temporary one is created when unset
    pub working_dir: Option<PathBuf>,
    pub debug: bool,
    pub no_mono: bool,
    pub no_dual: bool,
    pub formular_font_pattern: Option<String>,
    pub formular_char_pattern: Option<String>,
    pub qps: usize,
    pub split_short_lines: bool,
    pub short_line_split_factor: f32,
    pub skip_clean: bool,
    pub dual_translate_first: bool,
    pub disable_rich_text_translate: bool,
    pub enhance_compatibility: bool,
    pub min_text_length: usize,
    pub use_alternating_pages_dual: bool,
    pub watermark_output_mode: WatermarkOutputMode,
    pub max_page_height: f32,
    pub max_page_width: f32,
    pub subset_timeout: Duration,
    pub save_timeout: Duration,
    pub thresholds: Thresholds,
    /// SQLite cache location; in-memory when unset
    pub cache_path: Option<PathBuf>,
    pub ignore_cache: bool,
    pub progress: Arc<ProgressMonitor>,
}

impl TranslationConfig {
    /// Create a configuration with defaults for everything but the essentials.
    pub fn new(
        input_file: impl Into<PathBuf>,
        lang_in: impl Into<String>,
        lang_out: impl Into<String>,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            input_file: input_file.into(),
            lang_in: lang_in.into(),
            lang_out: lang_out.into(),
            translator,
            layout_model: None,
            rasterizer: None,
            font_mapper: None,
            font_dir: None,
            pages: PageSelection::All,
            output_dir: PathBuf::from("."),
            working_dir: None,
            debug: false,
            no_mono: false,
            no_dual: false,
            formular_font_pattern: None,
            formular_char_pattern: None,
            qps: 4,
            split_short_lines: false,
            short_line_split_factor: 0.8,
            skip_clean: false,
            dual_translate_first: false,
            disable_rich_text_translate: false,
            enhance_compatibility: false,
            min_text_length: 5,
            use_alternating_pages_dual: false,
            watermark_output_mode: WatermarkOutputMode::Watermarked,
            max_page_height: crate::parser::DEFAULT_MAX_PAGE_HEIGHT,
            max_page_width: crate::parser::DEFAULT_MAX_PAGE_WIDTH,
            subset_timeout: Duration::from_secs(60),
            save_timeout: Duration::from_secs(120),
            thresholds: Thresholds::default(),
            cache_path: None,
            ignore_cache: false,
            progress: Arc::new(ProgressMonitor::for_translation()),
        }
    }

    pub fn with_layout_model(mut self, model: Arc<dyn LayoutModel>) -> Self {
        self.layout_model = Some(model);
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    pub fn with_font_mapper(mut self, mapper: Arc<FontMapper>) -> Self {
        self.font_mapper = Some(mapper);
        self
    }

    pub fn with_font_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.font_dir = Some(dir.into());
        self
    }

    pub fn with_pages(mut self, pages: PageSelection) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Choose which PDFs are written.
    pub fn with_outputs(mut self, mono: bool, dual: bool) -> Self {
        self.no_mono = !mono;
        self.no_dual = !dual;
        self
    }

    pub fn with_formula_font_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.formular_font_pattern = Some(pattern.into());
        self
    }

    pub fn with_formula_char_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.formular_char_pattern = Some(pattern.into());
        self
    }

    pub fn with_qps(mut self, qps: usize) -> Self {
        self.qps = qps.max(1);
        self
    }

    pub fn with_short_line_split(mut self, enabled: bool, factor: f32) -> Self {
        self.split_short_lines = enabled;
        self.short_line_split_factor = factor;
        self
    }

    pub fn with_skip_clean(mut self, skip: bool) -> Self {
        self.skip_clean = skip;
        self
    }

    pub fn with_dual_translate_first(mut self, first: bool) -> Self {
        self.dual_translate_first = first;
        self
    }

    pub fn with_rich_text_disabled(mut self, disabled: bool) -> Self {
        self.disable_rich_text_translate = disabled;
        self
    }

    /// Compatibility mode implies skip_clean, dual_translate_first and plain-text translation.
    pub fn with_enhance_compatibility(mut self, enabled: bool) -> Self {
        self.enhance_compatibility = enabled;
        if enabled {
            self.skip_clean = true;
            self.dual_translate_first = true;
            self.disable_rich_text_translate = true;
        }
        self
    }

    pub fn with_min_text_length(mut self, len: usize) -> Self {
        self.min_text_length = len;
        self
    }

    pub fn with_alternating_pages_dual(mut self, alternating: bool) -> Self {
        self.use_alternating_pages_dual = alternating;
        self
    }

    pub fn with_watermark_mode(mut self, mode: WatermarkOutputMode) -> Self {
        self.watermark_output_mode = mode;
        self
    }

    pub fn with_page_limits(mut self, max_height: f32, max_width: f32) -> Self {
        self.max_page_height = max_height;
        self.max_page_width = max_width;
        self
    }

    pub fn with_timeouts(mut self, subset: Duration, save: Duration) -> Self {
        self.subset_timeout = subset;
        self.save_timeout = save;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    pub fn with_ignore_cache(mut self, ignore: bool) -> Self {
        self.ignore_cache = ignore;
        self
    }

    pub fn with_progress(mut self, progress: Arc<ProgressMonitor>) -> Self {
        self.progress = progress;
        self
    }

    /// Pool size for paragraph translation.
    pub fn pool_size(&self) -> usize {
        let qps = self.qps.max(1);
        (qps * 2).min(qps + 5)
    }

    /// Return `Err(Cancelled)` once cancellation was requested.
    pub fn raise_if_cancelled(&self) -> Result<()> {
        self.progress.raise_if_cancelled()
    }

    /// Reject configurations that cannot produce anything.
    pub fn validate(&self) -> Result<()> {
        if !self.input_file.is_file() {
            return Err(Error::Config(format!(
                "input file does not exist: {}",
                self.input_file.display()
            )));
        }
        if self.no_mono && self.no_dual {
            return Err(Error::Config("both mono and dual output are disabled".into()));
        }
        if self.layout_model.is_some() && self.rasterizer.is_none() {
            return Err(Error::Config(
                "a layout model needs a page rasterizer to supply page images".into(),
            ));
        }
        if self.font_mapper.is_none() && self.font_dir.is_none() {
            return Err(Error::Config(
                "no substitute fonts: set a font directory or a font mapper".into(),
            ));
        }
        for pattern in [&self.formular_font_pattern, &self.formular_char_pattern]
            .into_iter()
            .flatten()
        {
            regex::Regex::new(pattern)?;
        }
        Ok(())
    }

    /// Input file stem used to name outputs.
    pub fn input_stem(&self) -> String {
        self.input_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string())
    }

    /// `{stem}{.debug}{.no_watermark}.{lang_out}.{kind}.pdf` in the output directory.
    pub fn output_path(&self, kind: &str, watermarked: bool) -> PathBuf {
        let mut name = self.input_stem();
        if self.debug {
            name.push_str(".debug");
        }
        if !watermarked {
            name.push_str(".no_watermark");
        }
        name.push_str(&format!(".{}.{}.pdf", self.lang_out, kind));
        self.output_dir.join(name)
    }

    /// Path of a debug artifact in the working directory.
    pub fn working_file(&self, working_dir: &Path, name: &str) -> PathBuf {
        working_dir.join(name)
    }
}

impl fmt::Debug for TranslationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationConfig")
            .field("input_file", &self.input_file)
            .field("lang_in", &self.lang_in)
            .field("lang_out", &self.lang_out)
            .field("translator", &self.translator.name())
            .field("pages", &self.pages)
            .field("output_dir", &self.output_dir)
            .field("debug", &self.debug)
            .field("qps", &self.qps)
            .field("watermark_output_mode", &self.watermark_output_mode)
            .finish_non_exhaustive()
    }
}

/// Files produced by a translation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslateResult {
    pub original_pdf_path: PathBuf,
    pub total_seconds: f64,
    pub mono_pdf_path: Option<PathBuf>,
    pub dual_pdf_path: Option<PathBuf>,
    pub no_watermark_mono_pdf_path: Option<PathBuf>,
    pub no_watermark_dual_pdf_path: Option<PathBuf>,
}

impl TranslateResult {
    pub fn new(original_pdf_path: impl Into<PathBuf>) -> Self {
        Self {
            original_pdf_path: original_pdf_path.into(),
            ..Default::default()
        }
    }

    /// Whether any PDF was written.
    pub fn has_outputs(&self) -> bool {
        self.mono_pdf_path.is_some()
            || self.dual_pdf_path.is_some()
            || self.no_watermark_mono_pdf_path.is_some()
            || self.no_watermark_dual_pdf_path.is_some()
    }
}

impl fmt::Display for TranslateResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_outputs() {
            return f.write_str("No translation results available");
        }
        writeln!(f, "Translation results:")?;
        writeln!(f, "\tOriginal PDF: {}", self.original_pdf_path.display())?;
        writeln!(f, "\tTotal time: {:.2} seconds", self.total_seconds)?;

        let watermark_differs = self.no_watermark_mono_pdf_path != self.mono_pdf_path
            || self.no_watermark_dual_pdf_path != self.dual_pdf_path;
        if let Some(path) = &self.mono_pdf_path {
            writeln!(f, "\tMonolingual PDF: {}", path.display())?;
        }
        if let Some(path) = &self.dual_pdf_path {
            writeln!(f, "\tDual-language PDF: {}", path.display())?;
        }
        if watermark_differs {
            if let Some(path) = &self.no_watermark_mono_pdf_path {
                writeln!(f, "\tNo-watermark Monolingual PDF: {}", path.display())?;
            }
            if let Some(path) = &self.no_watermark_dual_pdf_path {
                writeln!(f, "\tNo-watermark Dual-language PDF: {}", path.display())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::EchoTranslator;

    #[test]
    fn test_page_selection_includes() {
        let all = PageSelection::All;
        assert!(all.includes(1));
        assert!(all.includes(100));

        let sel = PageSelection::parse("1,2,4-7,-3").unwrap();
        assert!(sel.includes(1));
        assert!(sel.includes(3));
        assert!(!sel.includes(8));
        assert!(sel.includes(5));

        let open = PageSelection::parse("5-").unwrap();
        assert!(!open.includes(4));
        assert!(open.includes(500));
    }

    #[test]
    fn test_page_selection_parse_errors() {
        assert!(matches!(PageSelection::parse("all"), Ok(PageSelection::All)));
        assert!(PageSelection::parse("a-3").is_err());
        assert!(PageSelection::parse("7-3").is_err());
        assert!(PageSelection::parse("0").is_err());
        assert!(PageSelection::parse("1,,2").is_err());
        assert!(matches!(
            "x".parse::<PageSelection>(),
            Err(Error::InvalidPageRange(_))
        ));
    }

    #[test]
    fn test_watermark_mode_strings() {
        assert_eq!(
            "no_watermark".parse::<WatermarkOutputMode>().unwrap(),
            WatermarkOutputMode::NoWatermark
        );
        assert_eq!(WatermarkOutputMode::Both.to_string(), "both");
        assert!("none".parse::<WatermarkOutputMode>().is_err());
    }

    #[test]
    fn test_output_naming_and_compat() {
        let config = TranslationConfig::new("/tmp/paper.pdf", "en", "zh", Arc::new(EchoTranslator))
            .with_output_dir("/out")
            .with_debug(true)
            .with_enhance_compatibility(true)
            .with_qps(10);
        assert_eq!(
            config.output_path("mono", false),
            PathBuf::from("/out/paper.debug.no_watermark.zh.mono.pdf")
        );
        assert!(config.skip_clean && config.dual_translate_first);
        assert!(config.disable_rich_text_translate);
        assert_eq!(config.pool_size(), 15);
    }

    #[test]
    fn test_result_display() {
        let empty = TranslateResult::new("a.pdf");
        assert_eq!(empty.to_string(), "No translation results available");

        let mut result = TranslateResult::new("a.pdf");
        result.total_seconds = 1.234;
        result.mono_pdf_path = Some("a.zh.mono.pdf".into());
        result.no_watermark_mono_pdf_path = Some("a.no_watermark.zh.mono.pdf".into());
        let text = result.to_string();
        assert!(text.contains("Total time: 1.23 seconds"));
        assert!(text.contains("\tMonolingual PDF: a.zh.mono.pdf"));
        assert!(text.contains("No-watermark Monolingual PDF"));
    }
}
