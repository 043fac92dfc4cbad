//! # pdftranslate
//!
//! Layout-preserving PDF translation.
//!
//! A PDF is parsed into an intermediate representation (the IL), grouped into
//! paragraphs and formulas, translated paragraph by paragraph through a
//! pluggable [`Translator`], retypeset into the original boxes and written
//! back as a monolingual and a bilingual PDF.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use pdftranslate::{translate, EchoTranslator, TranslationConfig};
//!
//! fn main() -> pdftranslate::Result<()> {
//!     let config = TranslationConfig::new("paper.pdf", "en", "zh", Arc::new(EchoTranslator))
//!         .with_font_dir("fonts")
//!         .with_output_dir("out");
//!     let result = translate(&config)?;
//!     println!("{}", result);
//!     Ok(())
//! }
//! ```
//!
//! ## Stages
//!
//! - **parser**: content-stream interpretation into pages, fonts and characters
//! - **midend**: scanned check, layout regions, paragraphs, formulas, typesetting
//! - **translator**: placeholders, cache, rate limiting, parallel paragraph translation
//! - **render**: PDF re-emission, bilingual documents, IL as JSON or XML

pub mod config;
pub mod detect;
pub mod error;
pub mod fontmap;
pub mod midend;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod translator;

// Re-export commonly used types
pub use config::{
    PageSelection, PageSpan, Thresholds, TranslateResult, TranslationConfig, WatermarkOutputMode,
};
pub use detect::{detect_format_from_bytes, detect_format_from_path, is_pdf, PdfFormat};
pub use error::{Error, Result};
pub use fontmap::{FontMapper, FontRole, FontTraits, GlyphSource, SyntheticFace, TtfGlyphSource};
pub use model::{
    Composition, Document, GraphicState, Page, PdfCharacter, PdfFont, PdfFormula, PdfLine,
    PdfParagraph, PdfSameStyleCharacters, PdfSameStyleUnicodeCharacters, PdfStyle, Rect,
};
pub use parser::{ParseOptions, PdfParser};
pub use pipeline::{parse_il, translate};
pub use progress::{CancellationToken, ProgressEvent, ProgressMonitor};
pub use render::{from_json, from_xml, to_json, to_xml, JsonFormat};
pub use translator::{EchoTranslator, RateLimiter, TranslationCache, TranslationEngine, Translator};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
