//! Translation engines and the paragraph translation layer.
//!
//! A [`Translator`] turns one string into another and decides how inline
//! placeholders look. [`TranslationEngine`] wraps it with the persistent
//! cache and the global rate limiter; [`ILTranslator`] drives it over every
//! paragraph of a document.

mod cache;
mod engine;
mod il_translator;
mod rate_limiter;

use std::collections::BTreeMap;

use crate::error::Result;

pub use cache::TranslationCache;
pub use engine::TranslationEngine;
pub use il_translator::{
    get_translate_input, parse_translate_output, ILTranslator, Placeholder, TranslateInput,
};
pub use rate_limiter::RateLimiter;

/// Cache table rows key engines by at most this many characters.
pub const MAX_ENGINE_NAME_LEN: usize = 20;

/// A text translation backend.
pub trait Translator: Send + Sync {
    /// Short engine name, also part of the cache key.
    fn name(&self) -> &str;

    /// Translate one paragraph of plain text with inline placeholders.
    fn translate(&self, text: &str) -> Result<String>;

    /// Parameters that change the output and therefore the cache key.
    fn cache_impact_parameters(&self) -> BTreeMap<String, serde_json::Value> {
        BTreeMap::new()
    }

    fn rich_text_left_placeholder(&self, id: u32) -> String {
        format!("<b{}>", id)
    }

    fn rich_text_right_placeholder(&self, id: u32) -> String {
        format!("</b{}>", id)
    }

    fn formula_placeholder(&self, id: u32) -> String {
        self.rich_text_left_placeholder(id)
    }
}

/// Returns its input unchanged. Used for dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoTranslator;

impl Translator for EchoTranslator {
    fn name(&self) -> &str {
        "echo"
    }

    fn translate(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_placeholders() {
        let t = EchoTranslator;
        assert_eq!(t.rich_text_left_placeholder(3), "<b3>");
        assert_eq!(t.rich_text_right_placeholder(3), "</b3>");
        assert_eq!(t.formula_placeholder(7), "<b7>");
        assert_eq!(t.translate("x + y").unwrap(), "x + y");
    }
}
