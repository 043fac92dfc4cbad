use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::TranslationConfig;
use crate::error::Result;
use crate::progress::CancellationToken;

use super::{RateLimiter, TranslationCache, Translator};

/// A [`Translator`] behind the cache and the rate limiter, with call counts.
pub struct TranslationEngine {
    translator: Arc<dyn Translator>,
    cache: Option<TranslationCache>,
    limiter: Arc<RateLimiter>,
    cancel: CancellationToken,
    call_count: AtomicUsize,
    cache_hit_count: AtomicUsize,
}

impl TranslationEngine {
    pub fn new(
        translator: Arc<dyn Translator>,
        cache: Option<TranslationCache>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            translator,
            cache,
            limiter,
            cancel: CancellationToken::new(),
            call_count: AtomicUsize::new(0),
            cache_hit_count: AtomicUsize::new(0),
        }
    }

    /// Engine for one run: cache at `cache_path` (in memory when unset),
    /// unless caching is disabled, and a limiter at the configured QPS.
    pub fn from_config(config: &TranslationConfig) -> Result<Self> {
        let cache = if config.ignore_cache {
            None
        } else {
            let mut params = BTreeMap::new();
            params.insert("lang_in".to_string(), config.lang_in.clone().into());
            params.insert("lang_out".to_string(), config.lang_out.clone().into());
            params.extend(config.translator.cache_impact_parameters());
            Some(TranslationCache::open(
                config.cache_path.as_deref(),
                config.translator.name(),
                &params,
            )?)
        };
        Ok(Self::new(
            Arc::clone(&config.translator),
            cache,
            Arc::new(RateLimiter::new(config.qps)),
        )
        .with_cancellation(config.progress.cancellation().clone()))
    }

    /// Stop issuing requests once `token` is cancelled, including callers
    /// already queued in the rate limiter.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn translator(&self) -> &dyn Translator {
        self.translator.as_ref()
    }

    pub fn name(&self) -> &str {
        self.translator.name()
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn cache_hit_count(&self) -> usize {
        self.cache_hit_count.load(Ordering::Relaxed)
    }

    /// Translate through the cache; only misses count against the rate limit.
    /// Fails with `Error::Cancelled` instead of calling the translator once
    /// the run is cancelled.
    pub fn translate(&self, text: &str) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Some(cache) = &self.cache {
            match cache.get(text) {
                Ok(Some(hit)) => {
                    self.cache_hit_count.fetch_add(1, Ordering::Relaxed);
                    return Ok(hit);
                }
                Ok(None) => {}
                Err(e) => log::warn!("translation cache lookup failed: {}", e),
            }
        }

        self.limiter.wait_cancellable(&self.cancel)?;
        let translation = self.translator.translate(text)?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(text, &translation) {
                log::warn!("translation cache write failed: {}", e);
            }
        }
        Ok(translation)
    }
}

impl Drop for TranslationEngine {
    fn drop(&mut self) {
        log::info!("{} translate call count: {}", self.name(), self.call_count());
        log::info!(
            "{} translate cache call count: {}",
            self.name(),
            self.cache_hit_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    struct Upper {
        seen: Mutex<Vec<String>>,
    }

    impl Translator for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn translate(&self, text: &str) -> Result<String> {
            self.seen.lock().unwrap().push(text.to_string());
            if text.is_empty() {
                return Err(Error::Translation("empty input".into()));
            }
            Ok(text.to_uppercase())
        }
    }

    #[test]
    fn test_second_call_hits_cache() {
        let upper = Arc::new(Upper {
            seen: Mutex::new(Vec::new()),
        });
        let cache = TranslationCache::open(None, "upper", &BTreeMap::new()).unwrap();
        let engine = TranslationEngine::new(upper.clone(), Some(cache), Arc::new(RateLimiter::new(10)));

        assert_eq!(engine.translate("abc").unwrap(), "ABC");
        assert_eq!(engine.translate("abc").unwrap(), "ABC");
        assert_eq!(engine.call_count(), 2);
        assert_eq!(engine.cache_hit_count(), 1);
        assert_eq!(upper.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let upper = Arc::new(Upper {
            seen: Mutex::new(Vec::new()),
        });
        let engine = TranslationEngine::new(upper.clone(), None, Arc::new(RateLimiter::new(10)));
        assert!(engine.translate("").is_err());
        assert!(engine.translate("").is_err());
        assert_eq!(upper.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_cancelled_engine_skips_translator() {
        let upper = Arc::new(Upper {
            seen: Mutex::new(Vec::new()),
        });
        let cancel = CancellationToken::new();
        let engine = TranslationEngine::new(upper.clone(), None, Arc::new(RateLimiter::new(10)))
            .with_cancellation(cancel.clone());

        assert_eq!(engine.translate("a").unwrap(), "A");
        cancel.cancel();
        assert!(engine.translate("b").unwrap_err().is_cancelled());
        assert_eq!(*upper.seen.lock().unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn test_from_config_respects_ignore_cache() {
        let config = TranslationConfig::new("in.pdf", "en", "zh", Arc::new(super::super::EchoTranslator))
            .with_ignore_cache(true);
        let engine = TranslationEngine::from_config(&config).unwrap();
        engine.translate("a").unwrap();
        engine.translate("a").unwrap();
        assert_eq!(engine.cache_hit_count(), 0);
    }
}
