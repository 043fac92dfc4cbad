use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};

use super::MAX_ENGINE_NAME_LEN;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS cache (
        id INTEGER PRIMARY KEY,
        engine TEXT NOT NULL,
        params TEXT NOT NULL,
        original_text TEXT NOT NULL,
        translation TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS idx_cache_key
        ON cache(engine, params, original_text);
"#;

/// Persistent translation cache keyed by engine, parameters and source text.
pub struct TranslationCache {
    conn: Mutex<Connection>,
    engine: String,
    params: String,
}

impl TranslationCache {
    /// Open (or create) the cache database at `path`; in memory when `None`.
    pub fn open(
        path: Option<&Path>,
        engine: &str,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Self> {
        let conn = match path {
            Some(p) => {
                if let Some(dir) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)?;
                }
                Connection::open(p)?
            }
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            engine: engine.chars().take(MAX_ENGINE_NAME_LEN).collect(),
            // BTreeMap serializes with sorted keys
            params: serde_json::to_string(params)?,
        })
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Canonical JSON of the cache-impact parameters.
    pub fn params(&self) -> &str {
        &self.params
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("translation cache lock poisoned".into()))
    }

    pub fn get(&self, original_text: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let translation = conn
            .query_row(
                "SELECT translation FROM cache
                 WHERE engine = ?1 AND params = ?2 AND original_text = ?3",
                params![self.engine, self.params, original_text],
                |row| row.get(0),
            )
            .optional()?;
        Ok(translation)
    }

    pub fn set(&self, original_text: &str, translation: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cache (engine, params, original_text, translation)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(engine, params, original_text)
             DO UPDATE SET translation = excluded.translation",
            params![self.engine, self.params, original_text, translation],
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for TranslationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationCache")
            .field("engine", &self.engine)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn params(lang_out: &str) -> BTreeMap<String, serde_json::Value> {
        let mut p = BTreeMap::new();
        p.insert("lang_out".to_string(), json!(lang_out));
        p.insert("lang_in".to_string(), json!("en"));
        p
    }

    #[test]
    fn test_get_set_in_memory() {
        let cache = TranslationCache::open(None, "echo", &params("zh")).unwrap();
        assert_eq!(cache.params(), r#"{"lang_in":"en","lang_out":"zh"}"#);
        assert_eq!(cache.get("hello").unwrap(), None);
        cache.set("hello", "你好").unwrap();
        assert_eq!(cache.get("hello").unwrap().as_deref(), Some("你好"));
        cache.set("hello", "您好").unwrap();
        assert_eq!(cache.get("hello").unwrap().as_deref(), Some("您好"));
    }

    #[test]
    fn test_persisted_and_keyed_by_params() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache").join("translations.db");
        {
            let cache = TranslationCache::open(Some(&path), "engine", &params("zh")).unwrap();
            cache.set("cat", "猫").unwrap();
        }
        let same = TranslationCache::open(Some(&path), "engine", &params("zh")).unwrap();
        assert_eq!(same.get("cat").unwrap().as_deref(), Some("猫"));
        let other = TranslationCache::open(Some(&path), "engine", &params("ja")).unwrap();
        assert_eq!(other.get("cat").unwrap(), None);
    }

    #[test]
    fn test_engine_name_truncated() {
        let cache = TranslationCache::open(None, "a-very-long-engine-name-indeed", &BTreeMap::new()).unwrap();
        assert_eq!(cache.engine().chars().count(), MAX_ENGINE_NAME_LEN);
    }
}
