//! Typed, cached accessor over `<config-dir>/config.(yaml|yml)`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_yaml::Value;

use crate::error::{Error, Result};

/// A `{search, replace}` literal-substring rewrite applied to generated
/// action IDs (the `actions_naming` config key).
#[derive(Debug, Clone, serde::Deserialize)]
pub struct NamingRule {
    pub search: String,
    pub replace: String,
}

pub struct Config {
    root: Value,
    /// Memoized decodes, keyed by top-level key name. `None` records a
    /// decode error so repeated calls don't re-attempt.
    cache: Mutex<HashMap<String, CacheEntry>>,
}

enum CacheEntry {
    Ok(Value),
    Missing,
}

impl Config {
    /// `dir` is the config directory; the first file matching
    /// `^config\.(yaml|yml)$` is the source. Missing directory/file yields
    /// an empty config (all keys absent).
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let pattern = Regex::new(r"^config\.(yaml|yml)$").expect("static regex");
        let mut found: Option<PathBuf> = None;

        if dir.is_dir() {
            let mut entries: Vec<_> = std::fs::read_dir(dir)
                .map_err(|e| Error::ConfigError(format!("reading {}: {e}", dir.display())))?
                .filter_map(|e| e.ok())
                .collect();
            entries.sort_by_key(|e| e.file_name());
            for entry in entries {
                let name = entry.file_name();
                if let Some(name) = name.to_str() {
                    if pattern.is_match(name) {
                        found = Some(entry.path());
                        break;
                    }
                }
            }
        }

        let root = match found {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| Error::ConfigError(format!("reading {}: {e}", path.display())))?;
                serde_yaml::from_str(&content)
                    .map_err(|e| Error::ConfigError(format!("parsing {}: {e}", path.display())))?
            }
            None => Value::Mapping(Default::default()),
        };

        Ok(Self {
            root,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn empty() -> Self {
        Self {
            root: Value::Mapping(Default::default()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Decodes the top-level node named `name` into `T`. Absent keys return
    /// `Ok(None)`. On decode error, returns `Err` without mutating the
    /// caller's storage (callers pass an owned `Option<T>` back).
    pub fn get<T: DeserializeOwned + Clone + 'static>(&self, name: &str) -> Result<Option<T>> {
        {
            let cache = self.cache.lock().unwrap();
            match cache.get(name) {
                Some(CacheEntry::Ok(v)) => {
                    return serde_yaml::from_value(v.clone())
                        .map(Some)
                        .map_err(|e| Error::ConfigError(format!("decoding {name}: {e}")));
                }
                Some(CacheEntry::Missing) => return Ok(None),
                None => {}
            }
        }

        let node = self.root.get(name).cloned();
        let mut cache = self.cache.lock().unwrap();
        match node {
            Some(value) => {
                let decoded = serde_yaml::from_value(value.clone())
                    .map_err(|e| Error::ConfigError(format!("decoding {name}: {e}")))?;
                cache.insert(name.to_string(), CacheEntry::Ok(value));
                Ok(Some(decoded))
            }
            None => {
                cache.insert(name.to_string(), CacheEntry::Missing);
                Ok(None)
            }
        }
    }

    pub fn naming_rules(&self) -> Result<Vec<NamingRule>> {
        Ok(self.get::<Vec<NamingRule>>("actions_naming")?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn absent_key_returns_none_without_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "images:\n  foo: bar\n").unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        let v: Option<HashMap<String, String>> = cfg.get("missing_key").unwrap();
        assert!(v.is_none());
    }

    #[test]
    fn decodes_and_caches_a_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("config.yaml")).unwrap();
        writeln!(f, "actions_naming:\n  - search: \".\"\n    replace: \"/\"").unwrap();
        drop(f);
        let cfg = Config::load(dir.path()).unwrap();
        let rules = cfg.naming_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].search, ".");
        assert_eq!(rules[0].replace, "/");

        // second call hits the cache and still decodes correctly
        let rules2 = cfg.naming_rules().unwrap();
        assert_eq!(rules2.len(), 1);
    }

    #[test]
    fn missing_directory_yields_empty_config() {
        let cfg = Config::load("/no/such/dir").unwrap();
        let v: Option<Vec<NamingRule>> = cfg.get("actions_naming").unwrap();
        assert!(v.is_none());
    }
}
