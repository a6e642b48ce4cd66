//! Locale tables and fallback lookup.
//!
//! Lookup order for a message id: the requested locale, its language ("fr-ca" -> "fr"), the
//! default locale, then the default locale's language. The first hit wins; misses return the
//! message id unchanged.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use dbot_core::{consts, BotError, Localizer, Result};
use rand::seq::SliceRandom;
use serde_json::Value;
use tracing::{debug, error};

use crate::SYSTEM_STRINGS_EN;

/// Language part of a locale ("en-us" -> "en"); a locale without a region falls back to `default`.
pub fn fallback_locale<'a>(locale: &'a str, default: &'a str) -> &'a str {
    match locale.split_once('-') {
        Some((language, _)) => language,
        None => default,
    }
}

fn create_key(namespace: Option<&str>, msgid: &str) -> String {
    match namespace {
        Some(ns) => format!("{}{}{}", ns.to_lowercase(), consts::NAMESPACE_SEPARATOR, msgid),
        None => msgid.to_string(),
    }
}

pub struct DefaultLocalizer {
    locale_paths: Vec<PathBuf>,
    default_locale: String,
    tables: RwLock<HashMap<String, HashMap<String, Value>>>,
    loaded: RwLock<HashSet<String>>,
}

impl DefaultLocalizer {
    /// Creates a localizer over `locale_paths` (children before parents, as returned by
    /// `Library::locale_paths`).
    pub fn new(locale_paths: Vec<PathBuf>, default_locale: &str) -> Self {
        let localizer = Self {
            locale_paths,
            default_locale: default_locale.to_lowercase(),
            tables: RwLock::new(HashMap::new()),
            loaded: RwLock::new(HashSet::new()),
        };
        if let Err(e) = localizer.add_entries("en", Some(consts::library::SYSTEM), SYSTEM_STRINGS_EN) {
            error!(error = %e, "localizer: built-in system strings are invalid");
        }
        localizer
    }

    /// Locales consulted by `load(locale)`, most general first.
    fn load_order(&self, locale: &str) -> Vec<String> {
        let fb_default = fallback_locale(&self.default_locale, &self.default_locale);
        let fb_locale = fallback_locale(locale, &self.default_locale);
        let mut locales = vec!["en".to_string()];
        for candidate in [fb_default, self.default_locale.as_str(), fb_locale, locale] {
            if !locales.iter().any(|l| l == candidate) {
                locales.push(candidate.to_string());
            }
        }
        locales
    }

    /// Merges a JSON object of `msgid -> text | [texts]` into `locale`'s table.
    pub fn add_entries(&self, locale: &str, namespace: Option<&str>, json: &str) -> Result<usize> {
        let entries: serde_json::Map<String, Value> = serde_json::from_str(json)?;
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let table = tables.entry(locale.to_lowercase()).or_default();
        let count = entries.len();
        for (msgid, value) in entries {
            table.insert(create_key(namespace, &msgid), value);
        }
        Ok(count)
    }

    async fn load_locale(&self, locale: &str) -> Result<()> {
        if self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(locale)
        {
            return Ok(());
        }
        for path in &self.locale_paths {
            self.load_locale_path(locale, path).await?;
        }
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(locale.to_string());
        Ok(())
    }

    async fn load_locale_path(&self, locale: &str, path: &Path) -> Result<usize> {
        let dir = path.join(locale);
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(locale, dir = %dir.display(), "localizer.load: directory not found");
                return Ok(0);
            }
            Err(e) => {
                error!(locale, dir = %dir.display(), error = %e, "localizer.load failed");
                return Err(BotError::Localizer(format!("{}: {}", dir.display(), e)));
            }
        };

        let mut count = 0;
        while let Some(entry) = reader.next_entry().await? {
            let file = entry.path();
            let is_json = file
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if !is_json {
                continue;
            }
            let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let namespace = (stem != "index").then_some(stem);
            debug!(locale, file = %file.display(), "localizer.load: loading");
            // A broken file is logged and skipped; the rest of the locale still loads.
            let parsed = match tokio::fs::read_to_string(&file).await {
                Ok(text) => self.add_entries(locale, namespace, &text),
                Err(e) => Err(BotError::from(e)),
            };
            match parsed {
                Ok(n) => count += n,
                Err(e) => error!(locale, file = %file.display(), error = %e, "localizer.load: bad file"),
            }
        }
        Ok(count)
    }

    fn entry(&self, locale: &str, key: &str) -> Option<String> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables.get(locale).and_then(|t| t.get(key)).and_then(pick_value)
    }

    /// Localized text, or `None` when no table has an entry for `msgid`.
    pub fn try_gettext(&self, locale: &str, msgid: &str, namespace: Option<&str>) -> Option<String> {
        let locale = if locale.is_empty() {
            self.default_locale.clone()
        } else {
            locale.to_lowercase()
        };
        let fb_default = fallback_locale(&self.default_locale, &self.default_locale);
        let fb_locale = fallback_locale(&locale, &self.default_locale);
        let key = create_key(namespace, msgid);

        let mut tried = Vec::with_capacity(4);
        for candidate in [locale.as_str(), fb_locale, self.default_locale.as_str(), fb_default] {
            if tried.contains(&candidate) {
                continue;
            }
            tried.push(candidate);
            if let Some(text) = self.entry(candidate, &key) {
                return Some(text);
            }
        }
        None
    }
}

/// Strings are returned as-is; arrays yield a random element (recursively).
fn pick_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items
            .choose(&mut rand::thread_rng())
            .and_then(pick_value),
        _ => None,
    }
}

#[async_trait]
impl Localizer for DefaultLocalizer {
    async fn load(&self, locale: &str) -> Result<()> {
        let locale = if locale.is_empty() {
            self.default_locale.clone()
        } else {
            locale.to_lowercase()
        };
        debug!(locale = %locale, "localizer.load");
        for candidate in self.load_order(&locale) {
            self.load_locale(&candidate).await?;
        }
        Ok(())
    }

    fn gettext(&self, locale: &str, msgid: &str, namespace: Option<&str>) -> String {
        self.try_gettext(locale, msgid, namespace)
            .unwrap_or_else(|| msgid.to_string())
    }

    fn default_locale(&self) -> String {
        self.default_locale.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_locale() {
        assert_eq!(fallback_locale("fr-ca", "en"), "fr");
        assert_eq!(fallback_locale("fr", "en"), "en");
    }

    #[test]
    fn test_load_order_dedups() {
        let l = DefaultLocalizer::new(Vec::new(), "en-us");
        assert_eq!(l.load_order("fr-ca"), vec!["en", "en-us", "fr", "fr-ca"]);
        let l = DefaultLocalizer::new(Vec::new(), "en");
        assert_eq!(l.load_order("en"), vec!["en"]);
    }

    #[test]
    fn test_system_strings_builtin() {
        let l = DefaultLocalizer::new(Vec::new(), "en");
        assert_eq!(l.gettext("en", "confirm_yes", Some("BotBuilder")), "yes");
        assert_eq!(
            l.gettext("de", "default_error", Some("BotBuilder")),
            consts::DEFAULT_ERROR_MESSAGE
        );
    }

    #[test]
    fn test_array_values_pick_one() {
        let l = DefaultLocalizer::new(Vec::new(), "en");
        l.add_entries("en", None, r#"{"hi": ["Hello", "Hey"]}"#).unwrap();
        let text = l.gettext("en", "hi", None);
        assert!(text == "Hello" || text == "Hey");
    }
}
