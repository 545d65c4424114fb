//! Locale table
//!
//! The source CMS tags pages with short language codes (`en`, `de`, ...);
//! the target platform expects full locale tags (`en-GB`, `de-DE`, ...).
//! `LocaleMap` holds that mapping plus the canonical default on both sides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_SOURCE_LANGUAGE: &str = "en";
const DEFAULT_TARGET_LOCALE: &str = "en-GB";

/// Built-in language code → locale tag table
const BUILTIN_TABLE: &[(&str, &str)] = &[
    ("de", "de-DE"),
    ("en", "en-GB"),
    ("en-gb", "en-GB"),
    ("es", "es-ES"),
    ("fi", "fi-FI"),
    ("fr", "fr-FR"),
    ("it", "it-IT"),
    ("lv", "lv-LV"),
    ("nl", "nl-NL"),
    ("pl", "pl-PL"),
    ("ro", "ro-RO"),
    ("sl", "sl-SI"),
    ("sv", "sv-SE"),
];

/// Mapping from source language codes to target locale tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleMap {
    /// Language code of the canonical source pages
    #[serde(default = "default_source_language")]
    pub default_source: String,

    /// Locale tag that every default-language value is stored under
    #[serde(default = "default_target_locale")]
    pub default_target: String,

    /// Language code → locale tag
    #[serde(default = "builtin_table")]
    pub map: BTreeMap<String, String>,
}

fn default_source_language() -> String {
    DEFAULT_SOURCE_LANGUAGE.to_string()
}

fn default_target_locale() -> String {
    DEFAULT_TARGET_LOCALE.to_string()
}

fn builtin_table() -> BTreeMap<String, String> {
    BUILTIN_TABLE
        .iter()
        .map(|(code, tag)| (code.to_string(), tag.to_string()))
        .collect()
}

impl Default for LocaleMap {
    fn default() -> Self {
        Self {
            default_source: default_source_language(),
            default_target: default_target_locale(),
            map: builtin_table(),
        }
    }
}

impl LocaleMap {
    /// Target locale tag for a source language code
    ///
    /// Lookup is case-insensitive on the source code.
    pub fn target_for(&self, language_code: &str) -> Option<&str> {
        self.map
            .get(language_code)
            .or_else(|| self.map.get(&language_code.to_ascii_lowercase()))
            .map(String::as_str)
    }

    /// Canonical target locale (every default-language value lands here)
    pub fn default_target(&self) -> &str {
        &self.default_target
    }

    /// Canonical source language code
    pub fn default_source(&self) -> &str {
        &self.default_source
    }

    /// Every distinct target locale tag known to the table
    pub fn target_locales(&self) -> Vec<&str> {
        let mut locales: Vec<&str> = self.map.values().map(String::as_str).collect();
        locales.sort_unstable();
        locales.dedup();
        locales
    }
}
