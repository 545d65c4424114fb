//! Per-locale values
//!
//! Every field of a target entry is a `LocalizedValue`: one value per locale
//! tag. A locale without a value is an absent key, never a key holding an
//! empty string, so "unset" and "empty" are the same thing downstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::LocaleMap;

/// Values that can be "falsy" (empty string, empty list, JSON null)
pub trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Blank for &str {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<T> Blank for Vec<T> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Blank for DateTime<Utc> {
    fn is_blank(&self) -> bool {
        false
    }
}

impl Blank for serde_json::Value {
    fn is_blank(&self) -> bool {
        match self {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.is_empty(),
            serde_json::Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }
}

/// One value per locale tag
///
/// Keys are kept sorted, so mapping and serialization are deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedValue<T> {
    values: BTreeMap<String, T>,
}

impl<T> Default for LocalizedValue<T> {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }
}

impl<T> LocalizedValue<T> {
    /// Value with no locales at all
    pub fn empty() -> Self {
        Self::default()
    }

    /// Value stored for `locale`
    pub fn get(&self, locale: &str) -> Option<&T> {
        self.values.get(locale)
    }

    /// Locale tags present, in sorted order
    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// (locale, value) pairs, in sorted locale order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.values.iter().map(|(locale, value)| (locale.as_str(), value))
    }

    /// Number of locales present
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Drop the value for `locale`
    pub fn remove(&mut self, locale: &str) -> Option<T> {
        self.values.remove(locale)
    }

    /// Map every locale's value through `f`
    ///
    /// The key set is preserved exactly: no locale is dropped, added or
    /// reordered, even when `f` produces a blank value.
    pub fn map<U, F>(&self, mut f: F) -> LocalizedValue<U>
    where
        F: FnMut(&str, &T) -> U,
    {
        LocalizedValue {
            values: self
                .values
                .iter()
                .map(|(locale, value)| (locale.clone(), f(locale, value)))
                .collect(),
        }
    }
}

impl<T> LocalizedValue<Vec<T>> {
    /// Map every element of every locale's list through `f`
    pub fn map_items<U, F>(&self, mut f: F) -> LocalizedValue<Vec<U>>
    where
        F: FnMut(&str, &T) -> U,
    {
        self.map(|locale, items| items.iter().map(|item| f(locale, item)).collect())
    }
}

impl<T: Blank> LocalizedValue<T> {
    /// Value for a single locale; blank values produce an empty map
    pub fn new(value: T, locale: &str) -> Self {
        let mut localized = Self::empty();
        localized.set(locale, value);
        localized
    }

    /// Value for the canonical target locale
    pub fn canonical(value: T, locales: &LocaleMap) -> Self {
        Self::new(value, locales.default_target())
    }

    /// Store `value` for `locale`, removing the key when the value is blank
    pub fn set(&mut self, locale: &str, value: T) {
        if value.is_blank() {
            self.values.remove(locale);
        } else {
            self.values.insert(locale.to_string(), value);
        }
    }

    /// True when no locale holds a non-blank value
    ///
    /// Covers both "no keys" and "a canonical key holding a falsy value".
    pub fn is_empty(&self) -> bool {
        self.values.values().all(Blank::is_blank)
    }

    /// Non-blank (locale, value) pairs
    pub fn present(&self) -> impl Iterator<Item = (&str, &T)> {
        self.iter().filter(|(_, value)| !value.is_blank())
    }
}

impl LocalizedValue<String> {
    /// Append `appendix` to every locale, wrapping each appended piece
    ///
    /// Locales are the union of both sides. A locale missing on `self` starts
    /// from the empty string; a locale missing (or blank) on `appendix` is
    /// left as it was.
    pub fn append_with<F>(&mut self, appendix: &LocalizedValue<String>, wrap: F)
    where
        F: Fn(&str) -> String,
    {
        for (locale, piece) in appendix.present() {
            let mut current = self.values.remove(locale).unwrap_or_default();
            current.push_str(&wrap(piece));
            self.set(locale, current);
        }
    }

    /// Append `appendix` verbatim
    pub fn append(&mut self, appendix: &LocalizedValue<String>) {
        self.append_with(appendix, str::to_string);
    }
}

impl<T> FromIterator<(String, T)> for LocalizedValue<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_locales() -> LocalizedValue<String> {
        let mut value = LocalizedValue::new("Hello".to_string(), "en-GB");
        value.set("de-DE", "Hallo".to_string());
        value
    }

    #[test]
    fn test_blank_value_produces_empty_map() {
        let value = LocalizedValue::new(String::new(), "en-GB");
        assert_eq!(value.len(), 0);
        assert!(value.is_empty());
    }

    #[test]
    fn test_canonical_uses_default_target_locale() {
        let value = LocalizedValue::canonical("x".to_string(), &LocaleMap::default());
        assert_eq!(value.get("en-GB").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_map_preserves_key_set() {
        let value = two_locales();
        let mapped = value.map(|_, s| s.len());
        assert_eq!(
            mapped.locales().collect::<Vec<_>>(),
            value.locales().collect::<Vec<_>>()
        );

        // Even a blanking transformation keeps the keys
        let blanked = value.map(|_, _| String::new());
        assert_eq!(blanked.len(), 2);
        assert!(blanked.is_empty());
    }

    #[test]
    fn test_map_items_is_element_wise() {
        let value = LocalizedValue::new(vec!["a".to_string(), "b".to_string()], "en-GB");
        let mapped = value.map_items(|locale, id| format!("{}:{}", locale, id));
        assert_eq!(
            mapped.get("en-GB").unwrap(),
            &vec!["en-GB:a".to_string(), "en-GB:b".to_string()]
        );
    }

    #[test]
    fn test_is_empty_on_falsy_canonical_value() {
        let value: LocalizedValue<String> =
            [("en-GB".to_string(), String::new())].into_iter().collect();
        assert!(value.is_empty());
        assert!(!two_locales().is_empty());
    }

    #[test]
    fn test_append_to_unset_starts_from_empty() {
        let mut text = LocalizedValue::empty();
        text.append_with(&two_locales(), |s| format!("<blockquote>{}</blockquote>", s));
        assert_eq!(
            text.get("en-GB").map(String::as_str),
            Some("<blockquote>Hello</blockquote>")
        );
        assert_eq!(
            text.get("de-DE").map(String::as_str),
            Some("<blockquote>Hallo</blockquote>")
        );
    }

    #[test]
    fn test_append_keeps_document_order_per_locale() {
        let mut text = LocalizedValue::new("<p>one</p>".to_string(), "en-GB");
        text.append(&LocalizedValue::new("<p>two</p>".to_string(), "en-GB"));
        text.append(&LocalizedValue::new("<p>zwei</p>".to_string(), "de-DE"));
        assert_eq!(text.get("en-GB").unwrap(), "<p>one</p><p>two</p>");
        assert_eq!(text.get("de-DE").unwrap(), "<p>zwei</p>");
    }

    #[test]
    fn test_append_blank_piece_leaves_field_alone() {
        let mut text = LocalizedValue::new("kept".to_string(), "en-GB");
        text.append_with(&LocalizedValue::empty(), |s| format!("<h2>{}</h2>", s));
        assert_eq!(text.get("en-GB").unwrap(), "kept");
        assert_eq!(text.len(), 1);
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let json = serde_json::to_value(two_locales()).unwrap();
        assert_eq!(json, serde_json::json!({"de-DE": "Hallo", "en-GB": "Hello"}));
    }
}
