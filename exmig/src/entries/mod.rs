//! Target entry models
//!
//! Each model holds its fields as [`LocalizedValue`]s and renders them, with
//! the field transforms applied, into the platform's field map.

pub mod fields;
pub mod models;

pub use models::{
    Embed, ExhibitionChapter, ExhibitionPage, ImageComparison, ImageWithAttribution, RichText,
};

use async_trait::async_trait;
use exmig_common::{Blank, Depth, LocaleMap, LocalizedValue};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{MigrationError, Result};
use crate::target::{Fields, Link, TargetStore};

/// Per-locale value of an entry field
pub trait FieldValue: Blank {
    fn to_field(&self) -> Value;
}

impl FieldValue for String {
    fn to_field(&self) -> Value {
        Value::String(self.clone())
    }
}

impl FieldValue for Link {
    fn to_field(&self) -> Value {
        Value::from(self)
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn to_field(&self) -> Value {
        Value::Array(self.iter().map(FieldValue::to_field).collect())
    }
}

/// Field map under construction
///
/// Blank per-locale values are left out, and a field with no values at all
/// is omitted entirely.
#[derive(Debug, Default)]
pub struct FieldSet {
    fields: Fields,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `name` with every non-blank locale of `value`
    pub fn with<T: FieldValue>(mut self, name: &str, value: &LocalizedValue<T>) -> Self {
        let mut by_locale = Map::new();
        for (locale, v) in value.present() {
            by_locale.insert(locale.to_string(), v.to_field());
        }
        if !by_locale.is_empty() {
            self.fields.insert(name.to_string(), Value::Object(by_locale));
        }
        self
    }

    pub fn build(self) -> Fields {
        self.fields
    }
}

/// A kind of target entry
#[async_trait]
pub trait EntryModel: Send + Sync {
    /// Content type id on the platform
    const CONTENT_TYPE: &'static str;

    /// Rendered field map
    fn fields(&self, locales: &LocaleMap) -> Fields;

    /// Create the entry, publish it and return its id
    ///
    /// Any failure is fatal to the run.
    async fn create_and_publish(
        &self,
        target: &dyn TargetStore,
        locales: &LocaleMap,
        depth: Depth,
    ) -> Result<String> {
        info!(depth = depth.level(), "{}- creating `{}`", depth, Self::CONTENT_TYPE);
        let created = target
            .create_entry(Self::CONTENT_TYPE, self.fields(locales))
            .await
            .map_err(|e| MigrationError::remote_write(format!("creating {}", Self::CONTENT_TYPE), e))?;
        let published = target
            .publish_entry(&created)
            .await
            .map_err(|e| {
                MigrationError::remote_write(format!("publishing {} {}", Self::CONTENT_TYPE, created.id()), e)
            })?;
        Ok(published.id().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_set_omits_blank_values_and_empty_fields() {
        let mut name = LocalizedValue::new("Title".to_string(), "en-GB");
        name.set("de-DE", "Titel".to_string());
        let blank: LocalizedValue<String> = LocalizedValue::empty();

        let fields = FieldSet::new()
            .with("name", &name)
            .with("headline", &blank)
            .build();

        assert_eq!(fields.get("name"), Some(&json!({"de-DE": "Titel", "en-GB": "Title"})));
        assert!(!fields.contains_key("headline"));
    }

    #[test]
    fn test_field_set_renders_links_and_link_lists() {
        let image = LocalizedValue::new(Link::asset("a1"), "en-GB");
        let chapters = LocalizedValue::new(vec![Link::entry("c1"), Link::entry("c2")], "en-GB");
        let none: LocalizedValue<Vec<Link>> = LocalizedValue::new(Vec::new(), "en-GB");

        let fields = FieldSet::new()
            .with("image", &image)
            .with("chapters", &chapters)
            .with("related", &none)
            .build();

        assert_eq!(
            fields.get("image"),
            Some(&json!({"en-GB": {"sys": {"type": "Link", "linkType": "Asset", "id": "a1"}}}))
        );
        assert_eq!(
            fields["chapters"]["en-GB"][1],
            json!({"sys": {"type": "Link", "linkType": "Entry", "id": "c2"}})
        );
        assert!(!fields.contains_key("related"));
    }
}
