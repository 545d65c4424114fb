//! Content tree loader
//!
//! Reads one page's tree (attributes, elements, essences and their typed
//! payloads) and keys every value to the target locale of the requested
//! language.

use exmig_common::{Depth, LocaleMap, LocalizedValue};
use std::sync::Arc;
use tracing::debug;

use super::{
    CreditEssence, EssenceKind, EssencePayload, EssenceRow, HtmlEssence, PictureEssence,
    SourceElement, SourceEssence, SourcePage, SourceStore, TextEssence,
};
use crate::error::{report, MigrationError, Result, Skip};

/// Elements that carry no migratable content
pub const ELEMENT_BLOCKLIST: &[&str] = &["section"];

/// Navigation and layout-only essences
pub const ESSENCE_BLOCKLIST: &[&str] = &[
    "image_alignment",
    "hide_in_credits",
    "button_text",
    "text1",
    "text2",
    "partner_logo",
    "link",
    "label",
];

/// Build a typed payload from an essence row, keyed to `locale`
pub fn payload_from_row(kind: EssenceKind, row: &EssenceRow, locale: &str) -> EssencePayload {
    let field = |column: &str| {
        LocalizedValue::new(
            row.get(column).cloned().flatten().unwrap_or_default(),
            locale,
        )
    };

    match kind {
        EssenceKind::Text => EssencePayload::Text(TextEssence { body: field("body") }),
        EssenceKind::RichText => EssencePayload::RichText(TextEssence { body: field("body") }),
        EssenceKind::Picture => EssencePayload::Picture(PictureEssence {
            image_file_uid: field("image_file_uid"),
            image_file_name: field("image_file_name"),
            image_file_format: field("image_file_format"),
        }),
        EssenceKind::Credit => EssencePayload::Credit(CreditEssence {
            title: field("title"),
            author: field("author"),
            institution: field("institution"),
            url: field("url"),
            license: field("license"),
        }),
        EssenceKind::Html => EssencePayload::Html(HtmlEssence {
            source: field("source"),
        }),
    }
}

/// Loads localized page trees from a [`SourceStore`]
#[derive(Clone)]
pub struct ContentTreeLoader {
    store: Arc<dyn SourceStore>,
    locales: LocaleMap,
}

impl ContentTreeLoader {
    pub fn new(store: Arc<dyn SourceStore>, locales: LocaleMap) -> Self {
        Self { store, locales }
    }

    pub fn store(&self) -> &Arc<dyn SourceStore> {
        &self.store
    }

    pub fn locales(&self) -> &LocaleMap {
        &self.locales
    }

    /// Load the page `urlname` in `language_code`
    pub async fn load(&self, urlname: &str, language_code: &str, depth: Depth) -> Result<SourcePage> {
        let locale = self
            .locales
            .target_for(language_code)
            .ok_or_else(|| {
                MigrationError::Source(exmig_common::Error::Config(format!(
                    "No target locale mapped for language \"{}\"",
                    language_code
                )))
            })?
            .to_string();

        let id = self
            .store
            .page_id(urlname, language_code)
            .await?
            .ok_or_else(|| MigrationError::PageNotFound {
                urlname: urlname.to_string(),
                language: language_code.to_string(),
            })?;

        let record = self.store.page(id).await?;
        debug!(urlname, language_code, id, "Loading page tree");

        let mut elements = Vec::new();
        for element in self.store.elements(id).await? {
            if ELEMENT_BLOCKLIST.contains(&element.name.as_str()) {
                continue;
            }

            let mut essences = Vec::new();
            for content in &element.contents {
                if ESSENCE_BLOCKLIST.contains(&content.name.as_str()) {
                    continue;
                }
                let Some(kind) = EssenceKind::from_tag(&content.essence_type) else {
                    report(depth, &Skip::UnknownEssenceType(content.essence_type.clone()));
                    continue;
                };
                let Some(row) = self.store.essence(kind, content.essence_id).await? else {
                    report(
                        depth,
                        &Skip::MissingEssence {
                            element: element.name.clone(),
                            essence: content.name.clone(),
                        },
                    );
                    continue;
                };
                essences.push(SourceEssence {
                    name: content.name.clone(),
                    payload: payload_from_row(kind, &row, &locale),
                });
            }

            elements.push(SourceElement {
                name: element.name,
                essences,
            });
        }

        Ok(SourcePage {
            id: record.id,
            urlname: record.urlname,
            language_code: record.language_code,
            meta_description: LocalizedValue::new(record.meta_description.unwrap_or_default(), &locale),
            locale,
            depth: record.depth,
            public_on: record.public_on,
            elements,
            child_urlnames: record.child_urlnames,
            other_language_codes: record.other_language_codes,
        })
    }

    /// Load `urlname` in the default source language
    pub async fn load_default(&self, urlname: &str, depth: Depth) -> Result<SourcePage> {
        let language = self.locales.default_source().to_string();
        self.load(urlname, &language, depth).await
    }

    /// Published top-level exhibition urlnames, oldest first
    pub async fn top_level_urlnames(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .top_level_urlnames(self.locales.default_source())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_from_row_keys_to_locale_and_drops_nulls() {
        let mut row = EssenceRow::new();
        row.insert("title".to_string(), Some("Mona Lisa".to_string()));
        row.insert("author".to_string(), None);
        row.insert("license".to_string(), Some("CC0".to_string()));

        let EssencePayload::Credit(credit) = payload_from_row(EssenceKind::Credit, &row, "fr-FR") else {
            panic!("expected a credit payload");
        };
        assert_eq!(credit.title.get("fr-FR").map(String::as_str), Some("Mona Lisa"));
        assert!(credit.author.is_empty());
        assert_eq!(credit.author.len(), 0);
        assert!(credit.institution.is_empty());
        assert_eq!(credit.license.get("fr-FR").map(String::as_str), Some("CC0"));
    }

    #[test]
    fn test_blocklists() {
        assert!(ESSENCE_BLOCKLIST.contains(&"button_text"));
        assert!(ELEMENT_BLOCKLIST.contains(&"section"));
        assert!(!ESSENCE_BLOCKLIST.contains(&"image_credit"));
    }
}
