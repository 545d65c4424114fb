//! Credits pass
//!
//! Credit pages hang below exhibitions with their own layout and are not
//! part of the page transform. Their essences are rendered to Markdown per
//! language and written into the `credits` field of the exhibition page
//! entry whose identifier is the first segment of the credit page urlname.

use exmig_common::{Depth, LocaleMap};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::assets::AssetDeduplicator;
use crate::entries::fields::{truncate_utf16, MAX_LENGTH_LONG};
use crate::entries::{EntryModel, ExhibitionPage};
use crate::error::{report, MigrationError, Result, Skip};
use crate::markdown;
use crate::source::{ContentRef, CreditPageRow, EssenceKind, SourceStore};
use crate::target::{EntryQuery, EntryRecord, TargetStore};

/// Field the rendered credits are written to
pub const CREDITS_FIELD: &str = "credits";

/// Credit page rows of one urlname, one per language, in source order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditGroup {
    pub urlname: String,
    pub languages: Vec<(String, Vec<ContentRef>)>,
}

/// Group credit page rows by urlname, keeping first-seen order
pub fn group_credit_pages(rows: Vec<CreditPageRow>) -> Vec<CreditGroup> {
    let mut groups: Vec<CreditGroup> = Vec::new();
    for row in rows {
        match groups.iter_mut().find(|g| g.urlname == row.urlname) {
            Some(group) => group.languages.push((row.language_code, row.contents)),
            None => groups.push(CreditGroup {
                urlname: row.urlname,
                languages: vec![(row.language_code, row.contents)],
            }),
        }
    }
    groups
}

/// Exhibition identifier a credit page belongs to
pub fn exhibition_slug(urlname: &str) -> &str {
    urlname.split('/').next().unwrap_or(urlname)
}

/// One credit essence reduced to what the Markdown needs
#[derive(Debug, Clone, PartialEq, Eq)]
enum CreditPiece {
    Heading(String),
    Html(String),
    Picture(String),
}

/// Outcome of one credits pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreditsReport {
    pub updated: usize,
    /// Credit pages with no exhibition page entry to attach to
    pub unmatched: usize,
}

/// Writes credit pages into exhibition page entries
pub struct CreditsPass {
    source: Arc<dyn SourceStore>,
    target: Arc<dyn TargetStore>,
    assets: Arc<AssetDeduplicator>,
    locales: LocaleMap,
}

impl CreditsPass {
    pub fn new(
        source: Arc<dyn SourceStore>,
        target: Arc<dyn TargetStore>,
        assets: Arc<AssetDeduplicator>,
        locales: LocaleMap,
    ) -> Self {
        Self {
            source,
            target,
            assets,
            locales,
        }
    }

    pub async fn run(&self, depth: Depth) -> Result<CreditsReport> {
        let groups = group_credit_pages(self.source.credit_pages().await?);
        info!("Found {} credit pages", groups.len());

        let mut tally = CreditsReport::default();
        for group in &groups {
            if self.credit_exhibition(group, depth).await? {
                tally.updated += 1;
            } else {
                tally.unmatched += 1;
            }
        }
        Ok(tally)
    }

    async fn piece(&self, content: &ContentRef, depth: Depth) -> Result<Option<CreditPiece>> {
        let Some(kind) = EssenceKind::from_tag(&content.essence_type) else {
            report(depth, &Skip::UnknownEssenceType(content.essence_type.clone()));
            return Ok(None);
        };
        let column = match kind {
            EssenceKind::Text | EssenceKind::RichText => "body",
            EssenceKind::Picture => "image_file_uid",
            EssenceKind::Credit | EssenceKind::Html => {
                report(depth, &Skip::UnknownEssenceType(content.essence_type.clone()));
                return Ok(None);
            }
        };

        let value = self
            .source
            .essence(kind, content.essence_id)
            .await?
            .and_then(|mut row| row.remove(column).flatten())
            .filter(|v| !v.is_empty());
        let Some(value) = value else {
            return Ok(None);
        };

        Ok(Some(match kind {
            EssenceKind::Text => CreditPiece::Heading(value),
            EssenceKind::Picture => CreditPiece::Picture(value),
            _ => CreditPiece::Html(value),
        }))
    }

    /// Markdown for an image that is already on the platform, else empty
    async fn picture_markdown(&self, source_id: &str, depth: Depth) -> String {
        let asset_id = match self.assets.existing(source_id).await {
            Ok(id) => id,
            Err(skip) => {
                report(depth, &skip);
                return String::new();
            }
        };
        match self.assets.get(&asset_id).await {
            Ok(asset) => asset
                .file_url(self.locales.default_target())
                .map(|url| markdown::image(&format!("https:{}", url)))
                .unwrap_or_default(),
            Err(e) => {
                report(depth, &Skip::RemoteRead(format!("asset {}: {}", asset_id, e)));
                String::new()
            }
        }
    }

    /// Markdown for one language's credit page
    pub async fn render(&self, contents: &[ContentRef], depth: Depth) -> Result<String> {
        let mut credits = String::new();
        for content in contents {
            match self.piece(content, depth).await? {
                Some(CreditPiece::Heading(text)) => {
                    credits.push_str(&format!("## {}\n", text));
                }
                Some(CreditPiece::Html(html)) => credits.push_str(&markdown::to_markdown(&html)),
                Some(CreditPiece::Picture(uid)) => credits.push_str(&self.picture_markdown(&uid, depth).await),
                None => {}
            }
        }
        Ok(credits)
    }

    async fn find_exhibition(&self, slug: &str) -> Result<Option<EntryRecord>> {
        let query = EntryQuery {
            content_type: Some(ExhibitionPage::CONTENT_TYPE.to_string()),
            identifier: Some(slug.to_string()),
            limit: 1,
            ..Default::default()
        };
        let found = self
            .target
            .entries(&query)
            .await
            .map_err(MigrationError::RemoteRead)?;
        Ok(found.items.into_iter().next())
    }

    /// Write one credit group into its exhibition; `false` if none matches
    async fn credit_exhibition(&self, group: &CreditGroup, depth: Depth) -> Result<bool> {
        info!(depth = depth.level(), "{}{}", depth, group.urlname);
        let slug = exhibition_slug(&group.urlname);
        let Some(mut entry) = self.find_exhibition(slug).await? else {
            info!(depth = depth.level(), "{}- no exhibition page entry for \"{}\"; skipping", depth, slug);
            return Ok(false);
        };

        let mut credits = match entry.fields.remove(CREDITS_FIELD) {
            Some(Value::Object(by_locale)) => by_locale,
            _ => Map::new(),
        };
        for (language, contents) in &group.languages {
            let Some(locale) = self.locales.target_for(language) else {
                report(
                    depth.deeper(),
                    &Skip::TranslationUnavailable {
                        language: language.clone(),
                        reason: "no target locale mapped".to_string(),
                    },
                );
                continue;
            };
            info!(depth = depth.level(), "{}- {} => {}", depth, language, locale);
            let rendered = self.render(contents, depth.deeper()).await?;
            let markdown = truncate_utf16(rendered.trim(), MAX_LENGTH_LONG);
            if markdown.is_empty() {
                credits.remove(locale);
                continue;
            }
            credits.insert(locale.to_string(), Value::String(markdown));
        }
        if !credits.is_empty() {
            entry.fields.insert(CREDITS_FIELD.to_string(), Value::Object(credits));
        }

        let updated = self
            .target
            .update_entry(&entry)
            .await
            .map_err(|e| MigrationError::remote_write(format!("updating credits of {}", entry.id()), e))?;
        if let Err(e) = self.target.publish_entry(&updated).await {
            report(
                depth,
                &Skip::BestEffort {
                    action: format!("publishing credits of {}", updated.id()),
                    reason: e.to_string(),
                },
            );
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(urlname: &str, language: &str) -> CreditPageRow {
        CreditPageRow {
            urlname: urlname.to_string(),
            language_code: language.to_string(),
            contents: vec![ContentRef {
                name: "title".to_string(),
                essence_type: EssenceKind::Text.tag().to_string(),
                essence_id: 1,
            }],
        }
    }

    #[test]
    fn test_group_credit_pages_by_urlname() {
        let groups = group_credit_pages(vec![
            row("faces/credits", "en"),
            row("music/credits", "en"),
            row("faces/credits", "de"),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].urlname, "faces/credits");
        let languages: Vec<&str> = groups[0].languages.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(languages, vec!["en", "de"]);
        assert_eq!(groups[1].languages.len(), 1);
    }

    #[test]
    fn test_exhibition_slug_is_first_segment() {
        assert_eq!(exhibition_slug("faces-of-europe/credits"), "faces-of-europe");
        assert_eq!(exhibition_slug("faces-of-europe"), "faces-of-europe");
        assert_eq!(exhibition_slug(""), "");
    }
}
