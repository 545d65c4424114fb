//! Shared test helpers
//!
//! `FixtureSource` is an in-memory `SourceStore` built from page and element
//! builders, so integration tests can describe a source tree inline.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exmig::assets::AssetDeduplicator;
use exmig::source::{
    ContentRef, CreditPageRow, ElementRecord, EssenceKind, EssenceRow, PageRecord, PictureRow, SourceStore,
};
use exmig::target::{MemoryStore, TargetStore};
use exmig::Migration;
use exmig_common::{Error, LocaleMap, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub const IMAGE_SERVER: &str = "https://images.example.org/pictures/";

/// One essence of a fixture element, before ids are assigned
#[derive(Debug, Clone)]
struct FixtureEssence {
    name: String,
    kind: EssenceKind,
    row: Option<EssenceRow>,
}

/// Element under construction
#[derive(Debug, Clone)]
pub struct ElementBuilder {
    name: String,
    essences: Vec<FixtureEssence>,
}

fn row(columns: &[(&str, Option<&str>)]) -> EssenceRow {
    columns
        .iter()
        .map(|(column, value)| (column.to_string(), value.map(str::to_string)))
        .collect()
}

impl ElementBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            essences: Vec::new(),
        }
    }

    fn essence(mut self, name: &str, kind: EssenceKind, row: Option<EssenceRow>) -> Self {
        self.essences.push(FixtureEssence {
            name: name.to_string(),
            kind,
            row,
        });
        self
    }

    pub fn text(self, name: &str, body: &str) -> Self {
        self.essence(name, EssenceKind::Text, Some(row(&[("body", Some(body))])))
    }

    pub fn rich_text(self, name: &str, body: &str) -> Self {
        self.essence(name, EssenceKind::RichText, Some(row(&[("body", Some(body))])))
    }

    pub fn picture(self, name: &str, uid: &str) -> Self {
        let file_name = uid.rsplit('/').next().unwrap_or(uid).to_string();
        self.essence(
            name,
            EssenceKind::Picture,
            Some(row(&[
                ("image_file_uid", Some(uid)),
                ("image_file_name", Some(file_name.as_str())),
                ("image_file_format", Some("jpeg")),
            ])),
        )
    }

    pub fn credit(self, name: &str, title: &str, license: &str) -> Self {
        self.essence(
            name,
            EssenceKind::Credit,
            Some(row(&[
                ("title", Some(title)),
                ("author", Some("Unknown")),
                ("institution", Some("Example Museum")),
                ("url", Some("https://www.europeana.eu/portal/record/123/abc.html")),
                ("license", Some(license)),
            ])),
        )
    }

    pub fn html(self, name: &str, source: &str) -> Self {
        self.essence(name, EssenceKind::Html, Some(row(&[("source", Some(source))])))
    }

    /// Content reference whose essence row is missing
    pub fn dangling(self, name: &str, kind: EssenceKind) -> Self {
        self.essence(name, kind, None)
    }
}

/// Page under construction
#[derive(Debug, Clone)]
pub struct PageBuilder {
    urlname: String,
    language_code: String,
    depth: i32,
    meta_description: Option<String>,
    public_on: Option<DateTime<Utc>>,
    layout: Option<String>,
    children: Vec<String>,
    elements: Vec<ElementBuilder>,
}

impl PageBuilder {
    pub fn new(urlname: &str, language_code: &str, depth: i32) -> Self {
        Self {
            urlname: urlname.to_string(),
            language_code: language_code.to_string(),
            depth,
            meta_description: None,
            public_on: None,
            layout: None,
            children: Vec::new(),
            elements: Vec::new(),
        }
    }

    pub fn meta(mut self, description: &str) -> Self {
        self.meta_description = Some(description.to_string());
        self
    }

    pub fn published(mut self, at: DateTime<Utc>) -> Self {
        self.public_on = Some(at);
        self
    }

    pub fn credit_page(mut self) -> Self {
        self.layout = Some("exhibition_credit_page".to_string());
        self
    }

    pub fn child(mut self, urlname: &str) -> Self {
        self.children.push(urlname.to_string());
        self
    }

    pub fn element(mut self, element: ElementBuilder) -> Self {
        self.elements.push(element);
        self
    }
}

#[derive(Debug, Clone)]
struct StoredPage {
    record: PageRecord,
    layout: Option<String>,
    elements: Vec<ElementRecord>,
}

/// In-memory source CMS
#[derive(Debug, Default)]
pub struct FixtureSource {
    pages: Vec<StoredPage>,
    essences: HashMap<i64, (EssenceKind, EssenceRow)>,
    next_id: i64,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn with_page(mut self, page: PageBuilder) -> Self {
        let id = self.next_id();
        let mut elements = Vec::new();
        for element in page.elements {
            let mut contents = Vec::new();
            for essence in element.essences {
                let essence_id = self.next_id();
                if let Some(row) = essence.row {
                    self.essences.insert(essence_id, (essence.kind, row));
                }
                contents.push(ContentRef {
                    name: essence.name,
                    essence_type: essence.kind.tag().to_string(),
                    essence_id,
                });
            }
            elements.push(ElementRecord {
                name: element.name,
                contents,
            });
        }

        self.pages.push(StoredPage {
            record: PageRecord {
                id,
                urlname: page.urlname,
                language_code: page.language_code,
                depth: page.depth,
                meta_description: page.meta_description,
                public_on: page.public_on,
                other_language_codes: Vec::new(),
                child_urlnames: page.children,
            },
            layout: page.layout,
            elements,
        });
        self
    }

    fn stored(&self, id: i64) -> Result<&StoredPage> {
        self.pages
            .iter()
            .find(|p| p.record.id == id)
            .ok_or_else(|| Error::NotFound(format!("page {}", id)))
    }
}

#[async_trait]
impl SourceStore for FixtureSource {
    async fn page_id(&self, urlname: &str, language_code: &str) -> Result<Option<i64>> {
        Ok(self
            .pages
            .iter()
            .find(|p| p.record.urlname == urlname && p.record.language_code == language_code)
            .map(|p| p.record.id))
    }

    async fn page(&self, id: i64) -> Result<PageRecord> {
        let stored = self.stored(id)?;
        let mut record = stored.record.clone();
        let mut others: Vec<String> = self
            .pages
            .iter()
            .filter(|p| p.record.urlname == record.urlname && p.record.language_code != record.language_code)
            .map(|p| p.record.language_code.clone())
            .collect();
        others.sort();
        record.other_language_codes = others;
        Ok(record)
    }

    async fn elements(&self, page_id: i64) -> Result<Vec<ElementRecord>> {
        Ok(self.stored(page_id)?.elements.clone())
    }

    async fn essence(&self, kind: EssenceKind, id: i64) -> Result<Option<EssenceRow>> {
        Ok(self
            .essences
            .get(&id)
            .filter(|(stored_kind, _)| *stored_kind == kind)
            .map(|(_, row)| row.clone()))
    }

    async fn top_level_urlnames(&self, language_code: &str) -> Result<Vec<String>> {
        Ok(self
            .pages
            .iter()
            .filter(|p| p.record.depth == 2 && p.record.language_code == language_code && p.layout.is_none())
            .map(|p| p.record.urlname.clone())
            .collect())
    }

    async fn pictures(&self) -> Result<Vec<PictureRow>> {
        let mut pictures: Vec<PictureRow> = Vec::new();
        for page in &self.pages {
            for element in &page.elements {
                let title = element
                    .contents
                    .iter()
                    .filter_map(|c| self.essences.get(&c.essence_id))
                    .find(|(kind, _)| *kind == EssenceKind::Credit)
                    .and_then(|(_, row)| row.get("title").cloned().flatten());
                for content in &element.contents {
                    let Some((EssenceKind::Picture, row)) = self.essences.get(&content.essence_id) else {
                        continue;
                    };
                    let Some(uid) = row.get("image_file_uid").cloned().flatten() else {
                        continue;
                    };
                    if pictures.iter().any(|p| p.image_file_uid == uid) {
                        continue;
                    }
                    pictures.push(PictureRow {
                        title: title.clone(),
                        image_file_uid: uid,
                        image_file_name: row.get("image_file_name").cloned().flatten(),
                        image_file_format: row.get("image_file_format").cloned().flatten(),
                    });
                }
            }
        }
        Ok(pictures)
    }

    async fn credit_pages(&self) -> Result<Vec<CreditPageRow>> {
        Ok(self
            .pages
            .iter()
            .filter(|p| p.record.depth > 1 && p.layout.as_deref() == Some("exhibition_credit_page"))
            .map(|p| CreditPageRow {
                urlname: p.record.urlname.clone(),
                language_code: p.record.language_code.clone(),
                contents: p.elements.iter().flat_map(|e| e.contents.clone()).collect(),
            })
            .collect())
    }
}

/// Deduplicator over `store` with the test image server configured
pub fn dedup(store: &Arc<MemoryStore>) -> Arc<AssetDeduplicator> {
    let target: Arc<dyn TargetStore> = store.clone();
    Arc::new(AssetDeduplicator::new(target, LocaleMap::default()).with_image_server(IMAGE_SERVER))
}

/// Migration wired to a fixture source and a fresh in-memory platform
pub fn migration(source: FixtureSource) -> (Migration, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let migration = Migration::new(Arc::new(source), store.clone(), dedup(&store), LocaleMap::default());
    (migration, store)
}

/// Localized string field of a stored entry
pub fn field<'a>(entry: &'a exmig::target::EntryRecord, name: &str) -> Option<&'a str> {
    entry.text(name, "en-GB")
}

/// Ids of an entry's `hasPart` links
pub fn has_part(entry: &exmig::target::EntryRecord) -> Vec<String> {
    entry.links("hasPart").iter().map(|l| l.id().to_string()).collect()
}
