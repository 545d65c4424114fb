//! Source CMS content
//!
//! Raw rows come from a [`SourceStore`]; [`loader`] turns them into the
//! localized [`SourcePage`] tree the transform consumes.

pub mod loader;
pub mod postgres;

pub use loader::ContentTreeLoader;
pub use postgres::PgSourceStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exmig_common::{LocalizedValue, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Skip;

// ============================================================================
// Raw rows
// ============================================================================

/// Kind of essence, from the `essence_type` tag stored on a content row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EssenceKind {
    Text,
    RichText,
    Picture,
    Credit,
    Html,
}

impl EssenceKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Alchemy::EssenceText" => Some(Self::Text),
            "Alchemy::EssenceRichtext" => Some(Self::RichText),
            "Alchemy::EssencePicture" => Some(Self::Picture),
            "Alchemy::EssenceCredit" => Some(Self::Credit),
            "Alchemy::EssenceHtml" => Some(Self::Html),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Text => "Alchemy::EssenceText",
            Self::RichText => "Alchemy::EssenceRichtext",
            Self::Picture => "Alchemy::EssencePicture",
            Self::Credit => "Alchemy::EssenceCredit",
            Self::Html => "Alchemy::EssenceHtml",
        }
    }
}

/// Scalar page attributes plus related slugs
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub id: i64,
    pub urlname: String,
    pub language_code: String,
    pub depth: i32,
    pub meta_description: Option<String>,
    pub public_on: Option<DateTime<Utc>>,
    /// Other languages the same urlname exists in, ordered
    pub other_language_codes: Vec<String>,
    /// Child page urlnames in tree order, credit pages excluded
    pub child_urlnames: Vec<String>,
}

/// Reference from an element to one essence row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRef {
    pub name: String,
    pub essence_type: String,
    pub essence_id: i64,
}

/// Public element with its content references in position order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRecord {
    pub name: String,
    pub contents: Vec<ContentRef>,
}

/// Essence columns by name; NULL columns are `None`
pub type EssenceRow = BTreeMap<String, Option<String>>;

/// Distinct picture referenced by a picture essence, with a credit title if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureRow {
    pub title: Option<String>,
    pub image_file_uid: String,
    pub image_file_name: Option<String>,
    pub image_file_format: Option<String>,
}

/// Credit page content for one urlname and language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditPageRow {
    pub urlname: String,
    pub language_code: String,
    pub contents: Vec<ContentRef>,
}

/// Query surface of the source CMS database
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn page_id(&self, urlname: &str, language_code: &str) -> Result<Option<i64>>;

    async fn page(&self, id: i64) -> Result<PageRecord>;

    /// Public elements of a page ordered by position
    async fn elements(&self, page_id: i64) -> Result<Vec<ElementRecord>>;

    /// Essence row, `None` when the row is gone
    async fn essence(&self, kind: EssenceKind, id: i64) -> Result<Option<EssenceRow>>;

    /// Published depth-2 pages in `language_code`, oldest first
    async fn top_level_urlnames(&self, language_code: &str) -> Result<Vec<String>>;

    async fn pictures(&self) -> Result<Vec<PictureRow>>;

    async fn credit_pages(&self) -> Result<Vec<CreditPageRow>>;
}

// ============================================================================
// Localized tree
// ============================================================================

/// Plain or rich text essence
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextEssence {
    pub body: LocalizedValue<String>,
}

/// Picture essence resolved to its image file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PictureEssence {
    pub image_file_uid: LocalizedValue<String>,
    pub image_file_name: LocalizedValue<String>,
    pub image_file_format: LocalizedValue<String>,
}

/// Credit record accompanying an image
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreditEssence {
    pub title: LocalizedValue<String>,
    pub author: LocalizedValue<String>,
    pub institution: LocalizedValue<String>,
    pub url: LocalizedValue<String>,
    pub license: LocalizedValue<String>,
}

/// Raw HTML embed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HtmlEssence {
    pub source: LocalizedValue<String>,
}

/// Typed essence payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EssencePayload {
    Text(TextEssence),
    RichText(TextEssence),
    Picture(PictureEssence),
    Credit(CreditEssence),
    Html(HtmlEssence),
}

impl EssencePayload {
    pub fn kind(&self) -> EssenceKind {
        match self {
            Self::Text(_) => EssenceKind::Text,
            Self::RichText(_) => EssenceKind::RichText,
            Self::Picture(_) => EssenceKind::Picture,
            Self::Credit(_) => EssenceKind::Credit,
            Self::Html(_) => EssenceKind::Html,
        }
    }

    /// Every field with its column name, in column order
    pub fn fields(&self) -> Vec<(&'static str, &LocalizedValue<String>)> {
        match self {
            Self::Text(t) | Self::RichText(t) => vec![("body", &t.body)],
            Self::Picture(p) => vec![
                ("image_file_uid", &p.image_file_uid),
                ("image_file_name", &p.image_file_name),
                ("image_file_format", &p.image_file_format),
            ],
            Self::Credit(c) => vec![
                ("title", &c.title),
                ("author", &c.author),
                ("institution", &c.institution),
                ("url", &c.url),
                ("license", &c.license),
            ],
            Self::Html(h) => vec![("source", &h.source)],
        }
    }

    /// Mutable view of [`fields`](Self::fields), same order
    pub fn fields_mut(&mut self) -> Vec<(&'static str, &mut LocalizedValue<String>)> {
        match self {
            Self::Text(t) | Self::RichText(t) => vec![("body", &mut t.body)],
            Self::Picture(p) => vec![
                ("image_file_uid", &mut p.image_file_uid),
                ("image_file_name", &mut p.image_file_name),
                ("image_file_format", &mut p.image_file_format),
            ],
            Self::Credit(c) => vec![
                ("title", &mut c.title),
                ("author", &mut c.author),
                ("institution", &mut c.institution),
                ("url", &mut c.url),
                ("license", &mut c.license),
            ],
            Self::Html(h) => vec![("source", &mut h.source)],
        }
    }
}

/// Named essence within an element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceEssence {
    pub name: String,
    pub payload: EssencePayload,
}

/// Named, ordered group of essences
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceElement {
    pub name: String,
    pub essences: Vec<SourceEssence>,
}

impl SourceElement {
    /// The essence named `name`
    pub fn essence(&self, name: &str) -> Option<&SourceEssence> {
        self.essences.iter().find(|e| e.name == name)
    }

    fn require(&self, name: &str) -> std::result::Result<&EssencePayload, Skip> {
        self.essence(name)
            .map(|e| &e.payload)
            .ok_or_else(|| Skip::MissingEssence {
                element: self.name.clone(),
                essence: name.to_string(),
            })
    }

    fn wrong_kind(&self, name: &str, expected: &'static str) -> Skip {
        Skip::WrongEssenceKind {
            element: self.name.clone(),
            essence: name.to_string(),
            expected,
        }
    }

    /// Body of a plain or rich text essence
    pub fn text(&self, name: &str) -> std::result::Result<&LocalizedValue<String>, Skip> {
        match self.require(name)? {
            EssencePayload::Text(t) | EssencePayload::RichText(t) => Ok(&t.body),
            _ => Err(self.wrong_kind(name, "text")),
        }
    }

    /// Body of a text essence, or an empty value when the essence is absent
    pub fn text_or_empty(&self, name: &str) -> LocalizedValue<String> {
        self.text(name).cloned().unwrap_or_default()
    }

    pub fn picture(&self, name: &str) -> std::result::Result<&PictureEssence, Skip> {
        match self.require(name)? {
            EssencePayload::Picture(p) => Ok(p),
            _ => Err(self.wrong_kind(name, "a picture")),
        }
    }

    pub fn credit(&self, name: &str) -> std::result::Result<&CreditEssence, Skip> {
        match self.require(name)? {
            EssencePayload::Credit(c) => Ok(c),
            _ => Err(self.wrong_kind(name, "a credit")),
        }
    }

    pub fn html(&self, name: &str) -> std::result::Result<&HtmlEssence, Skip> {
        match self.require(name)? {
            EssencePayload::Html(h) => Ok(h),
            _ => Err(self.wrong_kind(name, "HTML")),
        }
    }
}

/// One page's content tree, localized to `locale`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePage {
    pub id: i64,
    pub urlname: String,
    pub language_code: String,
    /// Target locale the values are keyed under
    pub locale: String,
    pub depth: i32,
    pub meta_description: LocalizedValue<String>,
    pub public_on: Option<DateTime<Utc>>,
    pub elements: Vec<SourceElement>,
    pub child_urlnames: Vec<String>,
    pub other_language_codes: Vec<String>,
}
