//! Target content platform
//!
//! The platform is a remote object store of entries and assets with
//! optimistic versioning: every write names the version it was based on.
//! [`TargetStore`] is the seam; [`ContentfulClient`] talks HTTP and
//! [`MemoryStore`] keeps everything in-process (dry runs and tests).

pub mod contentful;
pub mod memory;

pub use contentful::ContentfulClient;
pub use memory::MemoryStore;

use async_trait::async_trait;
use exmig_common::Blank;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Field map of an entry or asset: field name → { locale → value }
pub type Fields = serde_json::Map<String, Value>;

/// Target store errors
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Version conflict on {0}")]
    VersionConflict(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Kind of object a link points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkType {
    Entry,
    Asset,
    ContentType,
}

/// Typed reference descriptor, `{"sys": {"type": "Link", "linkType": .., "id": ..}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub sys: LinkSys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSys {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "linkType")]
    pub link_type: LinkType,
    pub id: String,
}

impl Link {
    fn new(link_type: LinkType, id: impl Into<String>) -> Self {
        Self {
            sys: LinkSys {
                kind: "Link".to_string(),
                link_type,
                id: id.into(),
            },
        }
    }

    pub fn entry(id: impl Into<String>) -> Self {
        Self::new(LinkType::Entry, id)
    }

    pub fn asset(id: impl Into<String>) -> Self {
        Self::new(LinkType::Asset, id)
    }

    pub fn content_type(id: impl Into<String>) -> Self {
        Self::new(LinkType::ContentType, id)
    }

    pub fn id(&self) -> &str {
        &self.sys.id
    }

    pub fn link_type(&self) -> LinkType {
        self.sys.link_type
    }
}

impl LinkType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entry => "Entry",
            Self::Asset => "Asset",
            Self::ContentType => "ContentType",
        }
    }
}

impl From<&Link> for Value {
    fn from(link: &Link) -> Self {
        serde_json::json!({
            "sys": {
                "type": link.sys.kind,
                "linkType": link.sys.link_type.as_str(),
                "id": link.sys.id,
            }
        })
    }
}

impl Blank for Link {
    fn is_blank(&self) -> bool {
        self.sys.id.is_empty()
    }
}

/// System metadata of a remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sys {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<Link>,
}

/// Entry as returned by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub sys: Sys,
    #[serde(default)]
    pub fields: Fields,
}

impl EntryRecord {
    pub fn id(&self) -> &str {
        &self.sys.id
    }

    pub fn content_type_id(&self) -> Option<&str> {
        self.sys.content_type.as_ref().map(Link::id)
    }

    pub fn is_published(&self) -> bool {
        self.sys.published_version.is_some()
    }

    /// Every link held by `field`, across all locales, in locale then list order
    pub fn links(&self, field: &str) -> Vec<Link> {
        links_in(self.fields.get(field))
    }

    /// String value of `field` for `locale`
    pub fn text(&self, field: &str, locale: &str) -> Option<&str> {
        self.fields.get(field)?.get(locale)?.as_str()
    }
}

/// Asset as returned by the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub sys: Sys,
    #[serde(default)]
    pub fields: Fields,
}

impl AssetRecord {
    pub fn id(&self) -> &str {
        &self.sys.id
    }

    pub fn is_published(&self) -> bool {
        self.sys.published_version.is_some()
    }

    /// Processed file URL for `locale` (protocol-relative on the platform)
    pub fn file_url(&self, locale: &str) -> Option<&str> {
        self.fields.get("file")?.get(locale)?.get("url")?.as_str()
    }
}

fn links_in(value: Option<&Value>) -> Vec<Link> {
    let Some(Value::Object(by_locale)) = value else {
        return Vec::new();
    };
    let mut links = Vec::new();
    for localized in by_locale.values() {
        match localized {
            Value::Array(items) => links.extend(
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value::<Link>(item.clone()).ok()),
            ),
            other => {
                if let Ok(link) = serde_json::from_value::<Link>(other.clone()) {
                    links.push(link);
                }
            }
        }
    }
    links
}

/// Filter for listing entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryQuery {
    pub content_type: Option<String>,
    pub links_to_entry: Option<String>,
    pub links_to_asset: Option<String>,
    /// Matches `fields.identifier` (requires `content_type`)
    pub identifier: Option<String>,
    pub ids: Vec<String>,
    pub skip: usize,
    pub limit: usize,
}

impl EntryQuery {
    pub fn content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            limit: DEFAULT_PAGE_SIZE,
            ..Default::default()
        }
    }

    pub fn links_to(entry_id: impl Into<String>) -> Self {
        Self {
            links_to_entry: Some(entry_id.into()),
            limit: DEFAULT_PAGE_SIZE,
            ..Default::default()
        }
    }

    pub fn links_to_asset(asset_id: impl Into<String>) -> Self {
        Self {
            links_to_asset: Some(asset_id.into()),
            limit: DEFAULT_PAGE_SIZE,
            ..Default::default()
        }
    }
}

/// Page size used when enumerating remote collections
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One page of a remote collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub limit: usize,
}

/// Remote entry/asset store
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Create a new entry of `content_type`; the platform assigns its id
    async fn create_entry(&self, content_type: &str, fields: Fields) -> Result<EntryRecord, TargetError>;

    async fn get_entry(&self, id: &str) -> Result<EntryRecord, TargetError>;

    /// Replace the entry's fields (version checked)
    async fn update_entry(&self, entry: &EntryRecord) -> Result<EntryRecord, TargetError>;

    async fn publish_entry(&self, entry: &EntryRecord) -> Result<EntryRecord, TargetError>;

    async fn unpublish_entry(&self, entry: &EntryRecord) -> Result<EntryRecord, TargetError>;

    /// Delete an entry; published entries must be unpublished first
    async fn delete_entry(&self, entry: &EntryRecord) -> Result<(), TargetError>;

    async fn entries(&self, query: &EntryQuery) -> Result<Collection<EntryRecord>, TargetError>;

    /// Create an asset under a caller-chosen id
    async fn create_asset_with_id(&self, id: &str, fields: Fields) -> Result<AssetRecord, TargetError>;

    /// Process the uploaded file for `locale` and wait until it is available
    async fn process_asset(&self, asset: &AssetRecord, locale: &str) -> Result<AssetRecord, TargetError>;

    async fn get_asset(&self, id: &str) -> Result<AssetRecord, TargetError>;

    async fn publish_asset(&self, asset: &AssetRecord) -> Result<AssetRecord, TargetError>;

    async fn unpublish_asset(&self, asset: &AssetRecord) -> Result<AssetRecord, TargetError>;

    async fn delete_asset(&self, asset: &AssetRecord) -> Result<(), TargetError>;

    async fn assets(&self, skip: usize, limit: usize) -> Result<Collection<AssetRecord>, TargetError>;
}
