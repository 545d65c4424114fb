//! Asset deduplication
//!
//! A source image's asset id is the MD5 hex digest of its file uid, so the
//! same image maps to the same asset across runs. The index of assets that
//! already exist on the platform is loaded once (from the snapshot file if
//! present, else by paging through every remote asset) and consulted before
//! each upload. Uploads are serialized per asset id, so concurrent pages
//! referencing one image upload it once.

use exmig_common::{Depth, LocaleMap};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::entries::fields::{truncate_utf16, MAX_LENGTH_SHORT};
use crate::error::Skip;
use crate::target::{AssetRecord, Fields, TargetError, TargetStore, DEFAULT_PAGE_SIZE};

/// Asset id for a source image uid
pub fn asset_id_for(source_id: &str) -> String {
    format!("{:x}", Md5::digest(source_id.as_bytes()))
}

/// Persisted form of the index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    /// Source image uid → asset id, for uploads made by this tool
    #[serde(default)]
    pub sources: BTreeMap<String, String>,
    /// Every asset id known to exist on the platform
    #[serde(default)]
    pub asset_ids: BTreeSet<String>,
}

impl AssetSnapshot {
    pub fn load(path: &Path) -> exmig_common::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, path: &Path) -> exmig_common::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Image to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub source_id: String,
    pub title: Option<String>,
    pub file_name: Option<String>,
    /// Image format, e.g. `jpeg`
    pub format: Option<String>,
}

impl ImageUpload {
    /// Title, falling back to the file name and then the uid
    fn display_title(&self) -> String {
        let title = [&self.title, &self.file_name]
            .into_iter()
            .flatten()
            .map(|t| t.trim())
            .find(|t| !t.is_empty())
            .unwrap_or(self.source_id.as_str());
        truncate_utf16(title, MAX_LENGTH_SHORT)
    }

    fn mime_type(&self) -> Option<String> {
        self.format
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(|f| format!("image/{}", f))
    }
}

/// Outcome of [`AssetDeduplicator::ensure`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upload {
    Existing(String),
    Created(String),
}

impl Upload {
    pub fn asset_id(&self) -> &str {
        match self {
            Self::Existing(id) | Self::Created(id) => id,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Uploads each source image at most once
pub struct AssetDeduplicator {
    target: Arc<dyn TargetStore>,
    locales: LocaleMap,
    image_server: Option<String>,
    snapshot_path: Option<PathBuf>,
    index: OnceCell<Mutex<AssetSnapshot>>,
    upload_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AssetDeduplicator {
    pub fn new(target: Arc<dyn TargetStore>, locales: LocaleMap) -> Self {
        Self {
            target,
            locales,
            image_server: None,
            snapshot_path: None,
            index: OnceCell::new(),
            upload_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Base URL that source image uids are appended to for upload
    pub fn with_image_server(mut self, image_server: impl Into<String>) -> Self {
        self.image_server = Some(image_server.into());
        self
    }

    /// Read the index from, and write it back to, `path`
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn target(&self) -> &Arc<dyn TargetStore> {
        &self.target
    }

    async fn index(&self) -> Result<&Mutex<AssetSnapshot>, TargetError> {
        self.index
            .get_or_try_init(|| async {
                if let Some(path) = &self.snapshot_path {
                    match AssetSnapshot::load(path) {
                        Ok(Some(snapshot)) => {
                            info!("Loaded {} asset ids from {}", snapshot.asset_ids.len(), path.display());
                            return Ok(Mutex::new(snapshot));
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Ignoring unreadable asset snapshot {}: {}", path.display(), e),
                    }
                }
                let asset_ids = self.remote_asset_ids().await?;
                info!("Loaded {} asset ids from the platform", asset_ids.len());
                Ok::<_, TargetError>(Mutex::new(AssetSnapshot {
                    sources: BTreeMap::new(),
                    asset_ids,
                }))
            })
            .await
    }

    /// Page through every remote asset
    async fn remote_asset_ids(&self) -> Result<BTreeSet<String>, TargetError> {
        let mut ids = BTreeSet::new();
        let mut skip = 0;
        loop {
            let page = self.target.assets(skip, DEFAULT_PAGE_SIZE).await?;
            let count = page.items.len();
            ids.extend(page.items.into_iter().map(|a| a.sys.id));
            if count < DEFAULT_PAGE_SIZE {
                break;
            }
            skip += count;
        }
        Ok(ids)
    }

    fn save_snapshot(&self, snapshot: &AssetSnapshot) {
        if let Some(path) = &self.snapshot_path {
            if let Err(e) = snapshot.save(path) {
                warn!("Failed to write asset snapshot {}: {}", path.display(), e);
            }
        }
    }

    /// Whether `asset_id` exists on the platform
    pub async fn exists(&self, asset_id: &str) -> Result<bool, TargetError> {
        let index = self.index().await?;
        let exists = lock(index).asset_ids.contains(asset_id);
        Ok(exists)
    }

    /// Every known asset id, sorted
    pub async fn known_ids(&self) -> Result<Vec<String>, TargetError> {
        let index = self.index().await?;
        let ids = lock(index).asset_ids.iter().cloned().collect();
        Ok(ids)
    }

    /// Rebuild the snapshot from a fresh remote enumeration and write it
    pub async fn cache(&self) -> Result<usize, TargetError> {
        let asset_ids = self.remote_asset_ids().await?;
        let count = asset_ids.len();
        let index = self.index().await?;
        let snapshot = {
            let mut current = lock(index);
            current.asset_ids = asset_ids;
            current.clone()
        };
        self.save_snapshot(&snapshot);
        Ok(count)
    }

    /// Drop a deleted asset from the index
    pub async fn forget(&self, asset_id: &str) {
        let Some(index) = self.index.get() else {
            return;
        };
        let snapshot = {
            let mut current = lock(index);
            current.asset_ids.remove(asset_id);
            current.sources.retain(|_, id| id != asset_id);
            current.clone()
        };
        self.save_snapshot(&snapshot);
    }

    fn upload_lock(&self, asset_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.upload_locks)
            .entry(asset_id.to_string())
            .or_default()
            .clone()
    }

    /// Drops the lock entry once no other upload of `asset_id` holds or awaits it
    fn release_upload_lock(&self, asset_id: &str, gate: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = lock(&self.upload_locks);
        drop(gate);
        if locks.get(asset_id).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(asset_id);
        }
    }

    /// Asset id for `image`, uploading it first if the platform lacks it
    pub async fn ensure(&self, image: &ImageUpload, depth: Depth) -> Result<Upload, Skip> {
        let asset_id = asset_id_for(&image.source_id);
        let gate = self.upload_lock(&asset_id);
        let outcome = {
            let _held = gate.lock().await;
            self.ensure_unlocked(asset_id.clone(), image, depth).await
        };
        self.release_upload_lock(&asset_id, gate);
        outcome
    }

    async fn ensure_unlocked(
        &self,
        asset_id: String,
        image: &ImageUpload,
        depth: Depth,
    ) -> Result<Upload, Skip> {
        let exists = self.exists(&asset_id).await.map_err(|e| Skip::UploadFailed {
            source_id: image.source_id.clone(),
            reason: e.to_string(),
        })?;
        if exists {
            debug!(depth = depth.level(), "{}[EXISTS] {}: {}", depth, image.source_id, asset_id);
            return Ok(Upload::Existing(asset_id));
        }

        match self.upload(&asset_id, image).await {
            Ok(()) => {
                info!(depth = depth.level(), "{}[NEW] {}: {}", depth, image.source_id, asset_id);
                Ok(Upload::Created(asset_id))
            }
            Err(reason) => Err(Skip::UploadFailed {
                source_id: image.source_id.clone(),
                reason,
            }),
        }
    }

    /// Id of an already uploaded asset for `source_id`
    pub async fn existing(&self, source_id: &str) -> Result<String, Skip> {
        let asset_id = asset_id_for(source_id);
        match self.exists(&asset_id).await {
            Ok(true) => Ok(asset_id),
            Ok(false) => Err(Skip::MissingAsset {
                source_id: source_id.to_string(),
            }),
            Err(e) => Err(Skip::RemoteRead(e.to_string())),
        }
    }

    pub async fn get(&self, asset_id: &str) -> Result<AssetRecord, TargetError> {
        self.target.get_asset(asset_id).await
    }

    fn asset_fields(&self, image: &ImageUpload, image_server: &str) -> Fields {
        let locale = self.locales.default_target();
        let mut file = serde_json::Map::new();
        if let Some(mime) = image.mime_type() {
            file.insert("contentType".to_string(), json!(mime));
        }
        file.insert(
            "fileName".to_string(),
            json!(image.file_name.clone().unwrap_or_else(|| image.source_id.clone())),
        );
        file.insert(
            "upload".to_string(),
            json!(format!("{}{}", image_server, urlencoding::encode(&image.source_id))),
        );

        let mut fields = Fields::new();
        fields.insert("title".to_string(), json!({ locale: image.display_title() }));
        fields.insert("file".to_string(), json!({ locale: Value::Object(file) }));
        fields
    }

    async fn upload(&self, asset_id: &str, image: &ImageUpload) -> Result<(), String> {
        let image_server = self
            .image_server
            .as_deref()
            .ok_or_else(|| "no image server configured".to_string())?;

        let fields = self.asset_fields(image, image_server);
        let file_locales: Vec<String> = fields
            .get("file")
            .and_then(Value::as_object)
            .map(|by_locale| by_locale.keys().cloned().collect())
            .unwrap_or_default();

        let mut asset = self
            .target
            .create_asset_with_id(asset_id, fields)
            .await
            .map_err(|e| e.to_string())?;
        for locale in &file_locales {
            asset = self
                .target
                .process_asset(&asset, locale)
                .await
                .map_err(|e| e.to_string())?;
        }
        self.target
            .publish_asset(&asset)
            .await
            .map_err(|e| e.to_string())?;

        let index = self.index().await.map_err(|e| e.to_string())?;
        let snapshot = {
            let mut current = lock(index);
            current.asset_ids.insert(asset_id.to_string());
            current.sources.insert(image.source_id.clone(), asset_id.to_string());
            current.clone()
        };
        self.save_snapshot(&snapshot);
        Ok(())
    }
}
