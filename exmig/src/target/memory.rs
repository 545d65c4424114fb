//! In-process target store
//!
//! Behaves like the platform where the migration can observe it: ids are
//! assigned on create, versions advance on every write, published objects
//! refuse deletion, and stale versions are rejected. Used for `--dry-run`
//! and as the remote stand-in in tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use super::{
    AssetRecord, Collection, EntryQuery, EntryRecord, Fields, Link, LinkType, Sys, TargetError, TargetStore,
};

#[derive(Default)]
struct State {
    entries: BTreeMap<String, EntryRecord>,
    /// Creation order of entry ids
    entry_order: Vec<String>,
    assets: BTreeMap<String, AssetRecord>,
    asset_order: Vec<String>,
    entry_creations: usize,
    asset_creations: usize,
    deleted_entries: Vec<String>,
    deleted_assets: Vec<String>,
    failing_content_types: HashSet<String>,
    failing_assets: HashSet<String>,
    failing_deletes: HashSet<String>,
}

/// Target store held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked mid-write
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of entries ever created
    pub fn entry_creations(&self) -> usize {
        self.lock().entry_creations
    }

    /// Number of assets ever created
    pub fn asset_creations(&self) -> usize {
        self.lock().asset_creations
    }

    /// Live entry by id
    pub fn entry(&self, id: &str) -> Option<EntryRecord> {
        self.lock().entries.get(id).cloned()
    }

    /// Live asset by id
    pub fn asset(&self, id: &str) -> Option<AssetRecord> {
        self.lock().assets.get(id).cloned()
    }

    /// Live entries of one content type, in creation order
    pub fn entries_of_type(&self, content_type: &str) -> Vec<EntryRecord> {
        let state = self.lock();
        state
            .entry_order
            .iter()
            .filter_map(|id| state.entries.get(id))
            .filter(|e| e.content_type_id() == Some(content_type))
            .cloned()
            .collect()
    }

    /// Ids of every live entry
    pub fn entry_ids(&self) -> Vec<String> {
        let state = self.lock();
        state
            .entry_order
            .iter()
            .filter(|id| state.entries.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Ids of every live asset
    pub fn asset_ids(&self) -> Vec<String> {
        let state = self.lock();
        state
            .asset_order
            .iter()
            .filter(|id| state.assets.contains_key(*id))
            .cloned()
            .collect()
    }

    pub fn deleted_entries(&self) -> Vec<String> {
        self.lock().deleted_entries.clone()
    }

    pub fn deleted_assets(&self) -> Vec<String> {
        self.lock().deleted_assets.clone()
    }
}

// Failure injection and seeding for integration tests
// Not #[cfg(test)] so the tests/ crates can reach them
impl MemoryStore {
    /// Make every create of `content_type` fail with an API error
    ///
    /// For testing only
    #[doc(hidden)]
    pub fn fail_creates_of(&self, content_type: &str) {
        self.lock().failing_content_types.insert(content_type.to_string());
    }

    /// Make creating the asset `id` fail with an API error
    ///
    /// For testing only
    #[doc(hidden)]
    pub fn fail_asset(&self, id: &str) {
        self.lock().failing_assets.insert(id.to_string());
    }

    /// Make deleting the entry or asset `id` fail with an API error
    ///
    /// For testing only
    #[doc(hidden)]
    pub fn fail_delete_of(&self, id: &str) {
        self.lock().failing_deletes.insert(id.to_string());
    }

    /// Seed an already-published asset (as if uploaded by an earlier run)
    ///
    /// For testing only
    #[doc(hidden)]
    pub fn seed_asset(&self, id: &str) {
        let mut state = self.lock();
        let record = AssetRecord {
            sys: Sys {
                id: id.to_string(),
                kind: "Asset".to_string(),
                version: 2,
                published_version: Some(1),
                content_type: None,
            },
            fields: Fields::new(),
        };
        state.assets.insert(id.to_string(), record);
        state.asset_order.push(id.to_string());
    }
}
