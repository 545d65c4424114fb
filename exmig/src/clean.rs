//! Cleanup of migrated entry graphs
//!
//! Deletes an entry together with everything reachable from it through
//! `hasPart` and `primaryImageOfPage`, children before parents. Image
//! assets linked from `image` fields go too. Every failure is logged and
//! the walk carries on with the rest of the graph.

use exmig_common::Depth;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::assets::AssetDeduplicator;
use crate::entries::{EntryModel, ExhibitionPage};
use crate::error::{report, MigrationError, Result, Skip};
use crate::target::{EntryQuery, EntryRecord, TargetStore, DEFAULT_PAGE_SIZE};

/// Entry link fields followed when cleaning
pub const ENTRY_LINK_FIELDS: &[&str] = &["hasPart", "primaryImageOfPage"];

/// Asset link field followed when cleaning
pub const ASSET_LINK_FIELD: &str = "image";

/// Tally of one cleanup run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub deleted_entries: usize,
    pub deleted_assets: usize,
    /// Objects left in place because another entry still links to them
    pub kept_shared: usize,
    pub failures: usize,
}

impl CleanReport {
    fn absorb(&mut self, other: CleanReport) {
        self.deleted_entries += other.deleted_entries;
        self.deleted_assets += other.deleted_assets;
        self.kept_shared += other.kept_shared;
        self.failures += other.failures;
    }
}

enum Step {
    Visit { id: String, linked: bool, depth: Depth },
    DeleteAsset { id: String, depth: Depth },
    DeleteEntry { entry: Box<EntryRecord>, depth: Depth },
}

/// Deletes entry graphs from the platform
pub struct Cleaner {
    target: Arc<dyn TargetStore>,
    assets: Arc<AssetDeduplicator>,
    check_links: bool,
}

impl Cleaner {
    pub fn new(target: Arc<dyn TargetStore>, assets: Arc<AssetDeduplicator>) -> Self {
        Self {
            target,
            assets,
            check_links: false,
        }
    }

    /// Only delete linked objects that nothing else links to
    pub fn with_link_check(mut self, check_links: bool) -> Self {
        self.check_links = check_links;
        self
    }

    /// Whether exactly one entry links to `query`'s target
    async fn solely_linked(&self, query: EntryQuery, id: &str, depth: Depth) -> bool {
        match self.target.entries(&query).await {
            Ok(found) => found.total == 1,
            Err(e) => {
                report(depth, &Skip::RemoteRead(format!("links to {}: {}", id, e)));
                false
            }
        }
    }

    /// Delete `root_id` and everything reachable from it
    pub async fn smart_delete(&self, root_id: &str, depth: Depth) -> CleanReport {
        let mut tally = CleanReport::default();
        let mut visited = HashSet::new();
        let mut stack = vec![Step::Visit {
            id: root_id.to_string(),
            linked: false,
            depth,
        }];

        while let Some(step) = stack.pop() {
            match step {
                Step::Visit { id, linked, depth } => {
                    if !visited.insert(id.clone()) {
                        continue;
                    }
                    if linked
                        && self.check_links
                        && !self.solely_linked(EntryQuery::links_to(id.as_str()), &id, depth).await
                    {
                        info!(depth = depth.level(), "{}- {} is linked elsewhere; keeping", depth, id);
                        tally.kept_shared += 1;
                        continue;
                    }
                    let entry = match self.target.get_entry(&id).await {
                        Ok(entry) => entry,
                        Err(e) => {
                            report(depth, &Skip::RemoteRead(format!("entry {}: {}; skipping", id, e)));
                            continue;
                        }
                    };
                    info!(
                        depth = depth.level(),
                        "{}{}: {}",
                        depth,
                        entry.content_type_id().unwrap_or("entry"),
                        entry.id()
                    );

                    let children: Vec<String> = ENTRY_LINK_FIELDS
                        .iter()
                        .flat_map(|field| entry.links(field))
                        .map(|link| link.id().to_string())
                        .collect();
                    let images: Vec<String> = entry
                        .links(ASSET_LINK_FIELD)
                        .into_iter()
                        .map(|link| link.id().to_string())
                        .collect();

                    stack.push(Step::DeleteEntry {
                        entry: Box::new(entry),
                        depth,
                    });
                    for image in images.into_iter().rev() {
                        stack.push(Step::DeleteAsset {
                            id: image,
                            depth: depth.deeper(),
                        });
                    }
                    for child in children.into_iter().rev() {
                        stack.push(Step::Visit {
                            id: child,
                            linked: true,
                            depth: depth.deeper(),
                        });
                    }
                }
                Step::DeleteAsset { id, depth } => {
                    if !visited.insert(id.clone()) {
                        continue;
                    }
                    if self.check_links
                        && !self
                            .solely_linked(EntryQuery::links_to_asset(id.as_str()), &id, depth)
                            .await
                    {
                        info!(depth = depth.level(), "{}- asset {} is linked elsewhere; keeping", depth, id);
                        tally.kept_shared += 1;
                        continue;
                    }
                    if self.delete_asset(&id, depth).await {
                        tally.deleted_assets += 1;
                    } else {
                        tally.failures += 1;
                    }
                }
                Step::DeleteEntry { entry, depth } => {
                    if self.delete_entry(*entry, depth).await {
                        tally.deleted_entries += 1;
                    } else {
                        tally.failures += 1;
                    }
                }
            }
        }

        tally
    }

    /// Unpublish (if needed) and delete an entry; `false` when it survives
    async fn delete_entry(&self, mut entry: EntryRecord, depth: Depth) -> bool {
        if entry.is_published() {
            info!(depth = depth.level(), "{}- unpublishing", depth);
            match self.target.unpublish_entry(&entry).await {
                Ok(unpublished) => entry = unpublished,
                Err(e) => report(
                    depth.deeper(),
                    &Skip::BestEffort {
                        action: format!("unpublishing entry {}", entry.id()),
                        reason: e.to_string(),
                    },
                ),
            }
        }
        info!(depth = depth.level(), "{}- deleting", depth);
        match self.target.delete_entry(&entry).await {
            Ok(()) => true,
            Err(e) => {
                report(
                    depth.deeper(),
                    &Skip::BestEffort {
                        action: format!("deleting entry {}", entry.id()),
                        reason: e.to_string(),
                    },
                );
                false
            }
        }
    }

    async fn delete_asset(&self, id: &str, depth: Depth) -> bool {
        let mut asset = match self.target.get_asset(id).await {
            Ok(asset) => asset,
            Err(e) => {
                report(depth, &Skip::RemoteRead(format!("asset {}: {}; skipping", id, e)));
                return false;
            }
        };
        info!(depth = depth.level(), "{}Asset: {}", depth, id);
        if asset.is_published() {
            match self.target.unpublish_asset(&asset).await {
                Ok(unpublished) => asset = unpublished,
                Err(e) => report(
                    depth.deeper(),
                    &Skip::BestEffort {
                        action: format!("unpublishing asset {}", id),
                        reason: e.to_string(),
                    },
                ),
            }
        }
        match self.target.delete_asset(&asset).await {
            Ok(()) => {
                self.assets.forget(id).await;
                true
            }
            Err(e) => {
                report(
                    depth.deeper(),
                    &Skip::BestEffort {
                        action: format!("deleting asset {}", id),
                        reason: e.to_string(),
                    },
                );
                false
            }
        }
    }

    /// Ids of every exhibition page entry
    async fn exhibition_page_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut query = EntryQuery::content_type(ExhibitionPage::CONTENT_TYPE);
        loop {
            let page = self
                .target
                .entries(&query)
                .await
                .map_err(MigrationError::RemoteRead)?;
            let count = page.items.len();
            ids.extend(page.items.into_iter().map(|e| e.sys.id));
            if count < DEFAULT_PAGE_SIZE {
                break;
            }
            query.skip += count;
        }
        Ok(ids)
    }

    /// Delete every exhibition page graph on the platform
    pub async fn clean_all(&self, depth: Depth) -> Result<CleanReport> {
        let ids = self.exhibition_page_ids().await?;
        info!("Cleaning {} exhibition pages", ids.len());

        let mut tally = CleanReport::default();
        for id in ids {
            tally.absorb(self.smart_delete(&id, depth).await);
        }
        Ok(tally)
    }
}
