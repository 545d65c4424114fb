//! Consecutive rich text merge
//!
//! Element handlers can leave two rich text entries next to each other in a
//! `hasPart` list. Scanning from the end, each such pair is folded into the
//! earlier entry (texts concatenated per locale) and the later entry is
//! removed from the platform and from the list.

use exmig_common::Depth;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::info;

use crate::entries::fields::{truncate_utf16, MAX_LENGTH_LONG};
use crate::entries::{EntryModel, RichText};
use crate::error::{report, MigrationError, Result, Skip};
use crate::target::{EntryRecord, TargetStore};

/// Separator between merged rich text blocks
pub const BLOCK_SEPARATOR: &str = "\n\n";

/// Concatenate two localized text fields, earlier first
pub fn concat_text(earlier: Option<&Value>, later: Option<&Value>) -> Option<Value> {
    let mut locales: Vec<&String> = Vec::new();
    for side in [earlier, later].into_iter().flatten() {
        if let Value::Object(by_locale) = side {
            for locale in by_locale.keys() {
                if !locales.contains(&locale) {
                    locales.push(locale);
                }
            }
        }
    }

    let mut merged = Map::new();
    for locale in locales {
        let parts: Vec<&str> = [earlier, later]
            .into_iter()
            .flatten()
            .filter_map(|side| side.get(locale.as_str()).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .collect();
        if !parts.is_empty() {
            let joined = parts.join(BLOCK_SEPARATOR);
            merged.insert(locale.clone(), Value::String(truncate_utf16(&joined, MAX_LENGTH_LONG)));
        }
    }

    (!merged.is_empty()).then_some(Value::Object(merged))
}

/// Fetch an entry if it is rich text; read failures count as "not rich text"
async fn rich_text_entry(
    target: &dyn TargetStore,
    cache: &mut HashMap<String, Option<EntryRecord>>,
    id: &str,
    depth: Depth,
) -> Option<EntryRecord> {
    if let Some(cached) = cache.get(id) {
        return cached.clone();
    }
    let entry = match target.get_entry(id).await {
        Ok(entry) => Some(entry).filter(|e| e.content_type_id() == Some(RichText::CONTENT_TYPE)),
        Err(e) => {
            report(depth, &Skip::RemoteRead(format!("entry {}: {}", id, e)));
            None
        }
    };
    cache.insert(id.to_string(), entry.clone());
    entry
}

/// Fold adjacent rich text entries of `has_part` together
///
/// Returns the list with no two adjacent rich text entries left.
pub async fn merge_rich_text(
    target: &dyn TargetStore,
    mut has_part: Vec<String>,
    depth: Depth,
) -> Result<Vec<String>> {
    let mut cache = HashMap::new();
    let mut index = has_part.len();

    while index > 1 {
        index -= 1;
        let later_id = has_part[index].clone();
        let earlier_id = has_part[index - 1].clone();

        let Some(later) = rich_text_entry(target, &mut cache, &later_id, depth).await else {
            continue;
        };
        let Some(mut earlier) = rich_text_entry(target, &mut cache, &earlier_id, depth).await else {
            continue;
        };

        info!(depth = depth.level(), "{}- merging rich text {} into {}", depth, later.id(), earlier.id());

        match concat_text(earlier.fields.get("text"), later.fields.get("text")) {
            Some(text) => earlier.fields.insert("text".to_string(), text),
            None => earlier.fields.remove("text"),
        };
        let updated = target
            .update_entry(&earlier)
            .await
            .map_err(|e| MigrationError::remote_write(format!("updating merged rich text {}", earlier.id()), e))?;
        let published = target
            .publish_entry(&updated)
            .await
            .map_err(|e| MigrationError::remote_write(format!("publishing merged rich text {}", earlier.id()), e))?;
        cache.insert(earlier_id, Some(published));

        remove_entry(target, later, depth).await;
        cache.remove(&later_id);
        has_part.remove(index);
    }

    Ok(has_part)
}

/// Unpublish and delete an entry, reporting failures
async fn remove_entry(target: &dyn TargetStore, mut entry: EntryRecord, depth: Depth) {
    if entry.is_published() {
        match target.unpublish_entry(&entry).await {
            Ok(unpublished) => entry = unpublished,
            Err(e) => report(
                depth,
                &Skip::BestEffort {
                    action: format!("unpublishing {}", entry.id()),
                    reason: e.to_string(),
                },
            ),
        }
    }
    if let Err(e) = target.delete_entry(&entry).await {
        report(
            depth,
            &Skip::BestEffort {
                action: format!("deleting {}", entry.id()),
                reason: e.to_string(),
            },
        );
    }
}
