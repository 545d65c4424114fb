//! Image pass
//!
//! Uploads every distinct source picture referenced by a picture essence,
//! ahead of the page transform, so pages only ever link existing assets.

use exmig_common::Depth;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::info;

use crate::assets::{AssetDeduplicator, ImageUpload, Upload};
use crate::error::{report, Result};
use crate::source::{PictureRow, SourceStore};

impl From<PictureRow> for ImageUpload {
    fn from(picture: PictureRow) -> Self {
        Self {
            source_id: picture.image_file_uid,
            title: picture.title,
            file_name: picture.image_file_name,
            format: picture.image_file_format,
        }
    }
}

/// Outcome of one image pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImagesReport {
    pub existing: usize,
    pub created: usize,
    pub failed: usize,
}

/// Uploads every source picture through the deduplicator
pub struct ImagesPass {
    source: Arc<dyn SourceStore>,
    assets: Arc<AssetDeduplicator>,
    jobs: usize,
}

impl ImagesPass {
    pub fn new(source: Arc<dyn SourceStore>, assets: Arc<AssetDeduplicator>) -> Self {
        Self {
            source,
            assets,
            jobs: 1,
        }
    }

    /// Number of uploads in flight at once
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub async fn run(&self, depth: Depth) -> Result<ImagesReport> {
        let pictures = self.source.pictures().await?;
        let total = pictures.len();
        info!(total, jobs = self.jobs, "Migrating source pictures");

        let outcomes: Vec<_> = stream::iter(pictures.into_iter().map(ImageUpload::from))
            .map(|image| {
                let assets = self.assets.clone();
                async move {
                    let outcome = assets.ensure(&image, depth).await;
                    if let Err(skip) = &outcome {
                        report(depth, skip);
                    }
                    outcome
                }
            })
            .buffer_unordered(self.jobs)
            .collect()
            .await;

        let mut tally = ImagesReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(Upload::Existing(_)) => tally.existing += 1,
                Ok(Upload::Created(_)) => tally.created += 1,
                Err(_) => tally.failed += 1,
            }
        }
        info!(
            total,
            existing = tally.existing,
            created = tally.created,
            failed = tally.failed,
            "Image pass completed"
        );
        Ok(tally)
    }
}
