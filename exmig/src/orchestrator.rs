//! Migration orchestrator
//!
//! Wires the source store, target store and asset deduplicator into the
//! passes the CLI exposes. Top-level pages are independent of each other
//! and may be transformed concurrently; everything below a page runs in
//! order.

use exmig_common::{Depth, LocaleMap};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::info;

use crate::align::{Alignment, TranslationAligner};
use crate::assets::AssetDeduplicator;
use crate::clean::{CleanReport, Cleaner};
use crate::credits::{CreditsPass, CreditsReport};
use crate::error::Result;
use crate::images::{ImagesPass, ImagesReport};
use crate::source::{ContentTreeLoader, SourcePage, SourceStore};
use crate::target::TargetStore;
use crate::transform::TransformEngine;

/// Alignment of one page in one sibling language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationStatus {
    pub urlname: String,
    pub language: String,
    pub aligned: bool,
    /// Mismatch or reason the translation was unavailable
    pub detail: Option<String>,
}

/// Outcome of `migrate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateReport {
    pub images: ImagesReport,
    /// Entry ids of the created exhibition pages
    pub pages: Vec<String>,
}

/// Runs migration passes against one source and one target
pub struct Migration {
    source: Arc<dyn SourceStore>,
    target: Arc<dyn TargetStore>,
    assets: Arc<AssetDeduplicator>,
    aligner: TranslationAligner,
    engine: TransformEngine,
    locales: LocaleMap,
    jobs: usize,
}

impl Migration {
    pub fn new(
        source: Arc<dyn SourceStore>,
        target: Arc<dyn TargetStore>,
        assets: Arc<AssetDeduplicator>,
        locales: LocaleMap,
    ) -> Self {
        let aligner = TranslationAligner::new(ContentTreeLoader::new(source.clone(), locales.clone()));
        let engine = TransformEngine::new(aligner.clone(), target.clone(), assets.clone());
        Self {
            source,
            target,
            assets,
            aligner,
            engine,
            locales,
            jobs: 1,
        }
    }

    /// Number of top-level pages (or images) processed at once
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn assets(&self) -> &Arc<AssetDeduplicator> {
        &self.assets
    }

    pub fn target(&self) -> &Arc<dyn TargetStore> {
        &self.target
    }

    /// Transform one page tree; returns the id of its entry
    pub async fn create(&self, urlname: &str) -> Result<Option<String>> {
        let id = self.engine.transform(urlname, Depth::ROOT).await?;
        if let Some(id) = &id {
            info!(urlname, id = %id, "Created page entry");
        }
        Ok(id)
    }

    /// Transform every published top-level page
    ///
    /// Ids come back in page order. Stops at the first fatal error.
    pub async fn create_all(&self) -> Result<Vec<String>> {
        let urlnames = self.aligner.loader().top_level_urlnames().await?;
        info!(pages = urlnames.len(), jobs = self.jobs, "Creating exhibitions");

        let ids: Vec<Option<String>> = stream::iter(urlnames)
            .map(|urlname| async move { self.create(&urlname).await })
            .buffered(self.jobs)
            .try_collect()
            .await?;
        Ok(ids.into_iter().flatten().collect())
    }

    pub async fn images(&self) -> Result<ImagesReport> {
        ImagesPass::new(self.source.clone(), self.assets.clone())
            .with_jobs(self.jobs)
            .run(Depth::ROOT)
            .await
    }

    /// Image pass followed by every top-level page
    pub async fn migrate(&self) -> Result<MigrateReport> {
        let images = self.images().await?;
        let pages = self.create_all().await?;
        Ok(MigrateReport { images, pages })
    }

    pub async fn credits(&self) -> Result<CreditsReport> {
        CreditsPass::new(
            self.source.clone(),
            self.target.clone(),
            self.assets.clone(),
            self.locales.clone(),
        )
        .run(Depth::ROOT)
        .await
    }

    /// Source tree of one page
    ///
    /// With a language, that language's tree as stored; without one, the
    /// default-language tree with aligned translations spliced in.
    pub async fn load(&self, urlname: &str, language: Option<&str>) -> Result<SourcePage> {
        match language {
            Some(language) => self.aligner.loader().load(urlname, language, Depth::ROOT).await,
            None => self.aligner.load_translated(urlname, Depth::ROOT).await,
        }
    }

    async fn analyse_one(&self, urlname: &str, depth: Depth) -> Result<(SourcePage, Vec<TranslationStatus>)> {
        let page = self.aligner.loader().load_default(urlname, depth).await?;
        let statuses = self
            .aligner
            .analyse(&page, depth)
            .await?
            .into_iter()
            .map(|(language, alignment)| {
                let (aligned, detail) = match alignment {
                    Alignment::Aligned(_) => (true, None),
                    Alignment::Misaligned(mismatch) => (false, Some(mismatch.to_string())),
                    Alignment::Unavailable(reason) => (false, Some(reason)),
                };
                TranslationStatus {
                    urlname: page.urlname.clone(),
                    language,
                    aligned,
                    detail,
                }
            })
            .collect();
        Ok((page, statuses))
    }

    /// Report translation alignment for one page, or for every top-level
    /// page and its direct children
    pub async fn translate(&self, urlname: Option<&str>) -> Result<Vec<TranslationStatus>> {
        if let Some(urlname) = urlname {
            let (_, statuses) = self.analyse_one(urlname, Depth::ROOT).await?;
            return Ok(statuses);
        }

        let mut all = Vec::new();
        for urlname in self.aligner.loader().top_level_urlnames().await? {
            let (page, statuses) = self.analyse_one(&urlname, Depth::ROOT).await?;
            all.extend(statuses);
            for child in &page.child_urlnames {
                let (_, statuses) = self.analyse_one(child, Depth::ROOT.deeper()).await?;
                all.extend(statuses);
            }
        }
        Ok(all)
    }

    pub fn cleaner(&self, check_links: bool) -> Cleaner {
        Cleaner::new(self.target.clone(), self.assets.clone()).with_link_check(check_links)
    }

    /// Delete one entry graph, or every exhibition page graph
    pub async fn clean(&self, id: Option<&str>, check_links: bool) -> Result<CleanReport> {
        let cleaner = self.cleaner(check_links);
        match id {
            Some(id) => Ok(cleaner.smart_delete(id, Depth::ROOT).await),
            None => cleaner.clean_all(Depth::ROOT).await,
        }
    }
}
