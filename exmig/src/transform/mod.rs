//! Page tree transform
//!
//! Walks a page and its descendants children-first with an explicit work
//! stack. Each page becomes an exhibition page (depth 2) or chapter (any
//! other depth) whose `hasPart` lists its child pages, then the content
//! entries its elements produce, with adjacent rich text merged. Every
//! entry is created only after everything it links to exists.

pub mod elements;
pub mod merge;

pub use elements::ElementKind;
pub use merge::merge_rich_text;

use exmig_common::{Depth, LocaleMap, LocalizedValue};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::align::TranslationAligner;
use crate::assets::AssetDeduplicator;
use crate::entries::{EntryModel, ExhibitionChapter, ExhibitionPage};
use crate::error::{report, Result, Skip};
use crate::source::SourcePage;
use crate::target::TargetStore;

/// Source depth of top-level exhibition pages
pub const EXHIBITION_DEPTH: i32 = 2;

type Text = LocalizedValue<String>;

/// Which entry a page becomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Exhibition,
    Chapter,
}

impl PageKind {
    pub fn for_depth(depth: i32) -> Self {
        if depth == EXHIBITION_DEPTH {
            Self::Exhibition
        } else {
            Self::Chapter
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Exhibition => ExhibitionPage::CONTENT_TYPE,
            Self::Chapter => ExhibitionChapter::CONTENT_TYPE,
        }
    }
}

/// Page entry fields gathered while its elements are processed
#[derive(Debug, Clone)]
pub struct PageDraft {
    pub kind: PageKind,
    pub identifier: Text,
    pub name: Text,
    pub headline: Text,
    pub description: Text,
    pub text: Text,
    pub primary_image: Option<String>,
    pub has_part: Vec<String>,
}

impl PageDraft {
    fn new(page: &SourcePage, locales: &LocaleMap, child_ids: Vec<String>) -> Self {
        Self {
            kind: PageKind::for_depth(page.depth),
            identifier: LocalizedValue::canonical(page.urlname.clone(), locales),
            name: Text::empty(),
            headline: Text::empty(),
            description: page.meta_description.clone(),
            text: Text::empty(),
            primary_image: None,
            has_part: child_ids,
        }
    }
}

enum Step {
    Visit { urlname: String, depth: Depth },
    Build { page: Box<SourcePage>, depth: Depth },
}

/// Turns source page trees into published entry graphs
pub struct TransformEngine {
    aligner: TranslationAligner,
    target: Arc<dyn TargetStore>,
    assets: Arc<AssetDeduplicator>,
}

impl TransformEngine {
    pub fn new(aligner: TranslationAligner, target: Arc<dyn TargetStore>, assets: Arc<AssetDeduplicator>) -> Self {
        Self {
            aligner,
            target,
            assets,
        }
    }

    pub(crate) fn target(&self) -> &dyn TargetStore {
        self.target.as_ref()
    }

    pub(crate) fn assets(&self) -> &AssetDeduplicator {
        &self.assets
    }

    pub(crate) fn locales(&self) -> &LocaleMap {
        self.aligner.loader().locales()
    }

    /// Transform the page `urlname` and everything below it
    ///
    /// Returns the id of the page's entry.
    pub async fn transform(&self, urlname: &str, depth: Depth) -> Result<Option<String>> {
        let mut stack = vec![Step::Visit {
            urlname: urlname.to_string(),
            depth,
        }];
        // One slot per visited page, filled when its entry exists
        let mut results: Vec<Option<String>> = Vec::new();
        let mut visited = HashSet::new();

        while let Some(step) = stack.pop() {
            match step {
                Step::Visit { urlname, depth } => {
                    if !visited.insert(urlname.clone()) {
                        report(depth, &Skip::Cycle(urlname));
                        results.push(None);
                        continue;
                    }
                    let page = self.aligner.load_translated(&urlname, depth).await?;
                    let children: Vec<String> = page.child_urlnames.clone();
                    stack.push(Step::Build {
                        page: Box::new(page),
                        depth,
                    });
                    for child in children.into_iter().rev() {
                        stack.push(Step::Visit {
                            urlname: child,
                            depth: depth.deeper(),
                        });
                    }
                }
                Step::Build { page, depth } => {
                    let child_count = page.child_urlnames.len();
                    let child_ids: Vec<String> = results
                        .split_off(results.len().saturating_sub(child_count))
                        .into_iter()
                        .flatten()
                        .collect();
                    let id = self.build_page(&page, child_ids, depth).await?;
                    results.push(Some(id));
                }
            }
        }

        Ok(results.pop().flatten())
    }

    /// Create one page's content entries and then the page entry itself
    async fn build_page(&self, page: &SourcePage, child_ids: Vec<String>, depth: Depth) -> Result<String> {
        let mut draft = PageDraft::new(page, self.locales(), child_ids);
        info!(depth = depth.level(), "{}Creating entry for page: {}", depth, page.urlname);
        info!(depth = depth.level(), "{}- contentTypeId: {}", depth, draft.kind.content_type());

        let element_depth = depth.deeper();
        for element in &page.elements {
            info!(depth = element_depth.level(), "{}- Element \"{}\"", element_depth, element.name);
            match ElementKind::parse(&element.name) {
                Some(kind) => {
                    self.handle_element(kind, element, &mut draft, element_depth.deeper())
                        .await?
                }
                None => report(element_depth, &Skip::UnhandledElement(element.name.clone())),
            }
        }

        let has_part = merge_rich_text(self.target(), std::mem::take(&mut draft.has_part), element_depth).await?;

        match draft.kind {
            PageKind::Exhibition => {
                let entry = ExhibitionPage {
                    name: draft.name,
                    identifier: draft.identifier,
                    headline: draft.headline,
                    description: draft.description,
                    text: draft.text,
                    primary_image_of_page: draft.primary_image,
                    date_published: page
                        .public_on
                        .map(|date| LocalizedValue::canonical(date, self.locales()))
                        .unwrap_or_default(),
                    has_part,
                    credits: Text::empty(),
                };
                entry.create_and_publish(self.target(), self.locales(), depth).await
            }
            PageKind::Chapter => {
                let entry = ExhibitionChapter {
                    name: draft.name,
                    identifier: draft.identifier,
                    headline: draft.headline,
                    description: draft.description,
                    primary_image_of_page: draft.primary_image,
                    has_part,
                };
                entry.create_and_publish(self.target(), self.locales(), depth).await
            }
        }
    }
}
