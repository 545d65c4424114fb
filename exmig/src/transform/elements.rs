//! Element handlers
//!
//! Each element kind knows which essences it reads and which content
//! entries it creates. Created entries are appended to the draft's
//! `hasPart`, except the intro image which becomes the primary image.

use exmig_common::{Depth, LocalizedValue};
use tracing::{info, warn};

use super::{PageDraft, PageKind, TransformEngine};
use crate::assets::ImageUpload;
use crate::entries::{Embed, EntryModel, ImageComparison, ImageWithAttribution, RichText};
use crate::error::{report, Result, Skip};
use crate::source::SourceElement;

type Text = LocalizedValue<String>;

/// Element names the transform understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Intro,
    Text,
    Image,
    RichImage,
    ImageCompare,
    Embed,
    Quote,
}

impl ElementKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "intro" => Some(Self::Intro),
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "rich_image" => Some(Self::RichImage),
            "image_compare" => Some(Self::ImageCompare),
            "embed" => Some(Self::Embed),
            "quote" => Some(Self::Quote),
            _ => None,
        }
    }
}

/// Join two localized values per locale with `separator`, skipping blanks
pub fn join_localized(first: &Text, second: &Text, separator: &str) -> Text {
    let mut joined = Text::empty();
    let locales: Vec<&str> = {
        let mut all: Vec<&str> = first.locales().chain(second.locales()).collect();
        all.sort_unstable();
        all.dedup();
        all
    };
    for locale in locales {
        let parts: Vec<&str> = [first.get(locale), second.get(locale)]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        joined.set(locale, parts.join(separator));
    }
    joined
}

fn ok_or_report<T>(result: std::result::Result<T, Skip>, depth: Depth) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(skip) => {
            report(depth, &skip);
            None
        }
    }
}

impl TransformEngine {
    /// Apply one element to the page draft
    pub(crate) async fn handle_element(
        &self,
        kind: ElementKind,
        element: &SourceElement,
        draft: &mut PageDraft,
        depth: Depth,
    ) -> Result<()> {
        match kind {
            ElementKind::Intro => self.intro(element, draft, depth).await,
            ElementKind::Text => self.text(element, draft, depth).await,
            ElementKind::Image => {
                if let Some(id) = self.image_with_attribution(element, "image", "image_credit", depth).await? {
                    draft.has_part.push(id);
                }
                Ok(())
            }
            ElementKind::RichImage => self.rich_image(element, draft, depth).await,
            ElementKind::ImageCompare => self.image_compare(element, draft, depth).await,
            ElementKind::Embed => self.embed(element, draft, depth).await,
            ElementKind::Quote => self.quote(element, draft, depth).await,
        }
    }

    async fn intro(&self, element: &SourceElement, draft: &mut PageDraft, depth: Depth) -> Result<()> {
        draft.name = element.text_or_empty("title");
        draft.headline = element.text_or_empty("sub_title");
        let body = element.text_or_empty("body");

        match draft.kind {
            PageKind::Exhibition => {
                draft.text = body;
            }
            PageKind::Chapter => {
                if draft.name.is_empty() {
                    warn!(depth = depth.level(), "{}- WARNING: title is empty; falling back to URL slug", depth);
                    draft.name = draft.identifier.clone();
                }
                if !body.is_empty() {
                    let mut rich = RichText::default();
                    rich.add_html(&body);
                    let id = rich.create_and_publish(self.target(), self.locales(), depth).await?;
                    draft.has_part.push(id);
                }
            }
        }

        draft.primary_image = self.image_with_attribution(element, "image", "image_credit", depth).await?;
        Ok(())
    }

    async fn text(&self, element: &SourceElement, draft: &mut PageDraft, depth: Depth) -> Result<()> {
        let Some(body) = ok_or_report(element.text("body"), depth) else {
            return Ok(());
        };
        if body.is_empty() {
            return Ok(());
        }
        let mut rich = RichText::default();
        rich.add_html(body);
        let id = rich.create_and_publish(self.target(), self.locales(), depth).await?;
        draft.has_part.push(id);
        Ok(())
    }

    async fn rich_image(&self, element: &SourceElement, draft: &mut PageDraft, depth: Depth) -> Result<()> {
        if let Some(id) = self.image_with_attribution(element, "image", "image_credit", depth).await? {
            draft.has_part.push(id);
        }

        let mut rich = RichText::default();
        rich.add_title(&element.text_or_empty("title"));
        rich.add_sub_title(&element.text_or_empty("sub_title"));
        rich.add_html(&element.text_or_empty("body"));
        rich.add_quote(&element.text_or_empty("quote"));
        rich.add_quotee(&element.text_or_empty("quotee"));
        if rich.text.is_empty() {
            return Ok(());
        }
        let id = rich.create_and_publish(self.target(), self.locales(), depth).await?;
        draft.has_part.push(id);
        Ok(())
    }

    async fn quote(&self, element: &SourceElement, draft: &mut PageDraft, depth: Depth) -> Result<()> {
        let mut rich = RichText::default();
        rich.add_quote(&element.text_or_empty("quote"));
        rich.add_quotee(&element.text_or_empty("quotee"));
        if rich.text.is_empty() {
            report(
                depth,
                &Skip::MissingEssence {
                    element: element.name.clone(),
                    essence: "quote".to_string(),
                },
            );
            return Ok(());
        }
        let id = rich.create_and_publish(self.target(), self.locales(), depth).await?;
        draft.has_part.push(id);
        Ok(())
    }

    async fn embed(&self, element: &SourceElement, draft: &mut PageDraft, depth: Depth) -> Result<()> {
        let Some(html) = ok_or_report(element.html("embed"), depth) else {
            return Ok(());
        };
        let embed = Embed {
            name: Text::empty(),
            embed: html.source.clone(),
        };
        let id = embed.create_and_publish(self.target(), self.locales(), depth).await?;
        draft.has_part.push(id);
        Ok(())
    }

    /// Both images become one comparison entry, first image first
    async fn image_compare(&self, element: &SourceElement, draft: &mut PageDraft, depth: Depth) -> Result<()> {
        let first = self.image_with_attribution(element, "image_1", "image_1_credit", depth).await?;
        let second = self.image_with_attribution(element, "image_2", "image_2_credit", depth).await?;

        let (first, second) = match (first, second) {
            (Some(first), Some(second)) => (first, second),
            (first, second) => {
                warn!(
                    depth = depth.level(),
                    "{}- WARNING: image comparison needs two images; adding what exists on its own", depth
                );
                draft.has_part.extend(first.into_iter().chain(second));
                return Ok(());
            }
        };

        let title = |credit: &str| {
            element
                .credit(credit)
                .map(|c| c.title.clone())
                .unwrap_or_default()
        };
        let comparison = ImageComparison {
            name: join_localized(&title("image_1_credit"), &title("image_2_credit"), " / "),
            has_part: vec![first, second],
        };
        let id = comparison.create_and_publish(self.target(), self.locales(), depth).await?;
        draft.has_part.push(id);
        Ok(())
    }

    /// Create an image entry from a picture essence and its credit
    ///
    /// `None` when the picture essence is absent. A failed upload still
    /// creates the entry, without its image field.
    pub(crate) async fn image_with_attribution(
        &self,
        element: &SourceElement,
        picture_name: &str,
        credit_name: &str,
        depth: Depth,
    ) -> Result<Option<String>> {
        let Some(picture) = ok_or_report(element.picture(picture_name), depth) else {
            return Ok(None);
        };
        let credit = ok_or_report(element.credit(credit_name), depth)
            .cloned()
            .unwrap_or_default();

        let locale = self.locales().default_target();
        let image = match picture.image_file_uid.get(locale).filter(|uid| !uid.is_empty()) {
            Some(uid) => {
                let upload = ImageUpload {
                    source_id: uid.clone(),
                    title: credit.title.get(locale).cloned(),
                    file_name: picture.image_file_name.get(locale).cloned(),
                    format: picture.image_file_format.get(locale).cloned(),
                };
                match self.assets().ensure(&upload, depth).await {
                    Ok(upload) => Some(upload.asset_id().to_string()),
                    Err(skip) => {
                        report(depth, &skip);
                        report(depth, &Skip::MissingAsset { source_id: uid.clone() });
                        None
                    }
                }
            }
            None => {
                report(
                    depth,
                    &Skip::MissingEssence {
                        element: element.name.clone(),
                        essence: format!("{}.image_file_uid", picture_name),
                    },
                );
                None
            }
        };

        let entry = ImageWithAttribution {
            name: credit.title,
            image,
            creator: credit.author,
            provider: credit.institution,
            license: credit.license,
            url: credit.url,
        };
        let id = entry.create_and_publish(self.target(), self.locales(), depth).await?;
        info!(depth = depth.level(), "{}- image {}", depth, id);
        Ok(Some(id))
    }
}
