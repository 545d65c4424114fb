//! Translation alignment
//!
//! A translated page may only lend its values to the default-language tree
//! when both trees have exactly the same shape: same elements in the same
//! order, and within each element the same essences in the same order. Any
//! difference disqualifies the whole page/language pair.

use exmig_common::{Depth, LocalizedValue};
use std::fmt;
use tracing::info;

use crate::error::{report, MigrationError, Result, Skip};
use crate::source::{ContentTreeLoader, SourcePage};

/// First structural difference between two page trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    ElementCount(usize, usize),
    ElementName(String, String),
    EssenceCount {
        element: String,
        expected: usize,
        found: usize,
    },
    EssenceName {
        element: String,
        expected: String,
        found: String,
    },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ElementCount(a, b) => write!(f, "Element count mismatch: {}, {}", a, b),
            Self::ElementName(a, b) => write!(f, "Element name mismatch: {}, {}", a, b),
            Self::EssenceCount {
                element,
                expected,
                found,
            } => write!(
                f,
                "Element \"{}\" essence count mismatch: {}, {}",
                element, expected, found
            ),
            Self::EssenceName {
                element,
                expected,
                found,
            } => write!(
                f,
                "Element \"{}\" essence name mismatch: {}, {}",
                element, expected, found
            ),
        }
    }
}

/// Check that `translated` has exactly the shape of `page`
pub fn check_alignment(page: &SourcePage, translated: &SourcePage) -> std::result::Result<(), Mismatch> {
    if page.elements.len() != translated.elements.len() {
        return Err(Mismatch::ElementCount(page.elements.len(), translated.elements.len()));
    }

    for (element, other) in page.elements.iter().zip(&translated.elements) {
        if element.name != other.name {
            return Err(Mismatch::ElementName(element.name.clone(), other.name.clone()));
        }
        if element.essences.len() != other.essences.len() {
            return Err(Mismatch::EssenceCount {
                element: element.name.clone(),
                expected: element.essences.len(),
                found: other.essences.len(),
            });
        }
        for (essence, other_essence) in element.essences.iter().zip(&other.essences) {
            if essence.name != other_essence.name {
                return Err(Mismatch::EssenceName {
                    element: element.name.clone(),
                    expected: essence.name.clone(),
                    found: other_essence.name.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Copy a translated value into `field` when it is present and differs
/// from the default-locale value
fn splice_field(
    field: &mut LocalizedValue<String>,
    from_locale: &str,
    translated: &LocalizedValue<String>,
    to_locale: &str,
) {
    let Some(value) = translated.get(to_locale).filter(|v| !v.is_empty()) else {
        return;
    };
    if field.get(from_locale) != Some(value) {
        field.set(to_locale, value.clone());
    }
}

/// Splice the values of an aligned `translated` tree into `page`
///
/// Callers must have checked alignment first; essences are paired by
/// position and fields by name.
pub fn splice(page: &mut SourcePage, translated: &SourcePage) {
    let from_locale = page.locale.clone();
    let to_locale = translated.locale.as_str();

    splice_field(
        &mut page.meta_description,
        &from_locale,
        &translated.meta_description,
        to_locale,
    );

    for (element, other) in page.elements.iter_mut().zip(&translated.elements) {
        for (essence, other_essence) in element.essences.iter_mut().zip(&other.essences) {
            let other_fields = other_essence.payload.fields();
            for (name, field) in essence.payload.fields_mut() {
                if let Some((_, other_field)) = other_fields.iter().find(|(n, _)| *n == name) {
                    splice_field(field, &from_locale, other_field, to_locale);
                }
            }
        }
    }
}

/// Result of comparing a page with one of its translations
#[derive(Debug)]
pub enum Alignment {
    /// Same shape; holds the translated tree
    Aligned(Box<SourcePage>),
    Misaligned(Mismatch),
    /// Translation could not be loaded
    Unavailable(String),
}

/// Loads translations and splices those that align
#[derive(Clone)]
pub struct TranslationAligner {
    loader: ContentTreeLoader,
}

impl TranslationAligner {
    pub fn new(loader: ContentTreeLoader) -> Self {
        Self { loader }
    }

    pub fn loader(&self) -> &ContentTreeLoader {
        &self.loader
    }

    /// Load `page` in `language_code` and compare shapes
    pub async fn compare(&self, page: &SourcePage, language_code: &str, depth: Depth) -> Result<Alignment> {
        if self.loader.locales().target_for(language_code).is_none() {
            return Ok(Alignment::Unavailable(format!(
                "no target locale mapped for \"{}\"",
                language_code
            )));
        }

        let translated = match self.loader.load(&page.urlname, language_code, depth).await {
            Ok(translated) => translated,
            Err(MigrationError::PageNotFound { .. }) => {
                return Ok(Alignment::Unavailable("translated page not found".to_string()))
            }
            Err(e) => return Err(e),
        };

        Ok(match check_alignment(page, &translated) {
            Ok(()) => Alignment::Aligned(Box::new(translated)),
            Err(mismatch) => Alignment::Misaligned(mismatch),
        })
    }

    /// `page` with the values of `language_code` spliced in, or `None` when
    /// that translation is skipped
    pub async fn align(&self, page: &SourcePage, language_code: &str, depth: Depth) -> Result<Option<SourcePage>> {
        match self.compare(page, language_code, depth).await? {
            Alignment::Aligned(translated) => {
                let mut spliced = page.clone();
                splice(&mut spliced, &translated);
                Ok(Some(spliced))
            }
            Alignment::Misaligned(mismatch) => {
                report(
                    depth,
                    &Skip::Misaligned {
                        language: language_code.to_string(),
                        mismatch,
                    },
                );
                Ok(None)
            }
            Alignment::Unavailable(reason) => {
                report(
                    depth,
                    &Skip::TranslationUnavailable {
                        language: language_code.to_string(),
                        reason,
                    },
                );
                Ok(None)
            }
        }
    }

    /// Splice every aligned sibling language into `page`
    pub async fn translate(&self, mut page: SourcePage, depth: Depth) -> Result<SourcePage> {
        for language in page.other_language_codes.clone() {
            info!(depth = depth.level(), "{}Translating \"{}\" to {}", depth, page.urlname, language);
            if let Some(spliced) = self.align(&page, &language, depth.deeper()).await? {
                page = spliced;
            }
        }
        Ok(page)
    }

    /// Load `urlname` in the default language with all aligned translations
    pub async fn load_translated(&self, urlname: &str, depth: Depth) -> Result<SourcePage> {
        let page = self.loader.load_default(urlname, depth).await?;
        self.translate(page, depth).await
    }

    /// Log whether each sibling language of `page` aligns
    pub async fn analyse(&self, page: &SourcePage, depth: Depth) -> Result<Vec<(String, Alignment)>> {
        info!(depth = depth.level(), "{}{}:", depth, page.urlname);
        if page.other_language_codes.is_empty() {
            info!(depth = depth.level(), "{}- [no translations found]", depth);
        }

        let mut results = Vec::new();
        for language in &page.other_language_codes {
            let locale = self.loader.locales().target_for(language).unwrap_or(language.as_str()).to_string();
            let alignment = self.compare(page, language, depth.deeper()).await?;
            match &alignment {
                Alignment::Aligned(_) => {
                    info!(depth = depth.level(), "{}- {} => {}: ✔", depth, page.language_code, locale)
                }
                Alignment::Misaligned(mismatch) => info!(
                    depth = depth.level(),
                    "{}- {} => {}: ✘ {}", depth, page.language_code, locale, mismatch
                ),
                Alignment::Unavailable(reason) => info!(
                    depth = depth.level(),
                    "{}- {} => {}: ✘ {}", depth, page.language_code, locale, reason
                ),
            }
            results.push((language.clone(), alignment));
        }
        Ok(results)
    }
}
