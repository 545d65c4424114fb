//! The six entry kinds

use chrono::{DateTime, Utc};
use exmig_common::{LocaleMap, LocalizedValue};

use super::fields::{
    as_asset_link, as_date, as_entry_link, as_entry_links, as_license_uri, as_markdown, long_text,
    normalize_record_uri, short_text, trim,
};
use super::{EntryModel, FieldSet};
use crate::markdown;
use crate::target::Fields;

/// Headline of a rich text entry that has none of its own
pub const RICH_TEXT_PLACEHOLDER: &str = "Exhibition rich text";

/// Name of an embed entry that has none of its own
pub const EMBED_PLACEHOLDER: &str = "Exhibition embed";

type Text = LocalizedValue<String>;

/// Single entry id stored under the canonical locale
fn canonical_id(id: &Option<String>, locales: &LocaleMap) -> Text {
    match id {
        Some(id) => LocalizedValue::canonical(id.clone(), locales),
        None => LocalizedValue::empty(),
    }
}

/// Ordered entry ids stored under the canonical locale
fn canonical_ids(ids: &[String], locales: &LocaleMap) -> LocalizedValue<Vec<String>> {
    LocalizedValue::canonical(ids.to_vec(), locales)
}

// ============================================================================
// Pages
// ============================================================================

/// Top-level exhibition page
#[derive(Debug, Clone, Default)]
pub struct ExhibitionPage {
    pub name: Text,
    pub identifier: Text,
    pub headline: Text,
    pub description: Text,
    /// HTML; rendered as Markdown
    pub text: Text,
    pub primary_image_of_page: Option<String>,
    pub date_published: LocalizedValue<DateTime<Utc>>,
    pub has_part: Vec<String>,
    /// Markdown
    pub credits: Text,
}

impl EntryModel for ExhibitionPage {
    const CONTENT_TYPE: &'static str = "exhibitionPage";

    fn fields(&self, locales: &LocaleMap) -> Fields {
        FieldSet::new()
            .with("name", &short_text(&self.name))
            .with("identifier", &short_text(&self.identifier))
            .with("headline", &short_text(&self.headline))
            .with("description", &short_text(&self.description))
            .with("text", &long_text(&as_markdown(&self.text)))
            .with(
                "primaryImageOfPage",
                &as_entry_link(&canonical_id(&self.primary_image_of_page, locales)),
            )
            .with("datePublished", &as_date(&self.date_published))
            .with("hasPart", &as_entry_links(&canonical_ids(&self.has_part, locales)))
            .with("credits", &long_text(&self.credits))
            .build()
    }
}

/// Chapter of an exhibition
#[derive(Debug, Clone, Default)]
pub struct ExhibitionChapter {
    pub name: Text,
    pub identifier: Text,
    pub headline: Text,
    pub description: Text,
    pub primary_image_of_page: Option<String>,
    pub has_part: Vec<String>,
}

impl EntryModel for ExhibitionChapter {
    const CONTENT_TYPE: &'static str = "exhibitionChapterPage";

    fn fields(&self, locales: &LocaleMap) -> Fields {
        FieldSet::new()
            .with("name", &short_text(&self.name))
            .with("identifier", &short_text(&self.identifier))
            .with("headline", &short_text(&self.headline))
            .with("description", &short_text(&self.description))
            .with(
                "primaryImageOfPage",
                &as_entry_link(&canonical_id(&self.primary_image_of_page, locales)),
            )
            .with("hasPart", &as_entry_links(&canonical_ids(&self.has_part, locales)))
            .build()
    }
}

// ============================================================================
// Content fragments
// ============================================================================

/// Block of rich text, accumulated from essence fragments in document order
#[derive(Debug, Clone, Default)]
pub struct RichText {
    pub headline: Text,
    /// HTML; rendered as Markdown
    pub text: Text,
}

impl RichText {
    pub fn add_title(&mut self, title: &Text) {
        self.text.append_with(title, |v| format!("<h2>{}</h2>", v));
    }

    pub fn add_sub_title(&mut self, sub_title: &Text) {
        self.text.append_with(sub_title, |v| format!("<p><strong>{}</strong></p>", v));
    }

    pub fn add_quote(&mut self, quote: &Text) {
        self.text.append_with(quote, |v| format!("<blockquote>{}</blockquote>", v));
    }

    pub fn add_quotee(&mut self, quotee: &Text) {
        self.text.append_with(quotee, |v| format!("<p><cite>{}</cite></p>", v));
    }

    pub fn add_html(&mut self, html: &Text) {
        self.text.append(html);
    }

    /// Own headline, else each locale's first `<h1>`, else the placeholder
    fn effective_headline(&self, locales: &LocaleMap) -> Text {
        if !self.headline.is_empty() {
            return self.headline.clone();
        }
        let mut from_body = Text::empty();
        for (locale, html) in self.text.present() {
            if let Some(h1) = markdown::first_h1(html) {
                from_body.set(locale, h1);
            }
        }
        if from_body.is_empty() {
            LocalizedValue::canonical(RICH_TEXT_PLACEHOLDER.to_string(), locales)
        } else {
            from_body
        }
    }
}

impl EntryModel for RichText {
    const CONTENT_TYPE: &'static str = "richText";

    fn fields(&self, locales: &LocaleMap) -> Fields {
        FieldSet::new()
            .with("headline", &short_text(&self.effective_headline(locales)))
            .with("text", &long_text(&as_markdown(&self.text)))
            .build()
    }
}

/// Raw HTML embed
#[derive(Debug, Clone, Default)]
pub struct Embed {
    pub name: Text,
    pub embed: Text,
}

impl EntryModel for Embed {
    const CONTENT_TYPE: &'static str = "embed";

    fn fields(&self, locales: &LocaleMap) -> Fields {
        let name = if self.name.is_empty() {
            LocalizedValue::canonical(EMBED_PLACEHOLDER.to_string(), locales)
        } else {
            self.name.clone()
        };
        FieldSet::new()
            .with("name", &short_text(&name))
            .with("embed", &long_text(&self.embed))
            .build()
    }
}

/// Image asset with its credit line
#[derive(Debug, Clone, Default)]
pub struct ImageWithAttribution {
    pub name: Text,
    /// Asset id
    pub image: Option<String>,
    pub creator: Text,
    pub provider: Text,
    /// License code, rendered as a rights statement URL
    pub license: Text,
    pub url: Text,
}

impl EntryModel for ImageWithAttribution {
    const CONTENT_TYPE: &'static str = "imageWithAttribution";

    fn fields(&self, locales: &LocaleMap) -> Fields {
        FieldSet::new()
            .with("name", &short_text(&self.name))
            .with("image", &as_asset_link(&canonical_id(&self.image, locales)))
            .with("creator", &short_text(&self.creator))
            .with("provider", &short_text(&self.provider))
            .with("license", &as_license_uri(&self.license))
            .with("url", &short_text(&normalize_record_uri(&trim(&self.url))))
            .build()
    }
}

/// Two images shown side by side
#[derive(Debug, Clone, Default)]
pub struct ImageComparison {
    pub name: Text,
    /// Exactly the two images, first then second
    pub has_part: Vec<String>,
}

impl EntryModel for ImageComparison {
    const CONTENT_TYPE: &'static str = "imageComparison";

    fn fields(&self, locales: &LocaleMap) -> Fields {
        FieldSet::new()
            .with("name", &short_text(&self.name))
            .with("hasPart", &as_entry_links(&canonical_ids(&self.has_part, locales)))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn en(value: &str) -> Text {
        LocalizedValue::new(value.to_string(), "en-GB")
    }

    #[test]
    fn test_exhibition_page_fields() {
        let locales = LocaleMap::default();
        let page = ExhibitionPage {
            name: en("Faces of Europe"),
            identifier: en("faces"),
            text: en("<p>Welcome</p>"),
            primary_image_of_page: Some("img1".to_string()),
            date_published: LocalizedValue::new(
                Utc.with_ymd_and_hms(2018, 5, 4, 0, 0, 0).unwrap(),
                "en-GB",
            ),
            has_part: vec!["c1".to_string(), "c2".to_string()],
            ..Default::default()
        };

        let fields = page.fields(&locales);
        assert_eq!(fields["identifier"], json!({"en-GB": "faces"}));
        assert_eq!(
            fields["primaryImageOfPage"],
            json!({"en-GB": {"sys": {"type": "Link", "linkType": "Entry", "id": "img1"}}})
        );
        assert_eq!(fields["hasPart"]["en-GB"][1]["sys"]["id"], json!("c2"));
        assert_eq!(fields["datePublished"], json!({"en-GB": "2018-05-04T00:00:00.000Z"}));
        assert!(fields["text"]["en-GB"].as_str().unwrap().contains("Welcome"));
        assert!(!fields.contains_key("headline"));
        assert!(!fields.contains_key("credits"));
    }

    #[test]
    fn test_rich_text_accumulates_in_order() {
        let mut rich = RichText::default();
        rich.add_title(&en("Title"));
        rich.add_sub_title(&en("Sub"));
        rich.add_html(&en("<p>Body</p>"));
        rich.add_quote(&en("Quote"));
        rich.add_quotee(&en("Someone"));
        rich.add_quote(&Text::empty());

        assert_eq!(
            rich.text.get("en-GB").map(String::as_str),
            Some("<h2>Title</h2><p><strong>Sub</strong></p><p>Body</p><blockquote>Quote</blockquote><p><cite>Someone</cite></p>")
        );
    }

    #[test]
    fn test_rich_text_headline_fallbacks() {
        let locales = LocaleMap::default();

        let mut with_h1 = RichText::default();
        with_h1.add_html(&en("<h1>Heading</h1><p>Body</p>"));
        assert_eq!(with_h1.fields(&locales)["headline"], json!({"en-GB": "Heading"}));

        let mut plain = RichText::default();
        plain.add_html(&en("<p>Body</p>"));
        assert_eq!(
            plain.fields(&locales)["headline"],
            json!({"en-GB": RICH_TEXT_PLACEHOLDER})
        );
    }

    #[test]
    fn test_image_with_attribution_fields() {
        let locales = LocaleMap::default();
        let image = ImageWithAttribution {
            name: en("Portrait"),
            image: Some("abc".to_string()),
            license: en("not-a-license"),
            url: en("  https://www.europeana.eu/portal/de/record/123/xyz.html "),
            ..Default::default()
        };

        let fields = image.fields(&locales);
        assert_eq!(fields["image"]["en-GB"]["sys"]["linkType"], json!("Asset"));
        assert_eq!(fields["url"], json!({"en-GB": "http://data.europeana.eu/item/123/xyz"}));
        assert!(!fields.contains_key("license"));
        assert!(!fields.contains_key("creator"));
    }

    #[test]
    fn test_image_without_asset_omits_image_field() {
        let image = ImageWithAttribution {
            name: en("Portrait"),
            ..Default::default()
        };
        assert!(!image.fields(&LocaleMap::default()).contains_key("image"));
    }

    #[test]
    fn test_embed_name_placeholder() {
        let embed = Embed {
            embed: en("<iframe src=\"https://example.org\"></iframe>"),
            ..Default::default()
        };
        let fields = embed.fields(&LocaleMap::default());
        assert_eq!(fields["name"], json!({"en-GB": EMBED_PLACEHOLDER}));
        assert_eq!(
            fields["embed"],
            json!({"en-GB": "<iframe src=\"https://example.org\"></iframe>"})
        );
    }

    #[test]
    fn test_image_comparison_keeps_order() {
        let comparison = ImageComparison {
            name: en("A / B"),
            has_part: vec!["first".to_string(), "second".to_string()],
        };
        let fields = comparison.fields(&LocaleMap::default());
        assert_eq!(fields["hasPart"]["en-GB"][0]["sys"]["id"], json!("first"));
        assert_eq!(fields["hasPart"]["en-GB"][1]["sys"]["id"], json!("second"));
    }
}
