//! HTML → Markdown conversion
//!
//! Source rich text is HTML; the target platform stores Markdown.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

/// Wide enough that paragraphs are never re-wrapped
const RENDER_WIDTH: usize = 10_000;

static EXCESS_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Convert an HTML fragment to Markdown
pub fn to_markdown(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let markdown = html2text::from_read(html.as_bytes(), RENDER_WIDTH).unwrap_or_default();
    let trimmed: Vec<&str> = markdown.lines().map(str::trim_end).collect();
    EXCESS_BLANK_LINES
        .replace_all(&trimmed.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Text of the first `<h1>` in an HTML fragment, if it has any
pub fn first_h1(html: &str) -> Option<String> {
    let selector = Selector::parse("h1").ok()?;
    let fragment = Html::parse_fragment(html);
    fragment
        .select(&selector)
        .map(|h1| h1.text().collect::<String>().trim().to_string())
        .find(|text| !text.is_empty())
}

/// Markdown image pointing at `url`
pub fn image(url: &str) -> String {
    format!("![]({})", url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_markdown_strips_tags_and_keeps_text() {
        let markdown = to_markdown("<p>First paragraph.</p><p>Second <em>one</em>.</p>");
        assert!(markdown.contains("First paragraph."));
        assert!(markdown.contains("Second"));
        assert!(!markdown.contains("<p>"));
        assert!(!markdown.contains("\n\n\n"));
    }

    #[test]
    fn test_to_markdown_blank_input() {
        assert_eq!(to_markdown(""), "");
        assert_eq!(to_markdown("   "), "");
    }

    #[test]
    fn test_first_h1() {
        assert_eq!(
            first_h1("<p>intro</p><h1> Main title </h1><h1>Other</h1>"),
            Some("Main title".to_string())
        );
        assert_eq!(first_h1("<h2>Not a headline</h2>"), None);
        assert_eq!(first_h1("<h1>  </h1>"), None);
    }

    #[test]
    fn test_image() {
        assert_eq!(image("https://images.example/a.jpg"), "![](https://images.example/a.jpg)");
    }
}
