//! Field transforms
//!
//! Pure functions from one [`LocalizedValue`] to another, applied when an
//! entry model renders its fields. None of them add or drop locales.

use chrono::{DateTime, SecondsFormat, Utc};
use exmig_common::LocalizedValue;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::markdown;
use crate::target::Link;

/// Maximum length of a short text field, in UTF-16 code units
pub const MAX_LENGTH_SHORT: usize = 255;

/// Maximum length of a long text field, in UTF-16 code units
pub const MAX_LENGTH_LONG: usize = 2000;

static RECORD_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"europeana\.eu/portal/([a-z][a-z]/)?record(/[0-9]+/[^/.#$]+)").unwrap()
});

const ITEM_URI_BASE: &str = "http://data.europeana.eu/item";

/// Cut `value` to at most `max` UTF-16 code units without splitting a char
pub fn truncate_utf16(value: &str, max: usize) -> String {
    let mut units = 0;
    let mut end = value.len();
    for (index, c) in value.char_indices() {
        units += c.len_utf16();
        if units > max {
            end = index;
            break;
        }
    }
    value[..end].to_string()
}

pub fn short_text(value: &LocalizedValue<String>) -> LocalizedValue<String> {
    value.map(|_, v| truncate_utf16(v, MAX_LENGTH_SHORT))
}

pub fn long_text(value: &LocalizedValue<String>) -> LocalizedValue<String> {
    value.map(|_, v| truncate_utf16(v, MAX_LENGTH_LONG))
}

pub fn trim(value: &LocalizedValue<String>) -> LocalizedValue<String> {
    value.map(|_, v| v.trim().to_string())
}

/// Render dates the way the platform stores them (RFC 3339, UTC, millis)
pub fn as_date(value: &LocalizedValue<DateTime<Utc>>) -> LocalizedValue<String> {
    value.map(|_, v| v.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub fn as_entry_link(value: &LocalizedValue<String>) -> LocalizedValue<Link> {
    value.map(|_, id| Link::entry(id.clone()))
}

pub fn as_entry_links(value: &LocalizedValue<Vec<String>>) -> LocalizedValue<Vec<Link>> {
    value.map_items(|_, id| Link::entry(id.clone()))
}

pub fn as_asset_link(value: &LocalizedValue<String>) -> LocalizedValue<Link> {
    value.map(|_, id| Link::asset(id.clone()))
}

/// Rights statement URL for a license code; unknown codes map to ""
pub fn license_uri(code: &str) -> &'static str {
    match code {
        "public" => "https://creativecommons.org/publicdomain/mark/1.0/",
        "CC0" => "https://creativecommons.org/publicdomain/zero/1.0/",
        "CC_BY" => "https://creativecommons.org/licenses/by/1.0",
        "CC_BY_SA" => "https://creativecommons.org/licenses/by-sa/1.0",
        "CC_BY_ND" => "https://creativecommons.org/licenses/by-nc-nd/1.0",
        "CC_BY_NC" => "https://creativecommons.org/licenses/by-nc/1.0",
        "CC_BY_NC_SA" => "https://creativecommons.org/licenses/by-nc-sa/1.0",
        "CC_BY_NC_ND" => "https://creativecommons.org/licenses/by-nc-nd/1.0",
        "RS_INC_EDU" => "http://rightsstatements.org/vocab/InC-EDU/1.0/",
        "RS_NOC_OKLR" => "http://rightsstatements.org/vocab/NoC-OKLR/1.0/",
        "RS_INC" => "http://rightsstatements.org/vocab/InC/1.0/",
        "RS_NOC_NC" => "http://rightsstatements.org/vocab/NoC-NC/1.0/",
        "RS_INC_OW_EU" => "http://rightsstatements.org/vocab/InC-OW-EU/1.0/",
        "RS_CNE" => "http://rightsstatements.org/vocab/CNE/1.0/",
        _ => "",
    }
}

pub fn as_license_uri(value: &LocalizedValue<String>) -> LocalizedValue<String> {
    value.map(|_, code| license_uri(code).to_string())
}

pub fn as_markdown(value: &LocalizedValue<String>) -> LocalizedValue<String> {
    value.map(|_, html| markdown::to_markdown(html))
}

/// Rewrite portal record page URLs to the canonical item URI
pub fn record_uri(url: &str) -> String {
    match RECORD_URI.captures(url).and_then(|c| c.get(2)) {
        Some(item) => format!("{}{}", ITEM_URI_BASE, item.as_str()),
        None => url.to_string(),
    }
}

pub fn normalize_record_uri(value: &LocalizedValue<String>) -> LocalizedValue<String> {
    value.map(|_, url| record_uri(url))
}
