//! Normalization of decoded RSS/Atom documents into [`ParsedFeed`].
//!
//! The XML decoder produces a loose [`RawFeed`] whose field names follow the
//! usual RSS vocabulary (`pubDate`, `content:encoded`, `contentSnippet`, ...).
//! Normalization then applies a fixed precedence per field:
//!
//! - description: `contentSnippet`, else `description`
//! - content: `content`, else `content:encoded`
//! - image: `thumbnail` (or `image`), else the first `<img src>` found in the
//!   content or description
//! - guid: `guid`, else `id`, else the item link
//! - dates: parsed leniently; an unparseable date becomes `None`
//!
//! Every rule prefers a field that a [`ParsedFeed`] itself serializes, so a
//! normalized feed fed back in as raw input comes out with the same values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::model::{Enclosure, FeedImage, FeedItem, FeedMetadata, FeedType, ParsedFeed};
use crate::util::strip_control_chars;

/// Decoded RSS/Atom document before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    /// The document's self link, when it declares one.
    pub feed_url: Option<String>,
    pub language: Option<String>,
    pub copyright: Option<String>,
    pub managing_editor: Option<String>,
    pub web_master: Option<String>,
    pub pub_date: Option<String>,
    pub last_build_date: Option<String>,
    pub image: Option<RawImage>,
    pub items: Vec<RawItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawImage {
    pub url: Option<String>,
    pub title: Option<String>,
    pub link: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub content_snippet: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "content:encoded")]
    pub content_encoded: Option<String>,
    pub pub_date: Option<String>,
    pub iso_date: Option<String>,
    pub guid: Option<String>,
    pub id: Option<String>,
    #[serde(alias = "creator")]
    pub author: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub categories: Vec<String>,
    #[serde(alias = "image")]
    pub thumbnail: Option<String>,
    pub enclosure: Option<RawEnclosure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEnclosure {
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    pub length: Option<u64>,
}

/// Normalizes a decoded RSS/Atom document.
///
/// `raw` is the serialized source document kept on the result for
/// passthrough; it is stored as-is.
pub fn normalize_feed(feed: RawFeed, feed_type: FeedType, raw: serde_json::Value) -> ParsedFeed {
    let metadata = FeedMetadata {
        title: clean_title(feed.title),
        description: non_empty(feed.description),
        link: non_empty(feed.link),
        language: non_empty(feed.language),
        copyright: non_empty(feed.copyright),
        managing_editor: non_empty(feed.managing_editor),
        web_master: non_empty(feed.web_master),
        pub_date: feed.pub_date.as_deref().and_then(parse_date),
        last_build_date: feed.last_build_date.as_deref().and_then(parse_date),
        image: feed.image.and_then(normalize_image),
    };

    ParsedFeed {
        feed_type,
        metadata,
        items: feed.items.into_iter().map(normalize_item).collect(),
        raw,
    }
}

fn normalize_image(image: RawImage) -> Option<FeedImage> {
    let url = non_empty(image.url)?;
    Some(FeedImage {
        url,
        title: non_empty(image.title),
        link: non_empty(image.link),
        width: image.width,
        height: image.height,
    })
}

fn normalize_item(item: RawItem) -> FeedItem {
    let link = non_empty(item.link).unwrap_or_default();
    let description = non_empty(item.content_snippet).or_else(|| non_empty(item.description));
    let content = non_empty(item.content).or_else(|| non_empty(item.content_encoded));

    let image = non_empty(item.thumbnail)
        .or_else(|| content.as_deref().and_then(extract_first_image))
        .or_else(|| description.as_deref().and_then(extract_first_image));

    let guid = non_empty(item.guid)
        .or_else(|| non_empty(item.id))
        .or_else(|| (!link.is_empty()).then(|| link.clone()));

    let pub_date = item
        .pub_date
        .as_deref()
        .and_then(parse_date)
        .or_else(|| item.iso_date.as_deref().and_then(parse_date));

    let enclosure = item.enclosure.and_then(|enclosure| {
        Some(Enclosure {
            url: non_empty(enclosure.url)?,
            mime_type: non_empty(enclosure.mime_type),
            length: enclosure.length,
        })
    });

    FeedItem {
        title: clean_title(item.title),
        link,
        description,
        content,
        pub_date,
        guid,
        author: non_empty(item.author),
        categories: dedup_categories(item.categories),
        image,
        enclosure,
    }
}

/// Reads an explicit `null` as the type's default. Hand-written documents
/// often carry `"tags": null` where the field is simply absent.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn clean_title(title: Option<String>) -> String {
    match title {
        Some(t) => strip_control_chars(&t).into_owned(),
        None => String::new(),
    }
}

/// Treats whitespace-only strings as absent.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Drops blank and repeated categories, keeping first-seen order.
pub(crate) fn dedup_categories(categories: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    categories
        .into_iter()
        .map(|c| c.trim().to_owned())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}

/// Parses the date formats found in the wild: RFC 3339 (Atom, JSON Feed),
/// RFC 2822 (RSS), and a couple of bare forms. Returns `None` rather than an
/// error; date validity is a linting concern.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    tracing::trace!(value = %value, "Unparseable feed date");
    None
}

/// Returns the `src` of the first `<img>` tag in an HTML fragment.
///
/// Simple string scanning, not an HTML parser: handles single, double and
/// unquoted attribute values and any attribute order. Anything stranger
/// (comments, CDATA, `srcset`-only images) is missed.
pub fn extract_first_image(html: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `html`
    let lower = html.to_ascii_lowercase();
    let mut search_from = 0;

    while let Some(offset) = lower[search_from..].find("<img") {
        let tag_start = search_from + offset;
        let tag_end = lower[tag_start..]
            .find('>')
            .map(|pos| tag_start + pos)
            .unwrap_or(lower.len());

        if let Some(src) = find_src_attr(&html[tag_start..tag_end], &lower[tag_start..tag_end]) {
            return Some(src);
        }

        search_from = tag_end;
    }

    None
}

fn find_src_attr(tag: &str, lower: &str) -> Option<String> {
    let bytes = lower.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = lower[search_from..].find("src") {
        let start = search_from + offset;
        search_from = start + 3;

        // Must be a standalone attribute name, not `data-src` or `srcset`
        if start == 0 || !bytes[start - 1].is_ascii_whitespace() {
            continue;
        }

        let mut i = start + 3;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }

        let value = match bytes[i] {
            quote @ (b'"' | b'\'') => {
                let inner = &tag[i + 1..];
                let end = inner.find(quote as char)?;
                &inner[..end]
            }
            _ => {
                let rest = &tag[i..];
                let end = rest
                    .find(|c: char| c.is_ascii_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                rest[..end].trim_end_matches('/')
            }
        };

        let value = value.trim();
        if !value.is_empty() {
            return Some(value.to_owned());
        }
    }

    None
}
