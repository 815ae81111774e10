//! JSON Feed (1.0 and 1.1) decoding and normalization.
//!
//! See <https://www.jsonfeed.org/version/1.1/>. Version 1.0 used a single
//! `author` object where 1.1 uses an `authors` array; both are read.

use serde::Deserialize;
use serde_json::Value;

use super::model::{Enclosure, FeedImage, FeedItem, FeedMetadata, FeedType, ParsedFeed};
use super::normalize::{clean_title, dedup_categories, non_empty, null_as_default, parse_date};

/// Substring every JSON Feed `version` URL contains.
const VERSION_MARKER: &str = "jsonfeed.org/version";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JsonFeedDocument {
    pub version: String,
    pub title: Option<String>,
    pub home_page_url: Option<String>,
    pub feed_url: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub favicon: Option<String>,
    pub language: Option<String>,
    pub author: Option<JsonAuthor>,
    #[serde(deserialize_with = "null_as_default")]
    pub authors: Vec<JsonAuthor>,
    #[serde(deserialize_with = "null_as_default")]
    pub items: Vec<JsonFeedItem>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JsonAuthor {
    pub name: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JsonFeedItem {
    /// JSON Feed ids are strings, but numeric ids are common in the wild.
    pub id: Option<Value>,
    pub url: Option<String>,
    pub external_url: Option<String>,
    pub title: Option<String>,
    pub content_html: Option<String>,
    pub content_text: Option<String>,
    pub summary: Option<String>,
    pub image: Option<String>,
    pub banner_image: Option<String>,
    pub date_published: Option<String>,
    pub date_modified: Option<String>,
    pub author: Option<JsonAuthor>,
    #[serde(deserialize_with = "null_as_default")]
    pub authors: Vec<JsonAuthor>,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub attachments: Vec<JsonAttachment>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JsonAttachment {
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    pub mime_type: Option<String>,
    pub size_in_bytes: Option<u64>,
}

/// True when the document carries a JSON Feed version marker.
pub fn is_json_feed(document: &Value) -> bool {
    document
        .get("version")
        .and_then(Value::as_str)
        .is_some_and(|version| version.contains(VERSION_MARKER))
}

/// Number of entries in `items`, counted without decoding any of them.
pub fn item_count(document: &Value) -> usize {
    document
        .get("items")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

pub fn normalize_json(document: JsonFeedDocument, raw: Value) -> ParsedFeed {
    let editor = author_name(document.authors.first().or(document.author.as_ref()));

    let metadata = FeedMetadata {
        title: clean_title(document.title),
        description: non_empty(document.description),
        link: non_empty(document.home_page_url),
        language: non_empty(document.language),
        managing_editor: editor,
        image: non_empty(document.icon)
            .or_else(|| non_empty(document.favicon))
            .map(|url| FeedImage {
                url,
                ..Default::default()
            }),
        ..Default::default()
    };

    ParsedFeed {
        feed_type: FeedType::Json,
        metadata,
        items: document.items.into_iter().map(normalize_item).collect(),
        raw,
    }
}

fn normalize_item(item: JsonFeedItem) -> FeedItem {
    let link = non_empty(item.url)
        .or_else(|| non_empty(item.external_url))
        .unwrap_or_default();

    let guid = item
        .id
        .and_then(|id| match id {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|id| !id.trim().is_empty())
        .or_else(|| (!link.is_empty()).then(|| link.clone()));

    let enclosure = item
        .attachments
        .into_iter()
        .find(|attachment| !attachment.url.trim().is_empty())
        .map(|attachment| Enclosure {
            url: attachment.url,
            mime_type: non_empty(attachment.mime_type),
            length: attachment.size_in_bytes,
        });

    FeedItem {
        title: clean_title(item.title),
        link,
        description: non_empty(item.summary),
        content: non_empty(item.content_html).or_else(|| non_empty(item.content_text)),
        pub_date: item
            .date_published
            .as_deref()
            .and_then(parse_date)
            .or_else(|| item.date_modified.as_deref().and_then(parse_date)),
        guid,
        author: author_name(item.authors.first().or(item.author.as_ref())),
        categories: dedup_categories(item.tags),
        image: non_empty(item.image).or_else(|| non_empty(item.banner_image)),
        enclosure,
    }
}

fn author_name(author: Option<&JsonAuthor>) -> Option<String> {
    author.and_then(|a| non_empty(a.name.clone()).or_else(|| non_empty(a.url.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const JSON_FEED: &str = r#"{
        "version": "https://jsonfeed.org/version/1.1",
        "title": "JSON Example",
        "home_page_url": "https://example.org/",
        "feed_url": "https://example.org/feed.json",
        "description": "A JSON feed",
        "icon": "https://example.org/icon.png",
        "authors": [{ "name": "Ada" }],
        "items": [
            {
                "id": "1",
                "url": "https://example.org/1",
                "title": "First",
                "content_html": "<p>Hello</p>",
                "summary": "Hello summary",
                "image": "https://example.org/1.png",
                "date_published": "2024-02-01T09:00:00Z",
                "tags": ["a", "b", "a"],
                "attachments": [{ "url": "https://example.org/1.mp3", "mime_type": "audio/mpeg", "size_in_bytes": 99 }]
            },
            {
                "id": 2,
                "url": "https://example.org/2",
                "content_text": "Plain text",
                "banner_image": "https://example.org/banner.png",
                "date_published": "yesterday",
                "author": { "name": "Bob" }
            },
            { "external_url": "https://elsewhere.example/3" }
        ]
    }"#;

    fn parsed() -> ParsedFeed {
        let value: Value = serde_json::from_str(JSON_FEED).unwrap();
        let document = JsonFeedDocument::deserialize(&value).unwrap();
        normalize_json(document, value)
    }

    #[test]
    fn test_version_marker_detection() {
        let value: Value = serde_json::from_str(JSON_FEED).unwrap();
        assert!(is_json_feed(&value));
        assert_eq!(item_count(&value), 3);

        let not_feed: Value = serde_json::from_str(r#"{"name":"package","items":[1,2]}"#).unwrap();
        assert!(!is_json_feed(&not_feed));
        let wrong_type: Value = serde_json::from_str(r#"{"version":1}"#).unwrap();
        assert!(!is_json_feed(&wrong_type));
        assert_eq!(item_count(&wrong_type), 0);
    }

    #[test]
    fn test_metadata_mapping() {
        let feed = parsed();
        assert_eq!(feed.feed_type, FeedType::Json);
        assert_eq!(feed.metadata.title, "JSON Example");
        assert_eq!(feed.metadata.link.as_deref(), Some("https://example.org/"));
        assert_eq!(feed.metadata.description.as_deref(), Some("A JSON feed"));
        assert_eq!(feed.metadata.managing_editor.as_deref(), Some("Ada"));
        assert_eq!(
            feed.metadata.image.as_ref().map(|i| i.url.as_str()),
            Some("https://example.org/icon.png")
        );
        assert!(feed.raw.get("items").is_some());
    }

    #[test]
    fn test_null_lists_are_treated_as_empty() {
        let value: Value = serde_json::from_str(
            r#"{
                "version": "https://jsonfeed.org/version/1",
                "title": "Nulls",
                "authors": null,
                "items": [{
                    "id": "1",
                    "url": "https://example.org/1",
                    "authors": null,
                    "tags": null,
                    "attachments": null
                }, {
                    "id": "2",
                    "attachments": [{ "url": null, "mime_type": "audio/mpeg" }]
                }]
            }"#,
        )
        .unwrap();

        let document = JsonFeedDocument::deserialize(&value).unwrap();
        let feed = normalize_json(document, value);

        assert_eq!(feed.metadata.managing_editor, None);
        assert_eq!(feed.items.len(), 2);
        assert!(feed.items[0].categories.is_empty());
        assert_eq!(feed.items[0].enclosure, None);
        assert_eq!(feed.items[1].enclosure, None);
    }

    #[test]
    fn test_item_mapping() {
        let feed = parsed();
        assert_eq!(feed.items.len(), 3);

        let first = &feed.items[0];
        assert_eq!(first.guid.as_deref(), Some("1"));
        assert_eq!(first.description.as_deref(), Some("Hello summary"));
        assert_eq!(first.content.as_deref(), Some("<p>Hello</p>"));
        assert_eq!(first.image.as_deref(), Some("https://example.org/1.png"));
        assert_eq!(first.categories, vec!["a", "b"]);
        assert!(first.pub_date.is_some());
        assert_eq!(first.enclosure.as_ref().unwrap().length, Some(99));

        let second = &feed.items[1];
        assert_eq!(second.guid.as_deref(), Some("2"));
        assert_eq!(second.title, "");
        assert_eq!(second.content.as_deref(), Some("Plain text"));
        assert_eq!(second.image.as_deref(), Some("https://example.org/banner.png"));
        assert_eq!(second.pub_date, None);
        assert_eq!(second.author.as_deref(), Some("Bob"));

        let third = &feed.items[2];
        assert_eq!(third.link, "https://elsewhere.example/3");
        assert_eq!(third.guid.as_deref(), Some("https://elsewhere.example/3"));
    }
}
