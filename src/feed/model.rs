use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source syndication format of a [`ParsedFeed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    Rss,
    Atom,
    Json,
}

impl std::fmt::Display for FeedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FeedType::Rss => "rss",
            FeedType::Atom => "atom",
            FeedType::Json => "json",
        })
    }
}

/// Canonical representation of any feed, whatever format it arrived in.
///
/// Items keep source document order. `raw` holds a serialized copy of the
/// decoded source document for passthrough and debugging; nothing in the
/// pipeline reads it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFeed {
    #[serde(rename = "type")]
    pub feed_type: FeedType,
    pub metadata: FeedMetadata,
    pub items: Vec<FeedItem>,
    pub raw: serde_json::Value,
}

/// Channel-level fields. `title` is always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedMetadata {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managing_editor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_master: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_build_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<FeedImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedImage {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// A single entry. `title` and `link` are never absent; missing values
/// normalize to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Full HTML body, when the source carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<Enclosure>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

/// Why a parse attempt failed.
///
/// The first five come out of the error classifier. The last two are policy
/// violations detected by the pipeline itself and skip classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCategory {
    Http,
    Network,
    Cors,
    Parse,
    Unknown,
    ItemCountExceeded,
    SizeExceeded,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Http => "http",
            FailureCategory::Network => "network",
            FailureCategory::Cors => "cors",
            FailureCategory::Parse => "parse",
            FailureCategory::Unknown => "unknown",
            FailureCategory::ItemCountExceeded => "item-count-exceeded",
            FailureCategory::SizeExceeded => "size-exceeded",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a parse request.
///
/// Failures are values, not errors: timeouts, HTTP errors, malformed
/// documents and oversized feeds all come back as `success == false` with an
/// actionable `error` message. Failed results are cached like successes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedParseResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed: Option<ParsedFeed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
    /// HTTP status observed on the failing request, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl FeedParseResult {
    pub fn success(feed: ParsedFeed) -> Self {
        Self {
            success: true,
            feed: Some(feed),
            error: None,
            category: None,
            status: None,
        }
    }

    pub fn failure(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            success: false,
            feed: None,
            error: Some(message.into()),
            category: Some(category),
            status: None,
        }
    }

    pub fn with_status(mut self, status: Option<u16>) -> Self {
        self.status = status;
        self
    }
}
