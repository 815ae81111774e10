use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::classify::classify;
use super::json::{self, JsonFeedDocument};
use super::model::{FailureCategory, FeedParseResult, ParsedFeed};
use super::normalize::normalize_feed;
use super::size::FeedLimits;
use super::transport::{FetchRequest, Transport, TransportError};
use super::xml;

/// Default deadline for the primary (XML) fetch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default deadline for the JSON Feed fallback fetch.
pub const DEFAULT_JSON_TIMEOUT: Duration = Duration::from_secs(10);

const XML_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.9, */*;q=0.8";
const JSON_ACCEPT: &str = "application/json";

/// Why one format attempt failed. Kept internal: callers only ever see the
/// classified [`FeedParseResult`].
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("HTTP error: {status} {status_text}")]
    HttpStatus { status: u16, status_text: String },
    #[error(transparent)]
    Xml(#[from] xml::XmlError),
    #[error("Unable to parse JSON feed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Response is JSON but not a JSON Feed (missing version marker)")]
    NotJsonFeed,
}

impl AttemptError {
    fn http_status(&self) -> Option<(u16, &str)> {
        match self {
            AttemptError::HttpStatus {
                status,
                status_text,
            } => Some((*status, status_text.as_str())),
            _ => None,
        }
    }
}

/// Fetch-and-parse orchestrator.
///
/// Tries RSS/Atom first, then falls back to JSON Feed. Every predictable
/// failure (transport, HTTP status, malformed document, policy limit) is
/// returned as a failed [`FeedParseResult`]; `parse` itself never errors.
pub struct FeedParser {
    transport: Arc<dyn Transport>,
    limits: FeedLimits,
    timeout: Duration,
    json_timeout: Duration,
}

impl FeedParser {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            limits: FeedLimits::default(),
            timeout: DEFAULT_TIMEOUT,
            json_timeout: DEFAULT_JSON_TIMEOUT,
        }
    }

    pub fn with_limits(mut self, limits: FeedLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeouts(mut self, timeout: Duration, json_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.json_timeout = json_timeout;
        self
    }

    /// Fetches `url` and returns its normalized feed or a classified failure.
    ///
    /// # Behavior
    ///
    /// - The XML attempt runs first; its item count is checked before any
    ///   item is normalized, and the normalized feed goes through the size
    ///   guard.
    /// - If the XML attempt fails, the URL is fetched again with
    ///   `Accept: application/json` and parsed as a JSON Feed under the same
    ///   checks.
    /// - If both fail, the XML error is classified (the JSON error is
    ///   usually less descriptive), using an HTTP status from either attempt.
    pub async fn parse(&self, url: &str) -> FeedParseResult {
        let xml_error = match self.parse_xml(url).await {
            Ok(result) => {
                log_outcome(url, &result);
                return result;
            }
            Err(e) => e,
        };

        tracing::debug!(url = %url, error = %xml_error, "RSS/Atom parse failed, trying JSON Feed");

        let json_error = match self.parse_json(url).await {
            Ok(result) => {
                log_outcome(url, &result);
                return result;
            }
            Err(e) => e,
        };

        tracing::debug!(url = %url, error = %json_error, "JSON Feed fallback failed");

        let status = xml_error.http_status().or_else(|| json_error.http_status());
        let classified = classify(
            &xml_error.to_string(),
            status.map(|(code, _)| code),
            status.map(|(_, text)| text),
        );

        tracing::warn!(
            url = %url,
            category = %classified.category,
            error = %xml_error,
            "Feed parse failed"
        );

        FeedParseResult::failure(classified.category, classified.message)
            .with_status(status.map(|(code, _)| code))
    }

    async fn parse_xml(&self, url: &str) -> Result<FeedParseResult, AttemptError> {
        let request = FetchRequest::get(url, self.timeout).header("Accept", XML_ACCEPT);
        let response = match self.transport.fetch(request).await {
            Ok(response) => response,
            // An oversized download would be just as oversized as JSON
            Err(TransportError::ResponseTooLarge(limit)) => {
                return Ok(FeedParseResult::failure(
                    FailureCategory::SizeExceeded,
                    format!(
                        "Feed download exceeds {limit} bytes. \
                         Trim embedded content or publish fewer items per document."
                    ),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if !response.ok() {
            return Err(AttemptError::HttpStatus {
                status: response.status,
                status_text: response.status_text,
            });
        }

        let decoded = xml::decode(&response.body)?;

        if let Err(violation) = self.limits.check_item_count(decoded.raw.items.len()) {
            return Ok(FeedParseResult::failure(
                violation.category(),
                violation.to_string(),
            ));
        }

        let raw = match serde_json::to_value(&decoded.raw) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Could not keep raw feed document, storing null");
                serde_json::Value::Null
            }
        };
        let feed = normalize_feed(decoded.raw, decoded.feed_type, raw);

        Ok(self.guard_size(feed, response.body.len()))
    }

    async fn parse_json(&self, url: &str) -> Result<FeedParseResult, AttemptError> {
        let request = FetchRequest::get(url, self.json_timeout).header("Accept", JSON_ACCEPT);
        let response = self.transport.fetch(request).await?;

        if !response.ok() {
            return Err(AttemptError::HttpStatus {
                status: response.status,
                status_text: response.status_text,
            });
        }

        let value: serde_json::Value = serde_json::from_slice(&response.body)?;
        if !json::is_json_feed(&value) {
            return Err(AttemptError::NotJsonFeed);
        }

        if let Err(violation) = self.limits.check_item_count(json::item_count(&value)) {
            return Ok(FeedParseResult::failure(
                violation.category(),
                violation.to_string(),
            ));
        }

        let document = JsonFeedDocument::deserialize(&value)?;
        let feed = json::normalize_json(document, value);

        Ok(self.guard_size(feed, response.body.len()))
    }

    fn guard_size(&self, feed: ParsedFeed, raw_len: usize) -> FeedParseResult {
        match self.limits.check_size(&feed, Some(raw_len)) {
            Ok(size) => {
                tracing::trace!(size, "Feed within size limit");
                FeedParseResult::success(feed)
            }
            Err(violation) => FeedParseResult::failure(violation.category(), violation.to_string()),
        }
    }
}

fn log_outcome(url: &str, result: &FeedParseResult) {
    match (&result.feed, &result.category) {
        (Some(feed), _) => tracing::info!(
            url = %url,
            feed_type = ?feed.feed_type,
            items = feed.items.len(),
            "Parsed feed"
        ),
        (None, Some(category)) => tracing::warn!(
            url = %url,
            category = %category,
            "Feed rejected by limits"
        ),
        (None, None) => {}
    }
}
