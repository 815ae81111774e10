//! Item-count and byte-size limits for normalized feeds.
//!
//! The byte check is two-stage. A cheap estimate is computed first; only when
//! it lands above [`PRECISE_CHECK_RATIO`] of the cap is the feed serialized
//! (into a counting sink, nothing is buffered) for an exact figure.

use std::io;

use thiserror::Error;

use super::model::{FailureCategory, ParsedFeed};

/// Hard cap on items per feed.
pub const MAX_ITEMS: usize = 1000;
/// Hard cap on the serialized size of a normalized feed (10 MiB).
pub const MAX_FEED_BYTES: usize = 10 * 1024 * 1024;

/// Normalization overhead over the raw upstream payload.
const RAW_PAYLOAD_OVERHEAD: f64 = 1.2;
/// Structural (keys, quoting, nesting) overhead over summed string fields.
const FIELD_OVERHEAD: f64 = 1.3;
/// Estimates above this fraction of the cap get an exact measurement.
const PRECISE_CHECK_RATIO: f64 = 0.8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LimitViolation {
    #[error(
        "Feed has too many items: {count} (maximum is {max}). \
         Publish fewer items per document or paginate the feed."
    )]
    TooManyItems { count: usize, max: usize },

    #[error(
        "Feed is too large: {size} bytes after normalization (maximum is {max} bytes). \
         Trim embedded content or publish fewer items per document."
    )]
    TooLarge { size: usize, max: usize },
}

impl LimitViolation {
    pub fn category(&self) -> FailureCategory {
        match self {
            LimitViolation::TooManyItems { .. } => FailureCategory::ItemCountExceeded,
            LimitViolation::TooLarge { .. } => FailureCategory::SizeExceeded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    pub max_items: usize,
    pub max_feed_bytes: usize,
}

impl Default for FeedLimits {
    fn default() -> Self {
        Self {
            max_items: MAX_ITEMS,
            max_feed_bytes: MAX_FEED_BYTES,
        }
    }
}

impl FeedLimits {
    /// Rejects documents with more than `max_items` entries. Runs on the raw
    /// item count, before any item is normalized.
    pub fn check_item_count(&self, count: usize) -> Result<(), LimitViolation> {
        if count > self.max_items {
            return Err(LimitViolation::TooManyItems {
                count,
                max: self.max_items,
            });
        }
        Ok(())
    }

    /// Checks the serialized size of a normalized feed.
    ///
    /// `raw_len` is the upstream payload length when known. Returns the size
    /// that was accepted (exact if it was measured, estimated otherwise).
    pub fn check_size(
        &self,
        feed: &ParsedFeed,
        raw_len: Option<usize>,
    ) -> Result<usize, LimitViolation> {
        let estimate = estimate_size(feed, raw_len);
        let threshold = (self.max_feed_bytes as f64 * PRECISE_CHECK_RATIO) as usize;

        if estimate <= threshold {
            return Ok(estimate);
        }

        let size = match serialized_size(feed) {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(error = %e, estimate, "Exact feed size measurement failed, using estimate");
                estimate
            }
        };
        tracing::debug!(estimate, size, "Measured feed size near limit");

        if size > self.max_feed_bytes {
            return Err(LimitViolation::TooLarge {
                size,
                max: self.max_feed_bytes,
            });
        }
        Ok(size)
    }
}

/// Cheap size estimate: scaled raw payload length when known, otherwise
/// scaled sum of the significant string fields.
pub fn estimate_size(feed: &ParsedFeed, raw_len: Option<usize>) -> usize {
    if let Some(len) = raw_len {
        return (len as f64 * RAW_PAYLOAD_OVERHEAD) as usize;
    }

    let opt_len = |s: &Option<String>| s.as_ref().map_or(0, String::len);
    let metadata = &feed.metadata;
    let mut total = metadata.title.len() + opt_len(&metadata.description) + opt_len(&metadata.link);

    for item in &feed.items {
        total += item.title.len()
            + item.link.len()
            + opt_len(&item.description)
            + opt_len(&item.content);
    }

    (total as f64 * FIELD_OVERHEAD) as usize
}

/// Exact JSON-serialized length of the feed.
pub fn serialized_size(feed: &ParsedFeed) -> Result<usize, serde_json::Error> {
    let mut counter = ByteCounter(0);
    serde_json::to_writer(&mut counter, feed)?;
    Ok(counter.0)
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::model::{FeedItem, FeedMetadata, FeedType};

    fn feed_with_description(description: String) -> ParsedFeed {
        ParsedFeed {
            feed_type: FeedType::Rss,
            metadata: FeedMetadata {
                title: "Big".into(),
                ..Default::default()
            },
            items: vec![FeedItem {
                title: "Item".into(),
                link: "https://example.com/1".into(),
                description: Some(description),
                ..Default::default()
            }],
            raw: serde_json::Value::Null,
        }
    }

    /// Builds a feed whose exact serialized size is `target` bytes.
    fn feed_of_exact_size(target: usize) -> ParsedFeed {
        let base = serialized_size(&feed_with_description(String::new())).unwrap();
        let feed = feed_with_description("a".repeat(target - base));
        assert_eq!(serialized_size(&feed).unwrap(), target);
        feed
    }

    #[test]
    fn test_item_count_cap() {
        let limits = FeedLimits::default();
        assert!(limits.check_item_count(1000).is_ok());
        let err = limits.check_item_count(1001).unwrap_err();
        assert_eq!(err.category(), FailureCategory::ItemCountExceeded);
        assert!(err.to_string().contains("1001"));
    }

    #[test]
    fn test_feed_one_byte_over_cap_rejected() {
        let limits = FeedLimits::default();
        let feed = feed_of_exact_size(MAX_FEED_BYTES + 1);
        let err = limits.check_size(&feed, None).unwrap_err();
        assert_eq!(
            err,
            LimitViolation::TooLarge {
                size: MAX_FEED_BYTES + 1,
                max: MAX_FEED_BYTES
            }
        );
        assert_eq!(err.category(), FailureCategory::SizeExceeded);
    }

    #[test]
    fn test_feed_at_cap_accepted() {
        let limits = FeedLimits::default();
        let feed = feed_of_exact_size(MAX_FEED_BYTES);
        assert_eq!(limits.check_size(&feed, None), Ok(MAX_FEED_BYTES));

        let feed = feed_of_exact_size(MAX_FEED_BYTES - 1);
        assert_eq!(limits.check_size(&feed, None), Ok(MAX_FEED_BYTES - 1));
    }

    #[test]
    fn test_small_feed_skips_exact_measurement() {
        let limits = FeedLimits::default();
        let feed = feed_with_description("short".into());
        // Estimate well under the threshold is accepted as-is
        let accepted = limits.check_size(&feed, Some(1000)).unwrap();
        assert_eq!(accepted, 1200);
    }

    #[test]
    fn test_raw_length_drives_estimate() {
        let feed = feed_with_description(String::new());
        assert_eq!(estimate_size(&feed, Some(100)), 120);
        // "Big" + "Item" + "https://example.com/1" = 3 + 4 + 21 = 28, * 1.3
        assert_eq!(estimate_size(&feed, None), 36);
    }

    #[test]
    fn test_inflated_estimate_falls_back_to_exact_size() {
        // Raw payload says ~12 MiB after overhead, but the normalized feed is tiny
        let limits = FeedLimits::default();
        let feed = feed_with_description("short".into());
        let exact = serialized_size(&feed).unwrap();
        assert_eq!(limits.check_size(&feed, Some(MAX_FEED_BYTES)), Ok(exact));
    }

    #[test]
    fn test_custom_limits() {
        let limits = FeedLimits {
            max_items: 2,
            max_feed_bytes: 64,
        };
        assert!(limits.check_item_count(3).is_err());
        let feed = feed_with_description("x".repeat(100));
        assert!(matches!(
            limits.check_size(&feed, None),
            Err(LimitViolation::TooLarge { max: 64, .. })
        ));
    }
}
