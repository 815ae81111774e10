//! Feed parsing core for feed developer tools.
//!
//! Fetches a feed URL, parses it as RSS/Atom or JSON Feed, normalizes it into
//! a [`ParsedFeed`](feed::ParsedFeed) and guards it against oversized input.
//! [`FeedService`] adds a bounded TTL cache and coalesces concurrent requests
//! for the same URL into one fetch.

pub mod cache;
pub mod config;
pub mod feed;
pub mod inflight;
pub mod service;
pub mod util;

pub use config::Config;
pub use feed::{FailureCategory, FeedParseResult, ParsedFeed};
pub use service::FeedService;
