//! Feed fetching, parsing and normalization.
//!
//! - [`parser`] - fetch-and-parse orchestrator: RSS/Atom first, JSON Feed fallback
//! - [`xml`] / [`json`] - format decoders built on `feed-rs` and `serde_json`
//! - [`normalize`] - maps decoded documents onto [`ParsedFeed`]
//! - [`size`] - item-count and byte-size limits
//! - [`classify`] - turns failures into categories and actionable messages
//! - [`transport`] - the HTTP seam, with a reqwest implementation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use feedscope::config::FetchConfig;
//! use feedscope::feed::{FeedParser, HttpTransport};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(&FetchConfig::default())?;
//! let result = FeedParser::new(Arc::new(transport))
//!     .parse("https://example.com/feed.xml")
//!     .await;
//! if let Some(feed) = result.feed {
//!     println!("{} ({} items)", feed.metadata.title, feed.items.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod json;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod size;
pub mod transport;
pub mod xml;

pub use classify::{classify, ClassifiedError};
pub use model::{
    Enclosure, FailureCategory, FeedImage, FeedItem, FeedMetadata, FeedParseResult, FeedType,
    ParsedFeed,
};
pub use parser::FeedParser;
pub use size::{FeedLimits, LimitViolation};
pub use transport::{FetchRequest, FetchResponse, HttpTransport, Transport, TransportError};
