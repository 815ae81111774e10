//! Small helpers shared by the parse pipeline:
//!
//! - **URL validation**: rejects non-http(s) and (by default) private hosts
//!   before a feed URL reaches the cache or the network
//! - **Text sanitizing**: strips control characters from feed titles

mod text;
mod url_validator;

pub use text::strip_control_chars;
pub use url_validator::{validate_url, UrlValidationError};
