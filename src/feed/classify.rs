//! Maps a failure (error text plus optional HTTP status) to a category and an
//! actionable message for developers debugging their own feeds.
//!
//! Priority order: HTTP status when known, then substring matching over the
//! lower-cased error text for network, CORS and parse failures, then a
//! generic fallback.

use super::model::FailureCategory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub category: FailureCategory,
    pub message: String,
}

const TIMEOUT_PATTERNS: &[&str] = &["timed out", "timeout", "etimedout", "aborted"];
const DNS_PATTERNS: &[&str] = &[
    "enotfound",
    "getaddrinfo",
    "dns",
    "failed to lookup",
    "name or service not known",
    "no such host",
];
const REFUSED_PATTERNS: &[&str] = &["econnrefused", "connection refused"];
const TLS_PATTERNS: &[&str] = &["certificate", "ssl", "tls", "handshake"];
const NETWORK_PATTERNS: &[&str] = &[
    "econnreset",
    "network",
    "connection",
    "socket hang up",
    "error sending request",
    "fetch failed",
    "unreachable",
];
const CORS_PATTERNS: &[&str] = &["cors", "cross-origin", "access-control-allow-origin"];
const PARSE_PATTERNS: &[&str] = &[
    "xml",
    "json",
    "parse",
    "unexpected token",
    "unexpected end",
    "malformed",
    "syntax",
    "not a feed",
    "no root element",
];

/// Classifies a failure. Never fails; unrecognized input lands in
/// [`FailureCategory::Unknown`].
pub fn classify(error: &str, status: Option<u16>, status_text: Option<&str>) -> ClassifiedError {
    if let Some(status) = status {
        return classify_status(status, status_text);
    }

    let lower = error.to_lowercase();
    let matches = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if matches(TIMEOUT_PATTERNS) {
        return network(
            "Network error: the request timed out. The server may be slow or unreachable; \
             check that it responds and try again.",
        );
    }
    if matches(DNS_PATTERNS) {
        return network(
            "Network error: the host name could not be resolved. \
             Check the domain in the feed URL for typos.",
        );
    }
    if matches(REFUSED_PATTERNS) {
        return network(
            "Network error: the connection was refused. \
             Check that the server is running and the port in the URL is correct.",
        );
    }
    if matches(TLS_PATTERNS) {
        return network(
            "Network error: the secure connection failed. \
             Check the server's TLS certificate (expired, self-signed or wrong host name).",
        );
    }
    if matches(NETWORK_PATTERNS) {
        return network(format!(
            "Network error: could not reach the server ({error}). \
             Check your connection and that the feed host is online."
        ));
    }
    if matches(CORS_PATTERNS) {
        return ClassifiedError {
            category: FailureCategory::Cors,
            message: "CORS error: the server does not allow cross-origin requests. \
                      Add an Access-Control-Allow-Origin header to the feed response."
                .to_owned(),
        };
    }
    if matches(PARSE_PATTERNS) {
        return ClassifiedError {
            category: FailureCategory::Parse,
            message: format!(
                "Parse error: the document is not a valid RSS, Atom or JSON feed ({error}). \
                 Validate the XML/JSON and check that the URL serves the feed itself, not an HTML page."
            ),
        };
    }

    ClassifiedError {
        category: FailureCategory::Unknown,
        message: format!(
            "Could not load feed: {error}. \
             Check that the URL is correct, the server is reachable, \
             and the response is an RSS, Atom or JSON feed."
        ),
    }
}

fn network(message: impl Into<String>) -> ClassifiedError {
    ClassifiedError {
        category: FailureCategory::Network,
        message: message.into(),
    }
}

fn classify_status(status: u16, status_text: Option<&str>) -> ClassifiedError {
    let reason = status_text
        .filter(|text| !text.trim().is_empty())
        .map(str::to_owned)
        .or_else(|| {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|code| code.canonical_reason())
                .map(str::to_owned)
        })
        .unwrap_or_default();
    let prefix = format!("HTTP {status} {reason}").trim_end().to_owned();

    let guidance = match status {
        404 => "The server has no feed at this URL. Verify the feed URL for typos and check whether the feed has moved.",
        401 => "The feed requires authentication. Public feeds should not need credentials; check for a public feed URL.",
        403 => "The server refused access. It may block automated clients or require a specific User-Agent; check its access rules.",
        429 => "The server is rate limiting requests. Wait before retrying and honour any Retry-After header.",
        500..=599 => "The feed server failed to handle the request. This is a server-side problem; try again later or contact the publisher.",
        _ => "The server returned an unexpected status. Verify the feed URL and the server configuration.",
    };

    ClassifiedError {
        category: FailureCategory::Http,
        message: format!("{prefix}: {guidance}"),
    }
}
