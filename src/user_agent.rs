//! Default User-Agent for outgoing requests.
//!
//! Callers that replay a browser session normally override this through an
//! explicit `User-Agent` header; the default only identifies the tool.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/stream-downloader";

/// Default User-Agent for manifest, key, segment and file requests.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("stream-downloader/{version} (+{PROJECT_UA_URL})")
}
