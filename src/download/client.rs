//! HTTP client wrapper shared by every fetch stage.
//!
//! The browsing layer that discovers media URLs usually owns a session
//! (cookies, referer, a specific User-Agent). Those are passed in as opaque
//! request headers and attached to every request this client sends.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::{DownloadError, FetchFailure};
use crate::user_agent;

/// HTTP client for manifest, key, segment and progressive-file requests.
///
/// This client is designed to be created once and reused for every task of a
/// run, taking advantage of connection pooling. Cloning is cheap.
///
/// # Example
///
/// ```no_run
/// use stream_downloader::download::{HttpClient, parse_header_line};
/// use reqwest::header::HeaderMap;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut headers = HeaderMap::new();
/// let (name, value) = parse_header_line("Referer: https://player.example/")?;
/// headers.insert(name, value);
/// let client = HttpClient::with_headers(headers);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    headers: HeaderMap,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts and no extra headers.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_headers_and_timeouts(HeaderMap::new(), CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client that attaches `headers` to every request.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration.
    #[must_use]
    pub fn with_headers(headers: HeaderMap) -> Self {
        Self::with_headers_and_timeouts(headers, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with extra headers and explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    #[instrument(level = "debug", skip(headers), fields(headers = headers.len()))]
    pub fn with_headers_and_timeouts(
        headers: HeaderMap,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Self {
        let client = base_client_builder(connect_timeout_secs, read_timeout_secs)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client, headers }
    }

    /// Sends a GET and returns the response once a 2xx status arrived.
    ///
    /// The body is not read. Cancellation of `token` aborts the pending request.
    /// Every session header value is sent, including repeated names.
    ///
    /// # Errors
    ///
    /// Returns [`FetchFailure`] on an unparseable URL, transport error,
    /// timeout, non-2xx status, or cancellation.
    pub async fn get(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<Response, FetchFailure> {
        let parsed = Url::parse(url).map_err(|_| FetchFailure::InvalidUrl)?;
        let mut request = self
            .client
            .get(parsed)
            .build()
            .map_err(FetchFailure::from_reqwest)?;
        // RequestBuilder::headers and default_headers both insert, which keeps
        // only the last value of a repeated name.
        for (name, value) in &self.headers {
            request.headers_mut().append(name, value.clone());
        }

        let response = tokio::select! {
            biased;
            () = token.cancelled() => return Err(FetchFailure::Cancelled),
            response = self.client.execute(request) => {
                response.map_err(FetchFailure::from_reqwest)?
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "request rejected");
            return Err(FetchFailure::Status(status.as_u16()));
        }

        Ok(response)
    }

    /// Sends a GET and reads the whole body into memory.
    ///
    /// Used for manifests, keys and segments, which are small.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), plus body read failures.
    pub async fn get_bytes(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<Bytes, FetchFailure> {
        let response = self.get(url, token).await?;
        read_body(response, token).await
    }
}

/// Reads a whole response body unless `token` is cancelled first.
///
/// # Errors
///
/// Returns [`FetchFailure::Cancelled`] or the body read failure.
pub async fn read_body(
    response: Response,
    token: &CancellationToken,
) -> Result<Bytes, FetchFailure> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(FetchFailure::Cancelled),
        body = response.bytes() => body.map_err(FetchFailure::from_reqwest),
    }
}

/// Parses a `Name: value` header line as captured from a browser session.
///
/// # Errors
///
/// Returns [`DownloadError::InvalidHeader`] when the line has no colon or the
/// name/value are not valid HTTP tokens.
pub fn parse_header_line(line: &str) -> Result<(HeaderName, HeaderValue), DownloadError> {
    let invalid = || DownloadError::InvalidHeader {
        header: line.to_string(),
    };
    let (name, value) = line.split_once(':').ok_or_else(invalid)?;
    let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| invalid())?;
    let value = HeaderValue::from_str(value.trim()).map_err(|_| invalid())?;
    Ok((name, value))
}

/// Builds a header map from `Name: value` lines; later duplicates are appended.
///
/// # Errors
///
/// Returns the first [`DownloadError::InvalidHeader`] encountered.
pub fn header_map_from_lines<I, S>(lines: I) -> Result<HeaderMap, DownloadError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) = parse_header_line(line.as_ref())?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn base_client_builder(connect_timeout_secs: u64, read_timeout_secs: u64) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_user_agent())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_line_trims_name_and_value() {
        let (name, value) = parse_header_line("  Referer :  https://player.example/ ").unwrap();
        assert_eq!(name.as_str(), "referer");
        assert_eq!(value.to_str().unwrap(), "https://player.example/");
    }

    #[test]
    fn test_parse_header_line_keeps_colons_in_value() {
        let (_, value) = parse_header_line("Origin: https://a.example:8443").unwrap();
        assert_eq!(value.to_str().unwrap(), "https://a.example:8443");
    }

    #[test]
    fn test_parse_header_line_rejects_missing_colon() {
        let err = parse_header_line("Cookie session=1").unwrap_err();
        assert!(matches!(err, DownloadError::InvalidHeader { .. }));
    }

    #[test]
    fn test_parse_header_line_rejects_bad_name() {
        assert!(parse_header_line("Bad Name: x").is_err());
    }

    #[test]
    fn test_header_map_from_lines_appends_duplicates() {
        let headers =
            header_map_from_lines(["Cookie: a=1", "Cookie: b=2", "X-Token: t"]).unwrap();
        assert_eq!(headers.get_all("cookie").iter().count(), 2);
        assert_eq!(headers.get("x-token").unwrap(), "t");
    }

    #[tokio::test]
    async fn test_get_rejects_invalid_url() {
        let client = HttpClient::new();
        let token = CancellationToken::new();
        let result = client.get("not a url", &token).await;
        assert!(matches!(result, Err(FetchFailure::InvalidUrl)));
    }

    #[tokio::test]
    async fn test_get_returns_cancelled_when_token_already_cancelled() {
        let client = HttpClient::new();
        let token = CancellationToken::new();
        token.cancel();
        let result = client.get("http://127.0.0.1:9/never", &token).await;
        assert!(matches!(result, Err(FetchFailure::Cancelled)));
    }
}
