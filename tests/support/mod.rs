//! Shared fixtures for HLS integration tests.
//!
//! Each test binary pulls in only what it needs.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;

pub const KEY: [u8; 16] = *b"0123456789abcdef";

/// Encrypts `plain` the way an HLS packager does (AES-128-CBC, PKCS#7).
pub fn encrypt(plain: &[u8], key: [u8; 16], iv: [u8; 16]) -> Vec<u8> {
    Aes128CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plain)
}

/// Builds a VOD media playlist with `segments` relative URIs.
///
/// `key_line` is inserted verbatim before the first segment when given.
pub fn media_playlist(segments: &[&str], key_line: Option<&str>) -> String {
    let mut body = String::from(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:0\n",
    );
    if let Some(line) = key_line {
        body.push_str(line);
        body.push('\n');
    }
    for segment in segments {
        body.push_str("#EXTINF:10.0,\n");
        body.push_str(segment);
        body.push('\n');
    }
    body.push_str("#EXT-X-ENDLIST\n");
    body
}

/// Mounts a 200 response with `body` at `route`, delayed by `delay_ms`.
pub async fn mount_bytes(server: &MockServer, route: &str, body: impl Into<Vec<u8>>, delay_ms: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.into())
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(server)
        .await;
}

/// Mounts a bare status response at `route`.
pub async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Responder that counts how many requests it is serving at once.
///
/// Uses a blocking sleep so the counter stays raised while the response is
/// being produced; overlapping requests show up as `peak > 1`.
pub struct ConcurrencyTrackingResponder {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay_ms: u64,
    body: Vec<u8>,
}

impl ConcurrencyTrackingResponder {
    pub fn new(peak: Arc<AtomicUsize>, delay_ms: u64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            current: Arc::new(AtomicUsize::new(0)),
            peak,
            delay_ms,
            body: body.into(),
        }
    }
}

impl Respond for ConcurrencyTrackingResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let current_count = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current_count, Ordering::SeqCst);

        std::thread::sleep(Duration::from_millis(self.delay_ms));

        self.current.fetch_sub(1, Ordering::SeqCst);
        ResponseTemplate::new(200).set_body_bytes(self.body.clone())
    }
}
