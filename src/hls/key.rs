//! AES-128 key resolution.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::playlist::KeyRef;
use crate::download::{ConcurrencyLimiter, DownloadError, HttpClient};

/// AES-128 block and key size.
pub const KEY_LEN: usize = 16;

/// Resolved key and IV, shared read-only by every segment of one task.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Raw key bytes.
    pub key: [u8; KEY_LEN],
    /// Initialization vector.
    pub iv: [u8; KEY_LEN],
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"<redacted>")
            .field("iv", &hex::encode(self.iv))
            .finish()
    }
}

/// Decodes an `IV` attribute: optional `0x`/`0X` prefix, then 32 hex digits.
///
/// A missing IV yields 16 zero bytes.
///
/// # Errors
///
/// Returns a description of the problem when the value is not 16 bytes of hex.
pub fn parse_iv(iv_hex: Option<&str>) -> Result<[u8; KEY_LEN], String> {
    let mut iv = [0u8; KEY_LEN];
    let Some(raw) = iv_hex else {
        return Ok(iv);
    };
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    hex::decode_to_slice(digits, &mut iv).map_err(|e| format!("invalid IV '{raw}': {e}"))?;
    Ok(iv)
}

/// Fetches key bytes for a [`KeyRef`].
#[derive(Debug, Clone)]
pub struct KeyResolver {
    client: HttpClient,
    limiter: ConcurrencyLimiter,
}

impl KeyResolver {
    /// Creates a resolver sharing the run's client and limiter.
    #[must_use]
    pub fn new(client: HttpClient, limiter: ConcurrencyLimiter) -> Self {
        Self { client, limiter }
    }

    /// Fetches the key and decodes the IV.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::KeyFetch`] when the request fails and
    /// [`DownloadError::InvalidKey`] when the key is not 16 bytes or the IV is
    /// malformed.
    #[instrument(skip(self, key_ref, token), fields(key_uri = %key_ref.uri))]
    pub async fn resolve(
        &self,
        key_ref: &KeyRef,
        token: &CancellationToken,
    ) -> Result<Arc<KeyMaterial>, DownloadError> {
        // Malformed IVs fail before any network traffic.
        let iv = parse_iv(key_ref.iv_hex.as_deref())
            .map_err(|reason| DownloadError::invalid_key(&key_ref.uri, reason))?;

        let bytes = {
            let _permit = self
                .limiter
                .acquire_or_cancel(token)
                .await
                .map_err(|e| DownloadError::key_fetch(&key_ref.uri, e))?;
            self.client
                .get_bytes(&key_ref.uri, token)
                .await
                .map_err(|e| DownloadError::key_fetch(&key_ref.uri, e))?
        };

        let key: [u8; KEY_LEN] = bytes[..].try_into().map_err(|_| {
            DownloadError::invalid_key(
                &key_ref.uri,
                format!("expected {KEY_LEN} key bytes, got {}", bytes.len()),
            )
        })?;

        debug!(explicit_iv = key_ref.iv_hex.is_some(), "key resolved");
        Ok(Arc::new(KeyMaterial { key, iv }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iv_absent_is_zero() {
        assert_eq!(parse_iv(None).unwrap(), [0u8; 16]);
    }

    #[test]
    fn test_parse_iv_strips_prefix() {
        let iv = parse_iv(Some("0x000102030405060708090A0B0C0D0E0F")).unwrap();
        assert_eq!(iv, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn test_parse_iv_without_prefix() {
        let iv = parse_iv(Some("ffffffffffffffffffffffffffffff01")).unwrap();
        assert_eq!(iv[0], 0xff);
        assert_eq!(iv[15], 0x01);
    }

    #[test]
    fn test_parse_iv_rejects_short_value() {
        let err = parse_iv(Some("0x0102")).unwrap_err();
        assert!(err.contains("0x0102"), "Expected raw value in: {err}");
    }

    #[test]
    fn test_parse_iv_rejects_non_hex() {
        assert!(parse_iv(Some("0xzz0102030405060708090a0b0c0d0e0f")).is_err());
    }

    #[test]
    fn test_key_material_debug_redacts_key() {
        let material = KeyMaterial {
            key: [7u8; 16],
            iv: [0u8; 16],
        };
        let rendered = format!("{material:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("07070707"));
    }
}
