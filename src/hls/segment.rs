//! Segment fetching and AES-128-CBC decryption.

use std::sync::Arc;

use aes::Aes128;
use bytes::Bytes;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use super::key::KeyMaterial;
use super::playlist::SegmentRef;
use crate::download::{ConcurrencyLimiter, DownloadError, HttpClient};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Outcome of fetching (and decrypting) one segment.
///
/// Payloads are only present on success; a failed segment carries the
/// [`DownloadError::SegmentFetch`] or [`DownloadError::DecryptFailed`] that
/// stopped it.
#[derive(Debug)]
pub struct SegmentResult {
    /// Manifest position of the segment.
    pub sequence_index: usize,
    /// Plain payload bytes or the failure.
    pub outcome: Result<Bytes, DownloadError>,
}

/// Decrypts one AES-128-CBC segment and strips PKCS#7 padding.
///
/// # Errors
///
/// Returns [`DownloadError::DecryptFailed`] when the ciphertext is not a whole
/// number of blocks or the padding is invalid.
pub fn decrypt_segment(
    sequence_index: usize,
    data: &[u8],
    material: &KeyMaterial,
) -> Result<Bytes, DownloadError> {
    let mut buffer = data.to_vec();
    let decrypted_len = Aes128CbcDec::new(&material.key.into(), &material.iv.into())
        .decrypt_padded_mut::<Pkcs7>(&mut buffer)
        .map_err(|e| DownloadError::decrypt_failed(sequence_index, e.to_string()))?
        .len();
    buffer.truncate(decrypted_len);
    Ok(Bytes::from(buffer))
}

/// Fetches single segments under the shared limiter.
#[derive(Debug, Clone)]
pub struct SegmentFetcher {
    client: HttpClient,
    limiter: ConcurrencyLimiter,
    key: Option<Arc<KeyMaterial>>,
}

impl SegmentFetcher {
    /// Creates a fetcher; `key` is applied to every segment it fetches.
    #[must_use]
    pub fn new(
        client: HttpClient,
        limiter: ConcurrencyLimiter,
        key: Option<Arc<KeyMaterial>>,
    ) -> Self {
        Self {
            client,
            limiter,
            key,
        }
    }

    /// Fetches one segment and decrypts it when a key is configured.
    ///
    /// The limiter permit covers only the request and body read; decryption
    /// runs afterwards on the blocking pool.
    #[instrument(skip(self, segment, token), fields(index = segment.sequence_index))]
    pub async fn fetch(&self, segment: &SegmentRef, token: &CancellationToken) -> SegmentResult {
        SegmentResult {
            sequence_index: segment.sequence_index,
            outcome: self.fetch_inner(segment, token).await,
        }
    }

    async fn fetch_inner(
        &self,
        segment: &SegmentRef,
        token: &CancellationToken,
    ) -> Result<Bytes, DownloadError> {
        let index = segment.sequence_index;
        let body = {
            let _permit = self
                .limiter
                .acquire_or_cancel(token)
                .await
                .map_err(|e| DownloadError::segment_fetch(index, &segment.url, e))?;
            self.client
                .get_bytes(&segment.url, token)
                .await
                .map_err(|e| DownloadError::segment_fetch(index, &segment.url, e))?
        };
        trace!(bytes = body.len(), "segment fetched");

        let Some(material) = self.key.clone() else {
            return Ok(body);
        };

        tokio::task::spawn_blocking(move || decrypt_segment(index, &body, &material))
            .await
            .map_err(|e| DownloadError::decrypt_failed(index, format!("decryption task failed: {e}")))?
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cbc::cipher::BlockEncryptMut;

    use super::*;

    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    fn material(iv: [u8; 16]) -> KeyMaterial {
        KeyMaterial {
            key: *b"0123456789abcdef",
            iv,
        }
    }

    fn encrypt(plain: &[u8], material: &KeyMaterial) -> Vec<u8> {
        Aes128CbcEnc::new(&material.key.into(), &material.iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plain)
    }

    #[test]
    fn test_decrypt_recovers_plaintext_with_explicit_iv() {
        let material = material([9u8; 16]);
        let plain = b"transport stream payload that spans several blocks";
        let cipher = encrypt(plain, &material);

        let decrypted = decrypt_segment(0, &cipher, &material).unwrap();
        assert_eq!(&decrypted[..], plain);
    }

    #[test]
    fn test_decrypt_recovers_plaintext_with_zero_iv() {
        let material = material([0u8; 16]);
        let plain = b"AAA";
        let cipher = encrypt(plain, &material);
        assert_eq!(cipher.len(), 16);

        let decrypted = decrypt_segment(4, &cipher, &material).unwrap();
        assert_eq!(&decrypted[..], plain);
    }

    #[test]
    fn test_decrypt_block_aligned_plaintext() {
        let material = material([1u8; 16]);
        let plain = [0x47u8; 188 * 2];
        let cipher = encrypt(&plain, &material);
        assert_eq!(cipher.len(), plain.len() + 16, "full padding block expected");

        let decrypted = decrypt_segment(1, &cipher, &material).unwrap();
        assert_eq!(&decrypted[..], &plain[..]);
    }

    #[test]
    fn test_decrypt_rejects_partial_block() {
        let material = material([0u8; 16]);
        let err = decrypt_segment(2, &[0u8; 20], &material).unwrap_err();
        assert!(matches!(err, DownloadError::DecryptFailed { index: 2, .. }));
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails_or_differs() {
        let material = material([0u8; 16]);
        let cipher = encrypt(b"secret segment bytes", &material);
        let wrong = KeyMaterial {
            key: *b"fedcba9876543210",
            iv: [0u8; 16],
        };
        match decrypt_segment(3, &cipher, &wrong) {
            Ok(bytes) => assert_ne!(&bytes[..], b"secret segment bytes"),
            Err(err) => assert!(matches!(err, DownloadError::DecryptFailed { .. })),
        }
    }
}
