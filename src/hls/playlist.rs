//! Manifest fetching and parsing.
//!
//! A manifest becomes a [`Playlist`]: segment URLs resolved to absolute form
//! and numbered by their position in the file, plus the first AES-128 key the
//! manifest declares.

use m3u8_rs::{KeyMethod, MasterPlaylist, MediaPlaylist};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::{ConcurrencyLimiter, DownloadError, HttpClient, read_body};

/// One media segment in manifest order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRef {
    /// 0-based position among the playlist's segments.
    pub sequence_index: usize,
    /// Absolute segment URL.
    pub url: String,
}

/// Encryption key reference declared by `EXT-X-KEY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRef {
    /// Absolute key URL.
    pub uri: String,
    /// Raw `IV` attribute, if the manifest gave one.
    pub iv_hex: Option<String>,
}

/// A parsed media playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    /// Segments with contiguous indices starting at 0.
    pub segments: Vec<SegmentRef>,
    /// The single key applied to every segment, if encrypted.
    pub key: Option<KeyRef>,
    /// Whether the manifest carried `EXT-X-ENDLIST`.
    pub end_list: bool,
}

/// Result of parsing one manifest document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedManifest {
    /// A media playlist ready for download.
    Media(Playlist),
    /// A master playlist; the chosen variant must be fetched next.
    Master {
        /// Absolute URL of the selected variant playlist.
        variant_url: String,
    },
}

/// Parses a manifest body fetched from `manifest_url`.
///
/// # Errors
///
/// Returns [`DownloadError::ManifestParse`] if the body is not an M3U8
/// document, a URI cannot be resolved, the first key uses an unsupported
/// method, or a master playlist has no usable variant.
pub fn parse_manifest(body: &[u8], manifest_url: &Url) -> Result<ParsedManifest, DownloadError> {
    match m3u8_rs::parse_playlist_res(body) {
        Ok(m3u8_rs::Playlist::MediaPlaylist(media)) => {
            build_playlist(&media, manifest_url).map(ParsedManifest::Media)
        }
        Ok(m3u8_rs::Playlist::MasterPlaylist(master)) => {
            select_variant(&master, manifest_url).map(|variant_url| ParsedManifest::Master {
                variant_url,
            })
        }
        Err(_) => Err(DownloadError::manifest_parse(
            manifest_url.as_str(),
            "document is not a well-formed M3U8 playlist",
        )),
    }
}

fn build_playlist(media: &MediaPlaylist, manifest_url: &Url) -> Result<Playlist, DownloadError> {
    let mut segments = Vec::with_capacity(media.segments.len());
    let mut key: Option<KeyRef> = None;
    let mut key_seen = false;

    for segment in &media.segments {
        if !key_seen && let Some(declared) = &segment.key {
            key_seen = true;
            key = match &declared.method {
                KeyMethod::None => None,
                KeyMethod::AES128 => {
                    let uri = declared.uri.as_deref().ok_or_else(|| {
                        DownloadError::manifest_parse(
                            manifest_url.as_str(),
                            "EXT-X-KEY with METHOD=AES-128 has no URI",
                        )
                    })?;
                    Some(KeyRef {
                        uri: resolve_uri(manifest_url, uri)?,
                        iv_hex: declared.iv.clone(),
                    })
                }
                other => {
                    return Err(DownloadError::manifest_parse(
                        manifest_url.as_str(),
                        format!("unsupported encryption method {other:?}"),
                    ));
                }
            };
        } else if let Some(extra) = &segment.key {
            if key.is_none() && matches!(extra.method, KeyMethod::AES128) {
                warn!(
                    url = %manifest_url,
                    index = segments.len(),
                    "AES-128 key after METHOD=NONE is ignored, segments will be written undecrypted"
                );
            } else {
                warn!(url = %manifest_url, "ignoring additional EXT-X-KEY, first key applies to whole playlist");
            }
        }

        if segment.uri.trim().is_empty() {
            warn!(url = %manifest_url, "skipping segment with empty URI");
            continue;
        }

        segments.push(SegmentRef {
            sequence_index: segments.len(),
            url: resolve_uri(manifest_url, segment.uri.trim())?,
        });
    }

    Ok(Playlist {
        segments,
        key,
        end_list: media.end_list,
    })
}

fn select_variant(master: &MasterPlaylist, manifest_url: &Url) -> Result<String, DownloadError> {
    let variant = master
        .variants
        .iter()
        .filter(|v| !v.is_i_frame)
        .max_by_key(|v| v.bandwidth)
        .ok_or_else(|| {
            DownloadError::manifest_parse(manifest_url.as_str(), "master playlist has no variants")
        })?;
    debug!(bandwidth = variant.bandwidth, uri = %variant.uri, "selected variant");
    resolve_uri(manifest_url, &variant.uri)
}

fn resolve_uri(base: &Url, uri: &str) -> Result<String, DownloadError> {
    base.join(uri).map(String::from).map_err(|e| {
        DownloadError::manifest_parse(base.as_str(), format!("cannot resolve URI {uri}: {e}"))
    })
}

/// Fetches and parses manifests.
#[derive(Debug, Clone)]
pub struct PlaylistResolver {
    client: HttpClient,
    limiter: ConcurrencyLimiter,
}

impl PlaylistResolver {
    /// Creates a resolver sharing the run's client and limiter.
    #[must_use]
    pub fn new(client: HttpClient, limiter: ConcurrencyLimiter) -> Self {
        Self { client, limiter }
    }

    /// Fetches `url` and returns its media playlist.
    ///
    /// A master playlist is followed once, to its highest-bandwidth variant.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ManifestFetch`] when a manifest request fails
    /// and [`DownloadError::ManifestParse`] when a document is unusable.
    #[instrument(skip(self, token))]
    pub async fn resolve(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<Playlist, DownloadError> {
        let playlist = match self.fetch_and_parse(url, token).await? {
            ParsedManifest::Media(playlist) => playlist,
            ParsedManifest::Master { variant_url } => {
                info!(variant = %variant_url, "following master playlist variant");
                match self.fetch_and_parse(&variant_url, token).await? {
                    ParsedManifest::Media(playlist) => playlist,
                    ParsedManifest::Master { .. } => {
                        return Err(DownloadError::manifest_parse(
                            variant_url,
                            "variant playlist is itself a master playlist",
                        ));
                    }
                }
            }
        };

        if !playlist.end_list {
            warn!(url, "playlist has no EXT-X-ENDLIST, downloading current snapshot only");
        }
        info!(
            segments = playlist.segments.len(),
            encrypted = playlist.key.is_some(),
            "playlist resolved"
        );
        Ok(playlist)
    }

    async fn fetch_and_parse(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<ParsedManifest, DownloadError> {
        let (manifest_url, body) = {
            let _permit = self
                .limiter
                .acquire_or_cancel(token)
                .await
                .map_err(|e| DownloadError::manifest_fetch(url, e))?;
            let response = self
                .client
                .get(url, token)
                .await
                .map_err(|e| DownloadError::manifest_fetch(url, e))?;
            // Relative URIs resolve against the post-redirect location.
            let final_url = response.url().clone();
            let body = read_body(response, token)
                .await
                .map_err(|e| DownloadError::manifest_fetch(url, e))?;
            (final_url, body)
        };

        parse_manifest(&body, &manifest_url)
    }
}
