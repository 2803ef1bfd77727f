//! Ordered reassembly of segment payloads into one output file.
//!
//! Results arrive in completion order. Payloads that are ahead of the next
//! expected index wait in a reorder buffer; the contiguous prefix is written
//! as soon as it exists. Output goes to `<destination>.part` and is renamed
//! into place only when every index `0..expected` has been written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use super::segment::SegmentResult;
use crate::download::{DownloadError, partial_path};

/// Writes segment payloads in strictly increasing index order.
#[derive(Debug)]
pub struct Assembler {
    destination: PathBuf,
    partial: PathBuf,
    writer: BufWriter<File>,
    expected: usize,
    next_index: usize,
    pending: BTreeMap<usize, Bytes>,
    bytes_written: u64,
    settled: bool,
}

impl Assembler {
    /// Opens the partial output file for a playlist of `expected` segments.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Write`] if the file cannot be created.
    pub async fn create(destination: &Path, expected: usize) -> Result<Self, DownloadError> {
        let partial = partial_path(destination);
        let file = File::create(&partial)
            .await
            .map_err(|e| DownloadError::write(&partial, e))?;
        debug!(path = %partial.display(), expected, "assembly started");
        Ok(Self {
            destination: destination.to_path_buf(),
            partial,
            writer: BufWriter::new(file),
            expected,
            next_index: 0,
            pending: BTreeMap::new(),
            bytes_written: 0,
            settled: false,
        })
    }

    /// Number of payloads waiting for an earlier index.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Next index that will be written.
    #[must_use]
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Accepts one result and writes whatever contiguous run it completes.
    ///
    /// A failed result is returned as the error; the caller is expected to
    /// [`abort`](Self::abort) since a gap can never be filled.
    ///
    /// # Errors
    ///
    /// Returns the segment's own error, or [`DownloadError::Write`].
    pub async fn push(&mut self, result: SegmentResult) -> Result<(), DownloadError> {
        let index = result.sequence_index;
        let payload = result.outcome?;

        if index >= self.expected || index < self.next_index || self.pending.contains_key(&index) {
            warn!(index, expected = self.expected, "ignoring duplicate or out-of-range segment");
            return Ok(());
        }

        self.pending.insert(index, payload);
        while let Some(payload) = self.pending.remove(&self.next_index) {
            self.writer
                .write_all(&payload)
                .await
                .map_err(|e| DownloadError::write(&self.partial, e))?;
            self.bytes_written += payload.len() as u64;
            self.next_index += 1;
        }
        Ok(())
    }

    /// Flushes and moves the output into place, returning the bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::MissingSegment`] if some index was never
    /// delivered, or [`DownloadError::Write`]. The partial file is removed in
    /// both cases.
    pub async fn finish(mut self) -> Result<u64, DownloadError> {
        if self.next_index < self.expected {
            let error = DownloadError::MissingSegment {
                index: self.next_index,
                expected: self.expected,
            };
            self.abort().await;
            return Err(error);
        }

        if let Err(e) = self.writer.flush().await {
            let error = DownloadError::write(&self.partial, e);
            self.abort().await;
            return Err(error);
        }
        if let Err(e) = tokio::fs::rename(&self.partial, &self.destination).await {
            let error = DownloadError::write(&self.destination, e);
            self.abort().await;
            return Err(error);
        }

        self.settled = true;
        info!(
            path = %self.destination.display(),
            bytes = self.bytes_written,
            segments = self.expected,
            "assembly complete"
        );
        Ok(self.bytes_written)
    }

    /// Discards everything written so far.
    pub async fn abort(mut self) {
        self.settled = true;
        self.pending.clear();
        let _ = self.writer.shutdown().await;
        if let Err(e) = tokio::fs::remove_file(&self.partial).await {
            debug!(path = %self.partial.display(), error = %e, "partial file already gone");
        } else {
            debug!(path = %self.partial.display(), "removed partial output");
        }
    }

    /// Assembles a complete, arbitrarily ordered set of results.
    ///
    /// # Errors
    ///
    /// Fails on the first non-`Ok` result, on a missing index, or on a write
    /// error; no file is left at `destination` in any failure case.
    pub async fn assemble<I>(
        destination: &Path,
        expected: usize,
        results: I,
    ) -> Result<u64, DownloadError>
    where
        I: IntoIterator<Item = SegmentResult>,
    {
        let mut assembler = Self::create(destination, expected).await?;
        for result in results {
            if let Err(e) = assembler.push(result).await {
                assembler.abort().await;
                return Err(e);
            }
        }
        assembler.finish().await
    }
}

impl Drop for Assembler {
    fn drop(&mut self) {
        // Dropped mid-flight (e.g. the owning task was aborted).
        if !self.settled {
            let _ = std::fs::remove_file(&self.partial);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn ok(index: usize, payload: &'static [u8]) -> SegmentResult {
        SegmentResult {
            sequence_index: index,
            outcome: Ok(Bytes::from_static(payload)),
        }
    }

    #[tokio::test]
    async fn test_out_of_order_results_written_in_index_order() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.ts");

        let written = Assembler::assemble(
            &dest,
            3,
            [ok(2, b"CCC"), ok(0, b"AAA"), ok(1, b"BBB")],
        )
        .await
        .unwrap();

        assert_eq!(written, 9);
        assert_eq!(std::fs::read(&dest).unwrap(), b"AAABBBCCC");
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_reorder_buffer_drains_when_gap_fills() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.ts");
        let mut assembler = Assembler::create(&dest, 4).await.unwrap();

        assembler.push(ok(3, b"d")).await.unwrap();
        assembler.push(ok(1, b"b")).await.unwrap();
        assert_eq!(assembler.next_index(), 0);
        assert_eq!(assembler.buffered(), 2);

        assembler.push(ok(0, b"a")).await.unwrap();
        assert_eq!(assembler.next_index(), 2);
        assert_eq!(assembler.buffered(), 1);

        assembler.push(ok(2, b"c")).await.unwrap();
        assert_eq!(assembler.buffered(), 0);
        assembler.finish().await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn test_failed_segment_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.ts");
        let failed = SegmentResult {
            sequence_index: 1,
            outcome: Err(DownloadError::decrypt_failed(1, "bad padding")),
        };

        let err = Assembler::assemble(&dest, 3, [ok(0, b"AAA"), failed, ok(2, b"CCC")])
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::DecryptFailed { index: 1, .. }));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_missing_index_is_reported_and_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.ts");

        let err = Assembler::assemble(&dest, 3, [ok(0, b"A"), ok(2, b"C")])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DownloadError::MissingSegment {
                index: 1,
                expected: 3
            }
        ));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_duplicate_index_is_ignored() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.ts");

        Assembler::assemble(&dest, 2, [ok(0, b"A"), ok(0, b"X"), ok(1, b"B")])
            .await
            .unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"AB");
    }

    #[tokio::test]
    async fn test_zero_segments_produces_empty_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("empty.ts");

        let written = Assembler::assemble(&dest, 0, Vec::new()).await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(std::fs::read(&dest).unwrap(), b"");
    }

    #[tokio::test]
    async fn test_dropped_assembler_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.ts");
        let mut assembler = Assembler::create(&dest, 2).await.unwrap();
        assembler.push(ok(0, b"A")).await.unwrap();
        drop(assembler);

        assert!(!partial_path(&dest).exists());
        assert!(!dest.exists());
    }
}
