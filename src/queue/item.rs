//! Queue item types and kind definitions.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// How a queued URL is downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A single progressive file streamed to disk.
    Direct,
    /// An HLS manifest whose segments are fetched and assembled.
    Hls,
}

impl TaskKind {
    /// Returns the label used in logs and reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Hls => "hls",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One accepted download request. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Where the content is fetched from.
    pub source_url: String,
    /// Where the finished file is written.
    pub destination: PathBuf,
    /// Classification made at enqueue time.
    pub kind: TaskKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_display() {
        assert_eq!(TaskKind::Direct.to_string(), "direct");
        assert_eq!(TaskKind::Hls.to_string(), "hls");
    }

    #[test]
    fn test_task_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TaskKind::Hls).ok().as_deref(), Some("\"hls\""));
    }
}
