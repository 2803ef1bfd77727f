//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;

/// One `URL=DEST` download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPair {
    pub url: String,
    pub destination: PathBuf,
}

/// Download HLS streams and progressive video files.
///
/// Each request pairs an already-discovered media URL with a destination
/// path. URLs ending in `.m3u8` are fetched as HLS (segments downloaded,
/// decrypted and joined in order), `.mp4` URLs are streamed straight to disk.
#[derive(Parser, Debug)]
#[command(name = "stream-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Download requests as URL=DEST (reads `URL DEST` lines from stdin when omitted)
    #[arg(value_name = "URL=DEST", value_parser = parse_pair)]
    pub pairs: Vec<DownloadPair>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum simultaneous network requests across all downloads (1-100) [default: 6]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Extra request header sent with every request, as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Give up on a single download after this many seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub task_timeout: Option<u64>,

    /// Config file path (defaults to $XDG_CONFIG_HOME/stream-downloader/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the per-destination report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

/// Parses a `URL=DEST` argument, splitting at the last `=`.
///
/// Query strings may contain `=`, destinations rarely do.
pub fn parse_pair(raw: &str) -> Result<DownloadPair, String> {
    let (url, destination) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected URL=DEST, got '{raw}'"))?;
    let url = url.trim();
    let destination = destination.trim();
    if url.is_empty() || destination.is_empty() {
        return Err(format!("expected URL=DEST, got '{raw}'"));
    }
    Ok(DownloadPair {
        url: url.to_string(),
        destination: PathBuf::from(destination),
    })
}

/// Parses `URL DEST` lines as piped on stdin.
///
/// Blank lines and `#` comments are skipped.
pub fn parse_input_lines(input: &str) -> Result<Vec<DownloadPair>> {
    let mut pairs = Vec::new();
    for (line_index, raw_line) in input.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((url, destination)) = line.split_once(char::is_whitespace) else {
            bail!(
                "Invalid input on line {}: expected `URL DEST`",
                line_index + 1
            );
        };
        pairs.push(DownloadPair {
            url: url.to_string(),
            destination: PathBuf::from(destination.trim()),
        });
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["stream-downloader"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.concurrency.is_none());
        assert!(args.headers.is_empty());
        assert!(args.pairs.is_empty());
        assert!(!args.json);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["stream-downloader", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["stream-downloader", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["stream-downloader", "--help"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["stream-downloader", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        let args = Args::try_parse_from(["stream-downloader", "-c", "1"]).unwrap();
        assert_eq!(args.concurrency, Some(1));
        let args = Args::try_parse_from(["stream-downloader", "--concurrency", "100"]).unwrap();
        assert_eq!(args.concurrency, Some(100));

        for bad in ["0", "101"] {
            let err = Args::try_parse_from(["stream-downloader", "-c", bad]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_task_timeout_zero_rejected() {
        let err = Args::try_parse_from(["stream-downloader", "--task-timeout", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        let args = Args::try_parse_from(["stream-downloader", "--task-timeout", "90"]).unwrap();
        assert_eq!(args.task_timeout, Some(90));
    }

    #[test]
    fn test_cli_repeated_headers() {
        let args = Args::try_parse_from([
            "stream-downloader",
            "-H",
            "Referer: https://player.example/",
            "--header",
            "Cookie: session=abc",
        ])
        .unwrap();
        assert_eq!(
            args.headers,
            vec!["Referer: https://player.example/", "Cookie: session=abc"]
        );
    }

    #[test]
    fn test_cli_positional_pairs() {
        let args = Args::try_parse_from([
            "stream-downloader",
            "https://x/a.m3u8=out/a.ts",
            "https://x/b.mp4=b.mp4",
        ])
        .unwrap();
        assert_eq!(args.pairs.len(), 2);
        assert_eq!(args.pairs[0].url, "https://x/a.m3u8");
        assert_eq!(args.pairs[0].destination, PathBuf::from("out/a.ts"));
    }

    #[test]
    fn test_cli_malformed_pair_rejected() {
        let err = Args::try_parse_from(["stream-downloader", "https://x/a.m3u8"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_parse_pair_keeps_query_string() {
        let pair = parse_pair("https://cdn.example/v.mp4?token=abc&exp=1=clip.mp4").unwrap();
        assert_eq!(pair.url, "https://cdn.example/v.mp4?token=abc&exp=1");
        assert_eq!(pair.destination, PathBuf::from("clip.mp4"));
    }

    #[test]
    fn test_parse_pair_rejects_empty_sides() {
        assert!(parse_pair("=dest.mp4").is_err());
        assert!(parse_pair("https://x/a.mp4=").is_err());
    }

    #[test]
    fn test_parse_input_lines_skips_comments_and_blanks() {
        let pairs = parse_input_lines(
            "# episode list\n\nhttps://x/ep1.m3u8   ep1.ts\nhttps://x/trailer.mp4 trailer.mp4\n",
        )
        .unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].destination, PathBuf::from("ep1.ts"));
        assert_eq!(pairs[1].url, "https://x/trailer.mp4");
    }

    #[test]
    fn test_parse_input_lines_rejects_missing_destination() {
        let err = parse_input_lines("https://x/a.mp4\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
