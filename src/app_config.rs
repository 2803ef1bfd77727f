//! Application configuration loading for CLI defaults.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// TOML-backed file configuration for downloader defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Default concurrency (same range as CLI).
    pub concurrency: Option<u8>,
    /// Default per-task deadline in seconds.
    pub task_timeout_secs: Option<u64>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
    /// Segments an HLS task may fetch ahead of its writer.
    pub segment_window: Option<usize>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
    /// `Name: value` headers sent with every request, in file order.
    pub headers: Vec<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        if let Some(task_timeout) = self.task_timeout_secs
            && task_timeout == 0
        {
            bail!("Invalid config value for `task_timeout_secs`: 0. Expected a positive value");
        }
        if let Some(window) = self.segment_window
            && !(1..=4096).contains(&window)
        {
            bail!("Invalid config value for `segment_window`: {window}. Expected range: 1..=4096");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    match value {
        Some(secs) if !(1..=3600).contains(&secs) => {
            bail!("Invalid config value for `{field}`: {secs}. Expected range: 1..=3600")
        }
        _ => Ok(()),
    }
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Quiet,
    Default,
    Verbose,
    Debug,
}

impl VerbositySetting {
    /// Tracing filter used when neither `RUST_LOG` nor a CLI flag decides.
    #[must_use]
    pub fn filter_directive(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Debug => "trace",
        }
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/stream-downloader/config.toml`
/// 2. `$HOME/.config/stream-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(env_var_non_empty_os("XDG_CONFIG_HOME"), env_var_non_empty_os("HOME"))
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg_config_home) = xdg_config_home {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("stream-downloader")
                .join("config.toml"),
        );
    }
    Some(
        PathBuf::from(home?)
            .join(".config")
            .join("stream-downloader")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist. The default path is optional: a missing
/// file yields `FileConfig::default()`.
pub fn load_config(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return load_file_config(path);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();

        match key {
            "concurrency" => {
                let parsed = parse_integer(value)
                    .with_context(|| format!("Invalid `concurrency` value on line {line_no}"))?;
                let parsed = u8::try_from(parsed).map_err(|_| {
                    anyhow::anyhow!("Invalid `concurrency` value on line {line_no}: out of range")
                })?;
                cfg.concurrency = Some(parsed);
            }
            "task_timeout_secs" => {
                cfg.task_timeout_secs = Some(parse_integer(value).with_context(|| {
                    format!("Invalid `task_timeout_secs` value on line {line_no}")
                })?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer(value).with_context(|| {
                    format!("Invalid `connect_timeout_secs` value on line {line_no}")
                })?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer(value).with_context(|| {
                    format!("Invalid `read_timeout_secs` value on line {line_no}")
                })?);
            }
            "segment_window" => {
                let parsed = parse_integer(value)
                    .with_context(|| format!("Invalid `segment_window` value on line {line_no}"))?;
                cfg.segment_window = Some(usize::try_from(parsed).map_err(|_| {
                    anyhow::anyhow!("Invalid `segment_window` value on line {line_no}: out of range")
                })?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `verbosity` value on line {line_no}"))?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            "header" => {
                let parsed = parse_string_literal(value)
                    .with_context(|| format!("Invalid `header` value on line {line_no}"))?;
                if !parsed.contains(':') {
                    bail!("Invalid `header` value on line {line_no}: expected \"Name: value\"");
                }
                cfg.headers.push(parsed);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Cuts a trailing `# comment`, ignoring `#` inside a quoted value.
fn strip_inline_comment(line: &str) -> &str {
    let mut quoted = false;
    let cut = line.char_indices().find(|&(_, ch)| {
        if ch == '"' {
            quoted = !quoted;
        }
        ch == '#' && !quoted
    });
    cut.map_or(line, |(index, _)| &line[..index])
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    raw_value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Expected double-quoted string"))
}

fn parse_integer(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    if token.starts_with('-') {
        bail!("Expected non-negative integer");
    }
    Ok(token.parse::<u64>()?)
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "quiet" => Ok(VerbositySetting::Quiet),
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: quiet, default, verbose, debug"),
    }
}
