//! Player configuration.
//!
//! Loaded once at startup and handed to the session by reference. Every
//! field has a default so an absent or partial `setting.json` is valid.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error_codes::PlaybackError;

pub const DEFAULT_CONFIG_FILE: &str = "setting.json";
pub const DEFAULT_CHARSET: &str = "standard";
const LEGACY_DEFAULT_KEY: &str = "DefaultCharset";

const BUILTIN_CHARSETS: &[(&str, &str)] = &[
    ("standard", " .:-=+*#%@"),
    (
        "dense",
        " .'`^\",:;Il!i~+_-?][}{1)(|\\/tfjrxnuvczXYUJCLQ0OZmwqpdbkhao*#MW&8%B@$",
    ),
    ("blocks", " ░▒▓█"),
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    pub default_charset: String,
    pub charsets: BTreeMap<String, String>,
    pub buffer: BufferConfig,
    pub pacing: PacingConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferConfig {
    pub color_capacity: usize,
    pub grayscale_capacity: usize,
}

/// Pacing thresholds. The catch-up threshold and drop cap are starting
/// points rather than measured optima, so they stay tunable.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacingConfig {
    pub sleep_threshold_ms: u64,
    pub catch_up_threshold_ms: u64,
    pub max_drop_per_cycle: usize,
    pub pop_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub max_empty_reads: u32,
    pub empty_read_backoff_ms: u64,
    pub push_retry_ms: u64,
    pub read_timeout_ms: u64,
    pub open_timeout_ms: u64,
    pub decode_max_width: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_charset: DEFAULT_CHARSET.to_owned(),
            charsets: BTreeMap::new(),
            buffer: BufferConfig::default(),
            pacing: PacingConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            color_capacity: 2,
            grayscale_capacity: 5,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            sleep_threshold_ms: 1,
            catch_up_threshold_ms: 100,
            max_drop_per_cycle: 3,
            pop_timeout_ms: 50,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            max_empty_reads: 5,
            empty_read_backoff_ms: 10,
            push_retry_ms: 5,
            read_timeout_ms: 50,
            open_timeout_ms: 10_000,
            decode_max_width: 640,
        }
    }
}

impl BufferConfig {
    /// Color frames carry an escape sequence per cell, so less of them are
    /// buffered before the producer is held back.
    pub fn capacity_for(&self, color: bool) -> usize {
        if color {
            self.color_capacity
        } else {
            self.grayscale_capacity
        }
    }
}

impl PacingConfig {
    pub fn sleep_threshold(&self) -> Duration {
        Duration::from_millis(self.sleep_threshold_ms)
    }

    pub fn catch_up_threshold(&self) -> Duration {
        Duration::from_millis(self.catch_up_threshold_ms)
    }

    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }
}

impl SourceConfig {
    pub fn empty_read_backoff(&self) -> Duration {
        Duration::from_millis(self.empty_read_backoff_ms)
    }

    pub fn push_retry(&self) -> Duration {
        Duration::from_millis(self.push_retry_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

impl PlayerConfig {
    /// Parses either the sectioned format or the flat legacy one, where
    /// `DefaultCharset` names the palette and every other key is a palette.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|error| PlaybackError::config(format!("invalid config JSON: {error}")))?;
        let config = match value.get(LEGACY_DEFAULT_KEY) {
            Some(_) => Self::from_legacy(value)?,
            None => serde_json::from_value(value)
                .map_err(|error| PlaybackError::config(format!("invalid config JSON: {error}")))?,
        };
        config.validate()?;
        Ok(config)
    }

    fn from_legacy(value: serde_json::Value) -> Result<Self> {
        let entries: BTreeMap<String, String> = serde_json::from_value(value).map_err(|error| {
            PlaybackError::config(format!("legacy config values must be strings: {error}"))
        })?;
        log::debug!("reading legacy flat charset config");

        let mut config = Self::default();
        for (key, palette) in entries {
            if key == LEGACY_DEFAULT_KEY {
                config.default_charset = palette;
            } else {
                config.charsets.insert(key, palette);
            }
        }
        Ok(config)
    }

    /// Loads `path` when given; otherwise the first `setting.json` found
    /// beside the executable or in the working directory; otherwise
    /// defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_file(path);
        }

        for candidate in default_config_candidates() {
            if candidate.is_file() {
                log::debug!("loading config from {}", candidate.display());
                return Self::load_file(&candidate);
            }
        }

        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|error| {
            PlaybackError::config(format!(
                "failed to read config {}: {error}",
                path.display()
            ))
        })?;
        Self::from_json(&raw).with_context(|| format!("in config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, palette) in &self.charsets {
            if palette.chars().count() == 0 {
                return Err(PlaybackError::config(format!("charset '{name}' is empty")).into());
            }
        }
        if self.palette(&self.default_charset).is_none() {
            return Err(PlaybackError::config(format!(
                "default_charset '{}' is not a known charset",
                self.default_charset
            ))
            .into());
        }
        if self.buffer.color_capacity == 0 || self.buffer.grayscale_capacity == 0 {
            return Err(PlaybackError::config("buffer capacities must be > 0").into());
        }
        if self.source.max_empty_reads == 0 {
            return Err(PlaybackError::config("source.max_empty_reads must be > 0").into());
        }
        if self.source.decode_max_width < 2 {
            return Err(PlaybackError::config("source.decode_max_width must be >= 2").into());
        }
        Ok(())
    }

    /// User-defined charsets shadow the built-in ones of the same name.
    pub fn palette(&self, name: &str) -> Option<&str> {
        self.charsets.get(name).map(String::as_str).or_else(|| {
            BUILTIN_CHARSETS
                .iter()
                .find(|(builtin, _)| *builtin == name)
                .map(|(_, palette)| *palette)
        })
    }

    pub fn resolve_palette(&self, requested: Option<&str>) -> Result<&str> {
        let name = requested.unwrap_or(&self.default_charset);
        self.palette(name).ok_or_else(|| {
            PlaybackError::config(format!(
                "unknown charset '{name}' (available: {})",
                self.charset_names().join(", ")
            ))
            .into()
        })
    }

    pub fn charset_names(&self) -> Vec<String> {
        let mut names = BUILTIN_CHARSETS
            .iter()
            .map(|(name, _)| (*name).to_owned())
            .collect::<Vec<_>>();
        for name in self.charsets.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

fn default_config_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join(DEFAULT_CONFIG_FILE));
    }
    candidates.push(PathBuf::from(DEFAULT_CONFIG_FILE));
    candidates
}
