use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MIN_QUIET_PERIOD_MS: u64 = 100;
pub const MAX_QUIET_PERIOD_MS: u64 = 60_000;
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 1_000;

const SPOOL_DIR_NAME: &str = "spool";
const REFRESH_DIR_NAME: &str = "refresh";

/// Daemon configuration. Deserialized from sync.toml in the app data
/// directory; every field is optional.
#[derive(Debug, Deserialize)]
pub struct SyncConfig {
    /// Debounce quiet period in milliseconds. Clamped to [100, 60000].
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    /// Overrides the spool directory the UI shell writes notifications into.
    #[serde(default)]
    pub spool_dir: Option<String>,
    /// Overrides the directory refresh markers are written to.
    #[serde(default)]
    pub refresh_dir: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: DEFAULT_QUIET_PERIOD_MS,
            spool_dir: None,
            refresh_dir: None,
        }
    }
}

impl SyncConfig {
    /// Returns the quiet period as a [`Duration`], clamped to the supported
    /// range.
    pub fn effective_quiet_period(&self) -> Duration {
        Duration::from_millis(
            self.quiet_period_ms
                .clamp(MIN_QUIET_PERIOD_MS, MAX_QUIET_PERIOD_MS),
        )
    }

    /// Spool directory, defaulting to `<app_dir>/spool`.
    pub fn spool_dir(&self, app_dir: &Path) -> PathBuf {
        match &self.spool_dir {
            Some(dir) => PathBuf::from(dir),
            None => app_dir.join(SPOOL_DIR_NAME),
        }
    }

    /// Refresh-marker directory, defaulting to `<app_dir>/refresh`.
    pub fn refresh_dir(&self, app_dir: &Path) -> PathBuf {
        match &self.refresh_dir {
            Some(dir) => PathBuf::from(dir),
            None => app_dir.join(REFRESH_DIR_NAME),
        }
    }
}

/// Loads the config file at `path`, returning `SyncConfig::default()` if the
/// file does not exist. Returns an error if the file exists but cannot be
/// read or parsed.
pub fn load_or_default(path: &Path) -> Result<SyncConfig> {
    if !path.exists() {
        return Ok(SyncConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn default_quiet_period_ms() -> u64 {
    DEFAULT_QUIET_PERIOD_MS
}
