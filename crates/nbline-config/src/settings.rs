use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_LOG_FILTER: &str = "warn";
const DEFAULT_RETENTION_DAYS: u64 = 7;
const MAX_RETENTION_DAYS: u64 = 36_500;
const DEFAULT_INDENT: usize = 1;
const MAX_INDENT: usize = 16;

/// Top-level configuration schema loaded from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub write: WriteSettings,
}

/// Logging filter and optional file output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSettings {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            dir: None,
            retention_days: default_retention_days(),
        }
    }
}

/// Options for the on-disk notebook writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteSettings {
    #[serde(default = "default_indent")]
    pub indent: usize,
}

impl Default for WriteSettings {
    fn default() -> Self {
        Self {
            indent: default_indent(),
        }
    }
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

fn default_retention_days() -> u64 {
    DEFAULT_RETENTION_DAYS
}

fn default_indent() -> usize {
    DEFAULT_INDENT
}

impl Settings {
    /// Parse and validate settings TOML.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let settings: Self = toml::from_str(input).context("failed to parse config TOML")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load and validate settings from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;

        Self::from_toml_str(&raw).with_context(|| format!("invalid config at {}", path.display()))
    }

    /// Resolve settings for a run.
    ///
    /// Precedence: explicit path (must exist) > `default_path()` if present > defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }

        match default_path() {
            Some(path) if path.is_file() => Self::from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Validate semantic constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.log.filter.trim().is_empty() {
            bail!("log.filter must not be empty");
        }
        if self.log.retention_days == 0 {
            bail!("log.retention_days must be at least 1");
        }
        if self.log.retention_days > MAX_RETENTION_DAYS {
            bail!(
                "log.retention_days must be at most {MAX_RETENTION_DAYS}, got {}",
                self.log.retention_days
            );
        }
        if let Some(dir) = &self.log.dir {
            if dir.as_os_str().is_empty() {
                bail!("log.dir must not be empty when set");
            }
        }
        if self.write.indent > MAX_INDENT {
            bail!(
                "write.indent must be at most {MAX_INDENT}, got {}",
                self.write.indent
            );
        }
        Ok(())
    }
}

/// Platform config location: `$XDG_CONFIG_HOME/nbline/config.toml` on Linux,
/// `~/Library/Application Support/nbline/config.toml` on macOS.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("nbline").join("config.toml"))
}
