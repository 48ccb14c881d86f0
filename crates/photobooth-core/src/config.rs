//! Configuration module for the photobooth backup engine.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::domain::newtypes::{RelativePath, RemotePath};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backup: BackupConfig,
    pub logging: LoggingConfig,
}

/// Remote backup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Whether the sync worker runs at all.
    pub enabled: bool,
    /// Path of the durable operation queue file.
    pub queue_file: PathBuf,
    /// Local directory that queued relative paths are resolved against.
    pub local_root: PathBuf,
    /// Directory backing the remote store (usually a mounted network share).
    pub store_root: PathBuf,
    /// File that must exist in `store_root` for the share to count as
    /// mounted. When unset, `store_root` itself must be a mount point.
    pub store_marker: Option<String>,
    /// Remote directory that mirrors `local_root`.
    pub remote_root: String,
    /// Directory holding captured photos (obsolete-deletion only).
    pub captures_dir: String,
    /// Directory holding backgrounds (obsolete-deletion and pull).
    pub backgrounds_dir: String,
    /// Local file name that reconciliation never deletes.
    pub placeholder: String,
    /// Seconds to wait before retrying a failed push.
    pub retry_interval_secs: u64,
    /// Seconds to pause between reconciliation steps.
    pub step_pause_secs: u64,
    /// Seconds to pause at the end of each cycle.
    pub cycle_pause_secs: u64,
    /// Local files younger than this are never treated as obsolete.
    pub obsolete_grace_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    /// Load from `path`, or return [`Config::default`] if the file does not
    /// exist.
    ///
    /// # Errors
    /// An existing file that cannot be read or parsed is an error; it is
    /// never replaced by defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content, path),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read configuration {}", path.display())),
        }
    }

    fn parse(content: &str, path: &Path) -> anyhow::Result<Self> {
        serde_yaml::from_str(content)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/photobooth/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("photobooth")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("photobooth")
}

impl Default for BackupConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            enabled: true,
            queue_file: data_dir.join("sync-queue"),
            local_root: data_dir,
            store_root: PathBuf::from("/mnt/photobooth-backup"),
            store_marker: None,
            remote_root: "/photobooth".to_string(),
            captures_dir: "images".to_string(),
            backgrounds_dir: "backgrounds".to_string(),
            placeholder: "empty".to_string(),
            retry_interval_secs: 30,
            step_pause_secs: 1,
            cycle_pause_secs: 1,
            obsolete_grace_secs: 5 * 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed accessors
// ---------------------------------------------------------------------------

impl BackupConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn step_pause(&self) -> Duration {
        Duration::from_secs(self.step_pause_secs)
    }

    pub fn cycle_pause(&self) -> Duration {
        Duration::from_secs(self.cycle_pause_secs)
    }

    pub fn obsolete_grace(&self) -> Duration {
        Duration::from_secs(self.obsolete_grace_secs)
    }

    /// `remote_root` parsed as a [`RemotePath`].
    pub fn remote_root_path(&self) -> anyhow::Result<RemotePath> {
        Ok(RemotePath::new(self.remote_root.clone())?)
    }

    pub fn captures_path(&self) -> anyhow::Result<RelativePath> {
        Ok(RelativePath::new(self.captures_dir.clone())?)
    }

    pub fn backgrounds_path(&self) -> anyhow::Result<RelativePath> {
        Ok(RelativePath::new(self.backgrounds_dir.clone())?)
    }
}

/// Expand a leading `~` to the user's home directory.
///
/// Paths without a leading `~` are returned unchanged.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"backup.retry_interval_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let backup = &self.backup;

        // --- backup ---
        for (field, value) in [
            ("backup.retry_interval_secs", backup.retry_interval_secs),
            ("backup.step_pause_secs", backup.step_pause_secs),
            ("backup.cycle_pause_secs", backup.cycle_pause_secs),
        ] {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        }

        if let Err(e) = RemotePath::new(backup.remote_root.clone()) {
            errors.push(ValidationError {
                field: "backup.remote_root".into(),
                message: e.to_string(),
            });
        }

        for (field, value) in [
            ("backup.captures_dir", &backup.captures_dir),
            ("backup.backgrounds_dir", &backup.backgrounds_dir),
        ] {
            if let Err(e) = RelativePath::new(value.clone()) {
                errors.push(ValidationError {
                    field: field.into(),
                    message: e.to_string(),
                });
            }
        }

        if backup.captures_dir == backup.backgrounds_dir {
            errors.push(ValidationError {
                field: "backup.backgrounds_dir".into(),
                message: "must differ from backup.captures_dir".into(),
            });
        }

        if backup.placeholder.is_empty() || backup.placeholder.contains('/') {
            errors.push(ValidationError {
                field: "backup.placeholder".into(),
                message: "must be a plain, non-empty file name".into(),
            });
        }

        if let Some(marker) = &backup.store_marker {
            if marker.is_empty() || marker.contains('/') {
                errors.push(ValidationError {
                    field: "backup.store_marker".into(),
                    message: "must be a plain, non-empty file name".into(),
                });
            }
        }

        if backup.queue_file.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "backup.queue_file".into(),
                message: "must not be empty".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use photobooth_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .backup_store_root(PathBuf::from("/mnt/nas"))
///     .backup_retry_interval_secs(60)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- backup ---

    pub fn backup_enabled(mut self, enabled: bool) -> Self {
        self.config.backup.enabled = enabled;
        self
    }

    pub fn backup_queue_file(mut self, path: PathBuf) -> Self {
        self.config.backup.queue_file = path;
        self
    }

    pub fn backup_local_root(mut self, path: PathBuf) -> Self {
        self.config.backup.local_root = path;
        self
    }

    pub fn backup_store_root(mut self, path: PathBuf) -> Self {
        self.config.backup.store_root = path;
        self
    }

    pub fn backup_store_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.backup.store_marker = Some(marker.into());
        self
    }

    pub fn backup_remote_root(mut self, root: impl Into<String>) -> Self {
        self.config.backup.remote_root = root.into();
        self
    }

    pub fn backup_captures_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.backup.captures_dir = dir.into();
        self
    }

    pub fn backup_backgrounds_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.backup.backgrounds_dir = dir.into();
        self
    }

    pub fn backup_placeholder(mut self, name: impl Into<String>) -> Self {
        self.config.backup.placeholder = name.into();
        self
    }

    pub fn backup_retry_interval_secs(mut self, seconds: u64) -> Self {
        self.config.backup.retry_interval_secs = seconds;
        self
    }

    pub fn backup_step_pause_secs(mut self, seconds: u64) -> Self {
        self.config.backup.step_pause_secs = seconds;
        self
    }

    pub fn backup_cycle_pause_secs(mut self, seconds: u64) -> Self {
        self.config.backup.cycle_pause_secs = seconds;
        self
    }

    pub fn backup_obsolete_grace_secs(mut self, seconds: u64) -> Self {
        self.config.backup.obsolete_grace_secs = seconds;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
