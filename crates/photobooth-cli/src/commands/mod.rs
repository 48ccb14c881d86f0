//! CLI subcommands and the context they share

pub mod config;
pub mod enqueue;
pub mod queue;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use photobooth_core::config::{expand_tilde, Config};
use photobooth_sync::queue::OperationQueue;
use tracing::debug;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Global options every command sees
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub format: OutputFormat,
    /// `--config`, if given
    pub config_override: Option<PathBuf>,
}

impl CommandContext {
    pub fn new(format: OutputFormat, config_override: Option<PathBuf>) -> Self {
        Self {
            format,
            config_override,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.is_json())
    }

    /// Configuration file in effect
    pub fn config_path(&self) -> PathBuf {
        self.config_override
            .clone()
            .unwrap_or_else(Config::default_path)
    }

    /// Read the configuration without validating it.
    ///
    /// A file named with `--config` must exist; a missing file at the default
    /// location means built-in defaults. A file that exists but cannot be
    /// parsed is always an error.
    pub fn read_config(&self) -> Result<Config> {
        let path = self.config_path();
        debug!(config_path = %path.display(), "Loading configuration");

        match &self.config_override {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display())),
            None => Config::load_or_default(&path),
        }
    }

    /// Read and validate the configuration
    pub fn load_config(&self) -> Result<Config> {
        let config = self.read_config()?;
        let errors = config.validate();
        if !errors.is_empty() {
            let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
            anyhow::bail!(
                "Invalid configuration in {}: {}",
                self.config_path().display(),
                details.join("; ")
            );
        }
        Ok(config)
    }
}

/// Open the queue named by `backup.queue_file`
pub fn open_queue(config: &Config) -> Result<OperationQueue> {
    let path = expand_tilde(&config.backup.queue_file);
    OperationQueue::open(&path).with_context(|| format!("Failed to open queue {}", path.display()))
}

/// Data directory that queued paths are relative to
pub fn local_root(config: &Config) -> PathBuf {
    expand_tilde(&config.backup.local_root)
}
