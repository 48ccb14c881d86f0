//! Config command - View and manage the backup configuration
//!
//! Provides the `photobooth config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Sets individual values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Prints the configuration file location

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use photobooth_core::config::Config;
use tracing::info;

use super::CommandContext;
use crate::output::plural;

/// Keys accepted by `config set`, with a short description
const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("backup.enabled", "true|false"),
    ("backup.queue_file", "Queue file path"),
    ("backup.local_root", "Local data directory"),
    ("backup.store_root", "Mount point of the remote share"),
    ("backup.store_marker", "File proving the share is mounted, empty to unset"),
    ("backup.remote_root", "Remote directory mirroring the data directory"),
    ("backup.captures_dir", "Captures directory, relative"),
    ("backup.backgrounds_dir", "Backgrounds directory, relative"),
    ("backup.placeholder", "File name never deleted or pulled"),
    ("backup.retry_interval_secs", "Seconds to wait after a failure"),
    ("backup.step_pause_secs", "Seconds between reconciliation steps"),
    ("backup.cycle_pause_secs", "Seconds between cycles"),
    ("backup.obsolete_grace_secs", "Minimum age before local deletion"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.format", "text|json"),
];

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "backup.retry_interval_secs")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Set { key, value } => self.execute_set(ctx, key, value),
            ConfigCommand::Validate => self.execute_validate(ctx),
            ConfigCommand::Path => self.execute_path(ctx),
        }
    }

    fn execute_show(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config_path = ctx.config_path();
        let config = ctx.read_config()?;

        info!(config_path = %config_path.display(), "Showing configuration");

        if ctx.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    fn execute_set(&self, ctx: &CommandContext, key: &str, value: &str) -> Result<()> {
        let formatter = ctx.formatter();
        let config_path = ctx.config_path();

        // A missing file is created from defaults
        let mut config = if config_path.exists() {
            Config::load(&config_path).with_context(|| {
                format!("Failed to load configuration from {}", config_path.display())
            })?
        } else {
            Config::default()
        };

        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{key}': {e}"));
                formatter.info("");
                formatter.info("Supported keys:");
                for (name, description) in SUPPORTED_KEYS {
                    formatter.info(&format!("  {name:<30} - {description}"));
                }
            }
            anyhow::bail!("Configuration not changed");
        }

        let errors: Vec<String> = config.validate().iter().map(ToString::to_string).collect();
        if !errors.is_empty() {
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": errors,
                }));
            } else {
                formatter.error(&format!("Invalid value for '{key}': {}", errors.join("; ")));
            }
            anyhow::bail!("Configuration not changed");
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        std::fs::write(&config_path, yaml).context("Failed to write configuration file")?;

        if ctx.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {key} = {value}"));
            formatter.info(&format!("Saved to {}", config_path.display()));
        }

        Ok(())
    }

    fn execute_validate(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config_path = ctx.config_path();

        if !config_path.exists() {
            if ctx.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": true,
                    "config_path": config_path.display().to_string(),
                    "errors": [],
                    "using_defaults": true,
                }));
            } else {
                formatter.info(&format!(
                    "Configuration file not found at {}",
                    config_path.display()
                ));
                formatter.success("Built-in defaults are valid");
                formatter.info(
                    "Run 'photobooth config set <key> <value>' to create a configuration file.",
                );
            }
            return Ok(());
        }

        let config = match Config::load(&config_path) {
            Ok(config) => config,
            Err(e) => {
                if ctx.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {e:#}")],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse configuration: {e:#}"));
                    formatter.info(&format!("File: {}", config_path.display()));
                }
                anyhow::bail!("Configuration is invalid");
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");
        let errors = config.validate();

        if ctx.is_json() {
            let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                plural(errors.len())
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!("Configuration is invalid")
        }
    }

    fn execute_path(&self, ctx: &CommandContext) -> Result<()> {
        let config_path = ctx.config_path();
        if ctx.is_json() {
            ctx.formatter().print_json(&serde_json::json!({
                "config_path": config_path.display().to_string(),
                "exists": config_path.exists(),
            }));
        } else {
            println!("{}", config_path.display());
        }
        Ok(())
    }
}

/// Apply a dot-notation `key` to `config`, parsing `value` for its type.
///
/// Only parses; range and consistency checks are left to `Config::validate`.
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    let backup = &mut config.backup;
    match key {
        "backup.enabled" => backup.enabled = parse_bool(value)?,
        "backup.queue_file" => backup.queue_file = PathBuf::from(value),
        "backup.local_root" => backup.local_root = PathBuf::from(value),
        "backup.store_root" => backup.store_root = PathBuf::from(value),
        "backup.store_marker" => {
            backup.store_marker = (!value.is_empty()).then(|| value.to_string());
        }
        "backup.remote_root" => backup.remote_root = value.to_string(),
        "backup.captures_dir" => backup.captures_dir = value.to_string(),
        "backup.backgrounds_dir" => backup.backgrounds_dir = value.to_string(),
        "backup.placeholder" => backup.placeholder = value.to_string(),
        "backup.retry_interval_secs" => backup.retry_interval_secs = parse_secs(value)?,
        "backup.step_pause_secs" => backup.step_pause_secs = parse_secs(value)?,
        "backup.cycle_pause_secs" => backup.cycle_pause_secs = parse_secs(value)?,
        "backup.obsolete_grace_secs" => backup.obsolete_grace_secs = parse_secs(value)?,
        "logging.level" => config.logging.level = value.to_string(),
        "logging.format" => config.logging.format = value.to_string(),
        _ => anyhow::bail!("Unknown configuration key: {key}"),
    }
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => anyhow::bail!("Expected true or false, got '{value}'"),
    }
}

fn parse_secs(value: &str) -> Result<u64> {
    value
        .parse()
        .with_context(|| format!("Expected a number of seconds, got '{value}'"))
}
