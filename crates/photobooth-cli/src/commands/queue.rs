//! Queue command - show pending operations

use anyhow::{Context, Result};
use clap::Args;
use photobooth_sync::SyncError;

use super::{open_queue, CommandContext};
use crate::output::plural;

/// List pending and rejected operations
#[derive(Debug, Args)]
pub struct QueueCommand {}

impl QueueCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let queue = open_queue(&config)?;

        let pending = match queue.pending() {
            Ok(pending) => pending,
            Err(SyncError::MalformedEntry { line, source }) => {
                formatter.error(&format!(
                    "Queue contains a malformed entry '{line}': {source}. \
                     The sync worker will move it to {}",
                    queue.rejected_path().display()
                ));
                anyhow::bail!("Queue {} is not readable", queue.path().display());
            }
            Err(e) => return Err(e).context("Failed to read queue"),
        };
        let rejected = queue.rejected().context("Failed to read rejected entries")?;

        if ctx.is_json() {
            let json = serde_json::json!({
                "queue_file": queue.path().display().to_string(),
                "pending": pending
                    .iter()
                    .map(|op| serde_json::json!({
                        "kind": op.kind().to_string(),
                        "path": op.path().as_str(),
                    }))
                    .collect::<Vec<_>>(),
                "rejected": rejected,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        if pending.is_empty() {
            formatter.success("Queue is empty");
        } else {
            formatter.success(&format!(
                "{} pending operation{}",
                pending.len(),
                plural(pending.len())
            ));
            for op in &pending {
                formatter.info(&op.to_string());
            }
        }

        if !rejected.is_empty() {
            formatter.warn(&format!(
                "{} rejected line{} in {}",
                rejected.len(),
                plural(rejected.len()),
                queue.rejected_path().display()
            ));
            for line in &rejected {
                formatter.info(line);
            }
        }

        Ok(())
    }
}
