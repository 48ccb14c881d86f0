//! Enqueue command - queue files for upload
//!
//! This is the producer side of the backup: the capture application (or a
//! shell hook) calls `photobooth enqueue <file>...` after writing a file
//! below the data directory. Each file becomes one `push` operation appended
//! to the queue; the worker picks them up in order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use photobooth_core::domain::{Operation, RelativePath};
use tracing::debug;

use super::{local_root, open_queue, CommandContext};
use crate::output::plural;

/// Queue one or more files for upload
#[derive(Debug, Args)]
pub struct EnqueueCommand {
    /// Files to upload, absolute or relative to the data directory
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

impl EnqueueCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let root = local_root(&config);
        let queue = open_queue(&config)?;

        let mut queued = Vec::new();
        let mut failed = Vec::new();

        for path in &self.paths {
            match resolve_operation(&root, path) {
                Ok(op) => {
                    queue
                        .enqueue(&op)
                        .with_context(|| format!("Failed to append to {}", queue.path().display()))?;
                    debug!(path = %op.path(), "Queued push");
                    queued.push(op);
                }
                Err(e) => failed.push((path.clone(), e.to_string())),
            }
        }

        if ctx.is_json() {
            let json = serde_json::json!({
                "queued": queued.iter().map(|op| op.path().as_str()).collect::<Vec<_>>(),
                "failed": failed
                    .iter()
                    .map(|(path, error)| serde_json::json!({
                        "path": path.display().to_string(),
                        "error": error,
                    }))
                    .collect::<Vec<_>>(),
            });
            formatter.print_json(&json);
        } else {
            if !queued.is_empty() {
                formatter.success(&format!(
                    "Queued {} file{} for upload",
                    queued.len(),
                    plural(queued.len())
                ));
                for op in &queued {
                    formatter.info(op.path().as_str());
                }
            }
            for (path, error) in &failed {
                formatter.error(&format!("{}: {error}", path.display()));
            }
        }

        if !failed.is_empty() {
            anyhow::bail!("{} path{} could not be queued", failed.len(), plural(failed.len()));
        }
        Ok(())
    }
}

/// Turn a command-line path into a push operation
///
/// Relative arguments are taken relative to `root`, not to the working
/// directory, so hooks can pass the same paths the queue stores.
fn resolve_operation(root: &Path, path: &Path) -> Result<Operation> {
    let relative = RelativePath::from_local(root, path)?;
    let local = relative.to_local(root);
    if !local.is_file() {
        anyhow::bail!("{} is not a regular file", local.display());
    }
    Ok(Operation::push(relative))
}
