//! Domain error types
//!
//! This module defines error types specific to domain operations:
//! path validation failures and queue line parsing errors.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid relative path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// Operation kind not recognized
    #[error("Unknown operation kind: {0}")]
    UnknownOperation(String),

    /// A queue line that does not have the `kind;path` shape
    #[error("Malformed operation line: {0}")]
    MalformedLine(String),
}
