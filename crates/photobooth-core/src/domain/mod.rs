//! Domain entities
//!
//! This module contains the core domain types for the backup engine:
//! - Validated path newtypes for local-relative and remote paths
//! - The queued `Operation` record and its line encoding
//! - Domain-specific error types

pub mod errors;
pub mod newtypes;
pub mod operation;

// Re-export commonly used types
pub use errors::DomainError;
pub use newtypes::{RelativePath, RemotePath};
pub use operation::{Operation, OperationKind, FIELD_SEPARATOR};
