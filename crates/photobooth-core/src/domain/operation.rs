//! Queued backup operations
//!
//! An [`Operation`] is a durable intent to act on one local file. It is
//! created by the producer (the capture handler), persisted as a single
//! `kind;path` line in the queue file and destroyed by the sync worker once
//! the remote side has confirmed it.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::RelativePath;

/// Separator between the kind and the path in a queue line
pub const FIELD_SEPARATOR: char = ';';

/// Kind of queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Upload a local file to the remote store
    Push,
}

impl OperationKind {
    /// Text form used in the queue file
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            other => Err(DomainError::UnknownOperation(other.to_string())),
        }
    }
}

/// A single pending operation
///
/// Immutable once created; equality is structural so identical operations
/// queued twice compare equal but are still processed independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    kind: OperationKind,
    path: RelativePath,
}

impl Operation {
    /// Create an operation of the given kind
    #[must_use]
    pub fn new(kind: OperationKind, path: RelativePath) -> Self {
        Self { kind, path }
    }

    /// Shorthand for a push operation
    #[must_use]
    pub fn push(path: RelativePath) -> Self {
        Self::new(OperationKind::Push, path)
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn path(&self) -> &RelativePath {
        &self.path
    }

    /// Encode as a queue line, without the trailing newline
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{}{FIELD_SEPARATOR}{}", self.kind, self.path)
    }

    /// Decode a queue line
    ///
    /// Surrounding whitespace (including the line terminator) is ignored.
    ///
    /// # Errors
    /// Returns error if the separator is missing, the kind is unknown or the
    /// path is invalid
    pub fn parse_line(line: &str) -> Result<Self, DomainError> {
        let trimmed = line.trim();
        let (kind, path) = trimmed
            .split_once(FIELD_SEPARATOR)
            .ok_or_else(|| DomainError::MalformedLine(trimmed.to_string()))?;

        Ok(Self {
            kind: kind.parse()?,
            path: RelativePath::new(path.to_string())?,
        })
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path)
    }
}

impl FromStr for Operation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_line(s)
    }
}
