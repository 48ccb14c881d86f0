//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the two path flavours the
//! backup engine deals with. Each newtype ensures validity at construction time,
//! so anything that reaches the queue file or the remote store is well formed.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::operation::FIELD_SEPARATOR;

// ============================================================================
// RelativePath
// ============================================================================

/// A file path relative to the appliance data directory
///
/// Always `/`-separated, e.g. "images/20240101-120000.png". This is the path
/// stored in queued operations, so it can never contain the field separator
/// or a line break.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(String);

impl RelativePath {
    /// Create a new RelativePath
    ///
    /// # Errors
    /// Returns error if the path is empty, absolute, escapes its root or
    /// contains characters that would break the queue line format. A
    /// component may not start or end with whitespace, since queue lines
    /// are trimmed when read back.
    pub fn new(path: String) -> Result<Self, DomainError> {
        if path.is_empty() {
            return Err(DomainError::InvalidPath(
                "Path cannot be empty".to_string(),
            ));
        }

        if path.starts_with('/') {
            return Err(DomainError::InvalidPath(format!(
                "Path must be relative: {path}"
            )));
        }

        if path.contains(FIELD_SEPARATOR) || path.contains('\n') || path.contains('\r') {
            return Err(DomainError::InvalidPath(format!(
                "Path contains a reserved character: {path:?}"
            )));
        }

        for component in path.split('/') {
            if component.is_empty()
                || component == "."
                || component == ".."
                || component.trim() != component
            {
                return Err(DomainError::InvalidPath(format!(
                    "Invalid path component {component:?} in {path}"
                )));
            }
        }

        Ok(Self(path))
    }

    /// Build a RelativePath from a local path located under `root`
    ///
    /// Accepts either a path already relative to `root` or an absolute path
    /// inside it.
    ///
    /// # Errors
    /// Returns error if the path lies outside `root` or is not valid UTF-8
    pub fn from_local(root: &Path, path: &Path) -> Result<Self, DomainError> {
        let relative = if path.is_absolute() {
            path.strip_prefix(root).map_err(|_| {
                DomainError::InvalidPath(format!(
                    "{} is not within {}",
                    path.display(),
                    root.display()
                ))
            })?
        } else {
            path
        };

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(c) => {
                    let part = c.to_str().ok_or_else(|| {
                        DomainError::InvalidPath(format!(
                            "Path is not valid UTF-8: {}",
                            relative.display()
                        ))
                    })?;
                    parts.push(part);
                }
                Component::CurDir => {}
                _ => {
                    return Err(DomainError::InvalidPath(format!(
                        "Invalid path component in {}",
                        relative.display()
                    )))
                }
            }
        }

        Self::new(parts.join("/"))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the `/`-separated components
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Get the file name component
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Get the parent directory, or `None` for a top-level entry
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.rfind('/').map(|idx| Self(self.0[..idx].to_string()))
    }

    /// Resolve this path against a local root directory
    #[must_use]
    pub fn to_local(&self, root: &Path) -> PathBuf {
        self.components()
            .fold(root.to_path_buf(), |acc, part| acc.join(part))
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RelativePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RelativePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RelativePath> for String {
    fn from(path: RelativePath) -> Self {
        path.0
    }
}

// ============================================================================
// RemotePath
// ============================================================================

/// A path on the remote store (must start with /)
///
/// e.g. "/photobooth/images/20240101-120000.png"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// Create a new RemotePath
    ///
    /// # Errors
    /// Returns error if path doesn't start with /, or contains empty or
    /// traversal components
    pub fn new(path: String) -> Result<Self, DomainError> {
        if !path.starts_with('/') {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path must start with '/': {path}"
            )));
        }

        if path.len() > 1 && path.contains("//") {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path contains invalid double slashes: {path}"
            )));
        }

        if path.split('/').any(|c| c == "." || c == "..") {
            return Err(DomainError::InvalidRemotePath(format!(
                "Remote path contains invalid traversal: {path}"
            )));
        }

        // A trailing slash is accepted on input but not kept
        if path.len() > 1 && path.ends_with('/') {
            return Ok(Self(path.trim_end_matches('/').to_string()));
        }

        Ok(Self(path))
    }

    /// Create the root path "/"
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the root path
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Join a single path component
    ///
    /// # Errors
    /// Returns error if component is invalid
    pub fn join(&self, component: &str) -> Result<Self, DomainError> {
        if component.is_empty()
            || component.contains('/')
            || component == "."
            || component == ".."
        {
            return Err(DomainError::InvalidRemotePath(format!(
                "Invalid path component: {component}"
            )));
        }

        let new_path = if self.is_root() {
            format!("/{component}")
        } else {
            format!("{}/{component}", self.0)
        };

        Self::new(new_path)
    }

    /// Join every component of a [`RelativePath`]
    ///
    /// # Errors
    /// Returns error if a component is invalid
    pub fn join_relative(&self, relative: &RelativePath) -> Result<Self, DomainError> {
        relative
            .components()
            .try_fold(self.clone(), |acc, part| acc.join(part))
    }

    /// Get the parent path
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }

        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Get the file name component
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }

        self.0.rsplit('/').next()
    }
}

impl Display for RemotePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemotePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemotePath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}

// ============================================================================
// Tests
// ============================================================================
