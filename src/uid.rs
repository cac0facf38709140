//! Repository item identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::path::{self, PATH_ROOT};

/// Identifies an item: a repository id plus a normalized absolute path.
///
/// Used as both the lock key and the store key. Two UIDs are equal iff their
/// repository ids and normalized paths are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryItemUid {
    repository_id: String,
    path: String,
}

impl RepositoryItemUid {
    /// Create a UID, normalizing the path.
    pub fn new(repository_id: &str, path: &str) -> Result<Self> {
        Ok(Self {
            repository_id: repository_id.to_string(),
            path: path::normalize_path(path)?,
        })
    }

    /// The UID of a repository's root collection.
    pub fn root(repository_id: &str) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            path: PATH_ROOT.to_string(),
        }
    }

    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path == PATH_ROOT
    }

    /// Last path segment; empty for the root.
    pub fn name(&self) -> &str {
        path::file_name(&self.path)
    }

    pub fn parent(&self) -> Option<Self> {
        path::parent_path(&self.path).map(|path| Self {
            repository_id: self.repository_id.clone(),
            path,
        })
    }

    pub fn child(&self, name: &str) -> Result<Self> {
        Ok(Self {
            repository_id: self.repository_id.clone(),
            path: path::join(&self.path, name)?,
        })
    }

    /// The same path in another repository.
    pub fn with_repository(&self, repository_id: &str) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            path: self.path.clone(),
        }
    }
}

impl fmt::Display for RepositoryItemUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository_id, self.path)
    }
}
