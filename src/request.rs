//! Request flags and cooperative cancellation

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::path;

/// Cooperative cancellation flag shared between a caller and the work it
/// started. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with `TaskInterrupted` if cancellation was requested.
    pub fn check(&self, what: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::interrupted(format!("{} cancelled", what)))
        } else {
            Ok(())
        }
    }
}

/// A content request: the path plus the flags that steer resolution.
#[derive(Debug, Clone)]
pub struct ResourceStoreRequest {
    path: String,
    /// Serve only what is already stored locally.
    pub local_only: bool,
    /// Skip the local copy and go to the origin.
    pub remote_only: bool,
    /// Treat local content as stale and bypass the negative cache.
    pub as_expired: bool,
    /// Members of a group are asked with remote access disabled.
    pub group_local_only: bool,
    pub cancellation: Cancellation,
    /// Repositories already consulted for this request.
    processed: HashSet<String>,
}

impl ResourceStoreRequest {
    /// A request for `path` with default flags.
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self {
            path: path::normalize_path(path)?,
            local_only: false,
            remote_only: false,
            as_expired: false,
            group_local_only: false,
            cancellation: Cancellation::new(),
            processed: HashSet::new(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn local_only(mut self, value: bool) -> Self {
        self.local_only = value;
        self
    }

    pub fn remote_only(mut self, value: bool) -> Self {
        self.remote_only = value;
        self
    }

    pub fn as_expired(mut self, value: bool) -> Self {
        self.as_expired = value;
        self
    }

    pub fn group_local_only(mut self, value: bool) -> Self {
        self.group_local_only = value;
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// The same request for another path, keeping flags and cancellation.
    pub fn for_path(&self, path: &str) -> Result<Self> {
        let mut request = self.clone();
        request.path = path::normalize_path(path)?;
        Ok(request)
    }

    /// Record that `repository_id` handled this request. Returns false if it
    /// already had.
    pub fn mark_processed(&mut self, repository_id: &str) -> bool {
        self.processed.insert(repository_id.to_string())
    }

    pub fn is_processed(&self, repository_id: &str) -> bool {
        self.processed.contains(repository_id)
    }
}
