//! # Negative cache
//!
//! Records paths an origin confirmed absent so that repeated requests fail
//! fast instead of hitting the origin again. Entries carry their own expiry
//! and are pruned lazily on lookup.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::item::now_millis;
use crate::path;

/// TTL-bounded set of paths known to be absent remotely.
///
/// Cloning shares the underlying entries.
#[derive(Debug, Clone, Default)]
pub struct NotFoundCache {
    entries: Arc<Mutex<HashMap<String, i64>>>,
}

impl NotFoundCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` as absent for `ttl_minutes`. A non-positive TTL records
    /// nothing.
    pub fn insert(&self, path: &str, ttl_minutes: i64) {
        self.insert_at(path, ttl_minutes, now_millis());
    }

    pub(crate) fn insert_at(&self, path: &str, ttl_minutes: i64, now: i64) {
        if ttl_minutes <= 0 {
            return;
        }
        let expires_at = now.saturating_add(ttl_minutes.saturating_mul(60_000));
        self.entries.lock().insert(path.to_string(), expires_at);
    }

    /// Returns true if `path` has an unexpired entry; expired entries are
    /// removed.
    pub fn contains(&self, path: &str) -> bool {
        self.contains_at(path, now_millis())
    }

    pub(crate) fn contains_at(&self, path: &str, now: i64) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(path) {
            Some(&expires_at) if expires_at > now => true,
            Some(_) => {
                entries.remove(path);
                false
            }
            None => false,
        }
    }

    pub fn remove(&self, path: &str) -> bool {
        self.entries.lock().remove(path).is_some()
    }

    /// Drop every entry; returns how many were removed.
    pub fn purge(&self) -> usize {
        let mut entries = self.entries.lock();
        let removed = entries.len();
        entries.clear();
        debug!("purged {} negative cache entries", removed);
        removed
    }

    /// Drop the entries at or below `prefix`.
    pub fn purge_under(&self, prefix: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|p, _| !path::is_under(p, prefix));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
