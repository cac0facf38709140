//! # Per-item locking
//!
//! `PathLockRegistry` hands out mutual exclusion keyed by
//! [`RepositoryItemUid`]. It is an owned value, shared through `Arc` by the
//! repositories of one registry, so independent registries (for example in
//! tests) never share lock state.
//!
//! Locks are reentrant for the thread that holds them: nested `lock` calls
//! from the owning thread only bump a hold counter and must be matched by the
//! same number of unlocks. Other threads locking the same UID block until the
//! hold counter drops back to zero. Locks on different UIDs are independent.
//!
//! Every `lock` also takes a reference on the registry slot for the UID; the
//! slot is removed once the last reference is released, so the registry only
//! holds entries for UIDs that are locked or being waited for.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use log::{debug, trace};
use parking_lot::{Condvar, Mutex};

use crate::uid::RepositoryItemUid;

#[derive(Debug, Default)]
struct SlotState {
    owner: Option<ThreadId>,
    holds: usize,
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
    released: Condvar,
}

#[derive(Debug)]
struct SlotRef {
    slot: Arc<Slot>,
    refs: usize,
}

/// Registry of reentrant, reference-counted per-UID locks.
#[derive(Debug, Default)]
pub struct PathLockRegistry {
    slots: Mutex<HashMap<RepositoryItemUid, SlotRef>>,
}

impl PathLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `uid`, blocking while another thread holds it.
    ///
    /// The returned handle releases the lock when dropped.
    pub fn lock(&self, uid: &RepositoryItemUid) -> LockHandle<'_> {
        let slot = {
            let mut slots = self.slots.lock();
            let entry = slots.entry(uid.clone()).or_insert_with(|| SlotRef {
                slot: Arc::new(Slot::default()),
                refs: 0,
            });
            entry.refs += 1;
            Arc::clone(&entry.slot)
        };

        let me = thread::current().id();
        let mut state = slot.state.lock();
        while state.owner.is_some_and(|owner| owner != me) {
            trace!("waiting for lock on {}", uid);
            slot.released.wait(&mut state);
        }
        state.owner = Some(me);
        state.holds += 1;
        trace!("locked {} (depth {})", uid, state.holds);

        LockHandle {
            registry: self,
            uid: uid.clone(),
            released: false,
            _not_send: PhantomData,
        }
    }

    /// Release one hold on `uid` taken by the current thread.
    ///
    /// Unlocking a UID that has no outstanding lock held by the current
    /// thread is a no-op.
    pub fn unlock(&self, uid: &RepositoryItemUid) {
        let me = thread::current().id();
        let mut slots = self.slots.lock();

        let Some(entry) = slots.get_mut(uid) else {
            debug!("unlock of {} without outstanding lock ignored", uid);
            return;
        };

        {
            let mut state = entry.slot.state.lock();
            if state.owner != Some(me) || state.holds == 0 {
                debug!("unlock of {} by a non-owner ignored", uid);
                return;
            }
            state.holds -= 1;
            if state.holds == 0 {
                state.owner = None;
                entry.slot.released.notify_one();
            }
        }

        entry.refs -= 1;
        if entry.refs == 0 {
            slots.remove(uid);
        }
    }

    /// Number of UIDs with a live registry entry (held or waited for).
    ///
    /// Intended for tests and observability only.
    pub fn lock_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Number of holds the owning thread has on `uid`, zero if unlocked.
    pub fn hold_count(&self, uid: &RepositoryItemUid) -> usize {
        self.slots
            .lock()
            .get(uid)
            .map(|entry| entry.slot.state.lock().holds)
            .unwrap_or(0)
    }

    /// Returns true if some thread currently holds the lock for `uid`.
    pub fn is_locked(&self, uid: &RepositoryItemUid) -> bool {
        self.hold_count(uid) > 0
    }
}

/// Scoped hold on a UID lock; releases exactly once on drop.
///
/// The hold belongs to the thread that took it, so the handle cannot leave
/// that thread:
///
/// ```compile_fail
/// use artifact_repo::lock::PathLockRegistry;
/// use artifact_repo::uid::RepositoryItemUid;
///
/// let registry = PathLockRegistry::new();
/// let uid = RepositoryItemUid::new("central", "/x").unwrap();
/// let handle = registry.lock(&uid);
/// std::thread::scope(|s| {
///     s.spawn(move || drop(handle));
/// });
/// ```
#[derive(Debug)]
#[must_use = "the lock is released as soon as the handle is dropped"]
pub struct LockHandle<'a> {
    registry: &'a PathLockRegistry,
    uid: RepositoryItemUid,
    released: bool,
    _not_send: PhantomData<*const ()>,
}

impl LockHandle<'_> {
    pub fn uid(&self) -> &RepositoryItemUid {
        &self.uid
    }

    /// Release the lock before the end of scope.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.registry.unlock(&self.uid);
        }
    }
}

impl Drop for LockHandle<'_> {
    fn drop(&mut self) {
        self.release_once();
    }
}
