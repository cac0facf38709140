//! # Repository events
//!
//! Side effects that other components react to (path-cache invalidation,
//! reporting) are delivered as typed messages over `std::sync::mpsc`
//! channels. Each subscriber gets its own receiver; a subscriber that dropped
//! its receiver is forgotten on the next publish.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::proxy::ProxyMode;

/// Something that happened to a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryEvent {
    /// A group's member list was replaced.
    MembersChanged {
        group: String,
        added: Vec<String>,
        removed: Vec<String>,
    },
    /// A member left a group. `paths` are the paths the group had last
    /// served from that member, which are no longer reachable through it.
    MemberRemoved {
        group: String,
        member: String,
        paths: Vec<String>,
    },
    /// A proxy stored content fetched from an origin.
    ItemCached { repository: String, path: String },
    ProxyModeChanged {
        repository: String,
        previous: ProxyMode,
        current: ProxyMode,
    },
    NotFoundCachePurged { repository: String, entries: usize },
    UnusedItemsEvicted {
        repository: String,
        paths: Vec<String>,
    },
    CachesExpired {
        repository: String,
        path: String,
        items: usize,
    },
    RepositoryRemoved { repository: String },
}

/// Fan-out of events to any number of subscribers. Cloning shares subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<RepositoryEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new receiver seeing every event published from now on.
    pub fn subscribe(&self) -> Receiver<RepositoryEvent> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: RepositoryEvent) {
        trace!("event: {:?}", event);
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
