//! # Repository tree walker
//!
//! [`Walker::walk`] visits the items of an [`ItemStore`] depth first,
//! children in name order, starting at the path of the walk's request, and
//! hands every item to the registered [`WalkerProcessor`]s:
//!
//! ```text
//! before_walk
//!   on_collection_enter(/)
//!     process_item(/a.jar)
//!     on_collection_enter(/org)
//!       process_item(/org/b.pom)
//!     on_collection_exit(/org)
//!   on_collection_exit(/)
//! after_walk
//! ```
//!
//! Walking a path that names a file processes just that file.
//!
//! A walk stops when any processor returns an error (which becomes the stop
//! cause), when someone calls [`StopSignal::stop`], or when the request's
//! cancellation flag is raised. The stop flag is checked between siblings,
//! so a stop takes effect at the next visit. Items are read with
//! [`ItemStore::peek`], so walking never counts as a request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use glob::Pattern;
use log::{debug, trace};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::item::{CollectionItem, FileItem, StorageItem};
use crate::request::ResourceStoreRequest;
use crate::storage::ItemStore;
use crate::uid::RepositoryItemUid;

/// Longest single sleep of a throttle before the stop flag is re-checked.
const PACING_SLICE: Duration = Duration::from_millis(50);

/// Shared stop flag with an optional cause. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
    cause: Arc<Mutex<Option<Arc<Error>>>>,
}

impl StopSignal {
    /// Stop the walk. The first cause given is kept.
    pub fn stop(&self, cause: Option<Error>) {
        if let Some(cause) = cause {
            let mut slot = self.cause.lock();
            if slot.is_none() {
                *slot = Some(Arc::new(cause));
            }
        }
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn cause(&self) -> Option<Arc<Error>> {
        self.cause.lock().clone()
    }
}

/// What processors see of the walk in progress.
#[derive(Debug)]
pub struct WalkScope {
    repository_id: String,
    request: ResourceStoreRequest,
    stop: StopSignal,
}

impl WalkScope {
    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    pub fn request(&self) -> &ResourceStoreRequest {
        &self.request
    }

    pub fn stop(&self, cause: Option<Error>) {
        self.stop.stop(cause);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }
}

/// Callbacks invoked during a walk. Every callback defaults to doing nothing.
pub trait WalkerProcessor {
    fn before_walk(&mut self, _scope: &WalkScope) -> Result<()> {
        Ok(())
    }

    fn on_collection_enter(&mut self, _scope: &WalkScope, _collection: &CollectionItem) -> Result<()> {
        Ok(())
    }

    /// Called for every file item the filter accepts.
    fn process_item(&mut self, _scope: &WalkScope, _item: &FileItem) -> Result<()> {
        Ok(())
    }

    fn on_collection_exit(&mut self, _scope: &WalkScope, _collection: &CollectionItem) -> Result<()> {
        Ok(())
    }

    /// Called once the walk finished without being stopped.
    fn after_walk(&mut self, _scope: &WalkScope) -> Result<()> {
        Ok(())
    }
}

/// Decides which items a walk visits.
pub trait WalkerFilter: Send + Sync {
    /// Whether a file item is handed to the processors.
    fn should_process(&self, _item: &FileItem) -> bool {
        true
    }

    /// Whether the walk descends into a collection.
    fn should_process_recursively(&self, _collection: &CollectionItem) -> bool {
        true
    }
}

/// Visits everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl WalkerFilter for AcceptAll {}

/// Skips hidden files and does not descend into hidden collections.
#[derive(Debug, Default, Clone, Copy)]
pub struct DotFileFilter;

impl WalkerFilter for DotFileFilter {
    fn should_process(&self, item: &FileItem) -> bool {
        !item.uid.name().starts_with('.')
    }

    fn should_process_recursively(&self, collection: &CollectionItem) -> bool {
        !collection.uid.name().starts_with('.')
    }
}

/// Processes only files whose path matches a glob pattern.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    pattern: Pattern,
}

impl GlobFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Pattern::new(pattern)?,
        })
    }
}

impl WalkerFilter for GlobFilter {
    fn should_process(&self, item: &FileItem) -> bool {
        self.pattern.matches(item.uid.path())
    }
}

/// Accepts what every filter in the list accepts.
impl WalkerFilter for Vec<Box<dyn WalkerFilter>> {
    fn should_process(&self, item: &FileItem) -> bool {
        self.iter().all(|f| f.should_process(item))
    }

    fn should_process_recursively(&self, collection: &CollectionItem) -> bool {
        self.iter().all(|f| f.should_process_recursively(collection))
    }
}

/// Inserts pauses between visits.
pub trait ThrottleController: Send {
    /// Called before each visit; may sleep, but must return promptly once
    /// `stop` is raised.
    fn pace(&mut self, stop: &StopSignal);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoThrottle;

impl ThrottleController for NoThrottle {
    fn pace(&mut self, _stop: &StopSignal) {}
}

/// Limits a walk to a number of visits per second.
#[derive(Debug)]
pub struct PacingThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl PacingThrottle {
    pub fn new(items_per_second: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / items_per_second.max(1),
            last: None,
        }
    }
}

impl ThrottleController for PacingThrottle {
    fn pace(&mut self, stop: &StopSignal) {
        if let Some(last) = self.last {
            let due = last + self.interval;
            loop {
                let now = Instant::now();
                if now >= due || stop.is_stopped() {
                    break;
                }
                thread::sleep((due - now).min(PACING_SLICE));
            }
        }
        self.last = Some(Instant::now());
    }
}

/// Per-walk state: the request, the stop flag, the filter, the throttle and
/// the processors.
pub struct WalkerContext<'a> {
    scope: WalkScope,
    filter: Box<dyn WalkerFilter + 'a>,
    throttle: Box<dyn ThrottleController + 'a>,
    processors: Vec<&'a mut dyn WalkerProcessor>,
}

impl<'a> WalkerContext<'a> {
    pub fn new(repository_id: &str, request: ResourceStoreRequest) -> Self {
        Self {
            scope: WalkScope {
                repository_id: repository_id.to_string(),
                request,
                stop: StopSignal::default(),
            },
            filter: Box::new(AcceptAll),
            throttle: Box::new(NoThrottle),
            processors: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: impl WalkerFilter + 'a) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn with_throttle(mut self, throttle: impl ThrottleController + 'a) -> Self {
        self.throttle = Box::new(throttle);
        self
    }

    pub fn add_processor(&mut self, processor: &'a mut dyn WalkerProcessor) {
        self.processors.push(processor);
    }

    pub fn with_processor(mut self, processor: &'a mut dyn WalkerProcessor) -> Self {
        self.add_processor(processor);
        self
    }

    pub fn scope(&self) -> &WalkScope {
        &self.scope
    }

    /// A handle that stops this walk from elsewhere.
    pub fn stop_signal(&self) -> StopSignal {
        self.scope.stop.clone()
    }

    pub fn stop(&self, cause: Option<Error>) {
        self.scope.stop(cause);
    }

    pub fn is_stopped(&self) -> bool {
        self.scope.is_stopped()
    }

    pub fn stop_cause(&self) -> Option<Arc<Error>> {
        self.scope.stop.cause()
    }

    /// Check the stop flag and the request's cancellation.
    fn should_stop(&self) -> bool {
        if self.is_stopped() {
            return true;
        }
        if let Err(e) = self.scope.request.cancellation.check("walk") {
            self.stop(Some(e));
            return true;
        }
        false
    }

    fn each_processor(&mut self, mut call: impl FnMut(&mut dyn WalkerProcessor, &WalkScope) -> Result<()>) {
        for processor in self.processors.iter_mut() {
            if self.scope.is_stopped() {
                return;
            }
            if let Err(e) = call(&mut **processor, &self.scope) {
                debug!("walker processor failed on {}: {}", self.scope.repository_id, e);
                self.scope.stop(Some(e));
            }
        }
    }
}

/// Counts of what a walk visited.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkSummary {
    pub collections: usize,
    pub files: usize,
    pub stopped: bool,
}

/// Depth-first traversal engine over an [`ItemStore`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Walker;

impl Walker {
    pub fn new() -> Self {
        Self
    }

    /// Walk `store` from the context's request path.
    ///
    /// Returns `Error::WalkerStopped` if the walk was stopped with a cause;
    /// a stop without a cause yields a summary with `stopped` set.
    pub fn walk(&self, store: &dyn ItemStore, context: &mut WalkerContext<'_>) -> Result<WalkSummary> {
        let mut summary = WalkSummary::default();
        let start = RepositoryItemUid::new(store.repository_id(), context.scope.request.path())?;
        debug!("walking {}", start);

        context.each_processor(|p, scope| p.before_walk(scope));

        if !context.should_stop() {
            match store.peek(&start) {
                Ok(StorageItem::Collection(collection)) => {
                    self.walk_collection(store, context, collection, &mut summary)
                }
                Ok(StorageItem::File(file)) => self.visit_file(context, &file, &mut summary),
                Err(e) => context.stop(Some(e)),
            }
        }

        if !context.should_stop() {
            context.each_processor(|p, scope| p.after_walk(scope));
        }

        summary.stopped = context.is_stopped();
        match context.stop_cause() {
            Some(cause) => Err(Error::WalkerStopped { cause }),
            None => Ok(summary),
        }
    }

    fn visit_file(&self, context: &mut WalkerContext<'_>, file: &FileItem, summary: &mut WalkSummary) {
        if !context.filter.should_process(file) {
            return;
        }
        context.throttle.pace(&context.scope.stop);
        trace!("processing {}", file.uid);
        summary.files += 1;
        context.each_processor(|p, scope| p.process_item(scope, file));
    }

    fn walk_collection(
        &self,
        store: &dyn ItemStore,
        context: &mut WalkerContext<'_>,
        collection: CollectionItem,
        summary: &mut WalkSummary,
    ) {
        if context.should_stop() {
            return;
        }
        context.throttle.pace(&context.scope.stop);
        summary.collections += 1;
        context.each_processor(|p, scope| p.on_collection_enter(scope, &collection));

        for name in &collection.children {
            if context.should_stop() {
                return;
            }
            let uid = match collection.uid.child(name) {
                Ok(uid) => uid,
                Err(e) => {
                    context.stop(Some(e));
                    return;
                }
            };
            match store.peek(&uid) {
                Ok(StorageItem::Collection(child)) => {
                    if context.filter.should_process_recursively(&child) {
                        self.walk_collection(store, context, child, summary);
                    }
                }
                Ok(StorageItem::File(file)) => self.visit_file(context, &file, summary),
                // removed while walking
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    context.stop(Some(e));
                    return;
                }
            }
        }

        if !context.should_stop() {
            context.each_processor(|p, scope| p.on_collection_exit(scope, &collection));
        }
    }
}
