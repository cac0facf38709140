//! # Proxy repositories
//!
//! A [`ProxyRepository`] serves items from local storage and fills that
//! storage from remote origins on demand. A request goes through these steps:
//!
//! 1. **Check local.** A fresh local item is served directly.
//! 2. **Gate.** With `local_only`, or while the proxy is blocked, the local
//!    item (stale or not) is served or the request fails with `ItemNotFound`.
//!    A negative-cache hit fails fast the same way unless `as_expired` is set.
//! 3. **Lock and re-check.** The UID lock is taken for the whole
//!    check-fetch-store sequence; a request that waited for another thread's
//!    fetch finds the item fresh and returns without a second fetch.
//! 4. **Fetch.** Origins are tried in order (mirrors, then the canonical URL).
//!    Transient failures are retried on the same origin up to `retry_count`
//!    attempts; absence and refused access move on to the next origin.
//! 5. **Store or fall back.** Fetched content is stored and served. A
//!    definitive absence is recorded in the negative cache. When every origin
//!    failed transiently a stale local copy is served if one exists,
//!    otherwise `RemoteAccess` is returned and the proxy may auto-block.

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::events::{EventBus, RepositoryEvent};
use crate::item::{now_millis, Attributes, FileItem, StorageItem};
use crate::lock::PathLockRegistry;
use crate::nfc::NotFoundCache;
use crate::path::PathClassifier;
use crate::remote::{
    item_url, DownloadMirrors, FetchContext, FetchOutcome, Mirror, RemoteContent, RemoteStorage,
};
use crate::request::ResourceStoreRequest;
use crate::storage::ItemStore;
use crate::uid::RepositoryItemUid;

/// Whether a proxy may contact its origins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    Allow,
    /// Blocked after repeated origin failures; lifted automatically.
    BlockedAuto,
    /// Blocked by an operator; only an operator lifts it.
    BlockedManual,
}

impl ProxyMode {
    pub fn should_proxy(self) -> bool {
        self == ProxyMode::Allow
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProxyMode::Allow => "allow",
            ProxyMode::BlockedAuto => "blocked-auto",
            ProxyMode::BlockedManual => "blocked-manual",
        };
        f.write_str(name)
    }
}

/// Freshness, negative caching and retry settings of a proxy.
///
/// Ages and TTLs are in minutes.
#[derive(Debug, Clone)]
pub struct ProxyPolicy {
    /// Max age of ordinary items; `-1` never expires, `0` always revalidates.
    pub artifact_max_age: i64,
    /// Max age of items matched by `metadata`.
    pub metadata_max_age: i64,
    pub metadata: PathClassifier,
    pub not_found_cache_ttl: i64,
    /// Attempts per origin for transient failures.
    pub retry_count: u32,
    /// A not-found answer from one origin ends the search.
    pub authoritative_not_found: bool,
    pub auto_block: bool,
    pub auto_block_retain: i64,
    pub mirror_blacklist: i64,
}

impl Default for ProxyPolicy {
    fn default() -> Self {
        Self {
            artifact_max_age: defaults::ARTIFACT_MAX_AGE,
            metadata_max_age: defaults::METADATA_MAX_AGE,
            metadata: PathClassifier::new(defaults::METADATA_PATTERNS).unwrap_or_default(),
            not_found_cache_ttl: defaults::NOT_FOUND_CACHE_TTL,
            retry_count: defaults::RETRY_COUNT,
            authoritative_not_found: false,
            auto_block: true,
            auto_block_retain: defaults::AUTO_BLOCK_RETAIN,
            mirror_blacklist: defaults::MIRROR_BLACKLIST,
        }
    }
}

impl ProxyPolicy {
    /// Max age in minutes applying to `path`.
    pub fn max_age_for(&self, path: &str) -> i64 {
        if self.metadata.matches(path) {
            self.metadata_max_age
        } else {
            self.artifact_max_age
        }
    }

    /// Returns true if an item must be revalidated before it is served.
    ///
    /// Age is measured from `remote_checked`, the last time an origin
    /// confirmed the content. Collections are never old.
    pub fn is_old(&self, item: &StorageItem, now: i64) -> bool {
        if item.is_collection() {
            return false;
        }
        let attributes = item.attributes();
        if attributes.expired {
            return true;
        }
        let max_age = self.max_age_for(item.path());
        if max_age < 0 {
            return false;
        }
        now - attributes.remote_checked >= max_age.saturating_mul(60_000)
    }
}

#[derive(Debug, Clone, Copy)]
struct ModeState {
    mode: ProxyMode,
    since: i64,
}

/// What the origins said about one item.
enum RemoteAnswer {
    Fetched { content: RemoteContent, url: String },
    NotModified { url: String },
    NotFound,
    Failed { errors: Vec<String> },
}

/// A repository caching the content of remote origins.
pub struct ProxyRepository {
    id: String,
    remote_url: String,
    store: Arc<dyn ItemStore>,
    remote: Arc<dyn RemoteStorage>,
    locks: Arc<PathLockRegistry>,
    mirrors: DownloadMirrors,
    policy: ProxyPolicy,
    nfc: NotFoundCache,
    mode: RwLock<ModeState>,
    events: EventBus,
}

impl ProxyRepository {
    pub fn new(
        id: &str,
        remote_url: &str,
        store: Arc<dyn ItemStore>,
        remote: Arc<dyn RemoteStorage>,
        locks: Arc<PathLockRegistry>,
    ) -> Self {
        let policy = ProxyPolicy::default();
        Self {
            id: id.to_string(),
            remote_url: remote_url.to_string(),
            store,
            remote,
            locks,
            mirrors: DownloadMirrors::new(Vec::new(), policy.mirror_blacklist),
            policy,
            nfc: NotFoundCache::new(),
            mode: RwLock::new(ModeState {
                mode: ProxyMode::Allow,
                since: now_millis(),
            }),
            events: EventBus::new(),
        }
    }

    pub fn with_policy(mut self, policy: ProxyPolicy) -> Self {
        self.mirrors = DownloadMirrors::new(self.mirrors.mirrors().to_vec(), policy.mirror_blacklist);
        self.policy = policy;
        self
    }

    pub fn with_mirrors(mut self, mirrors: Vec<Mirror>) -> Self {
        self.mirrors = DownloadMirrors::new(mirrors, self.policy.mirror_blacklist);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    pub fn policy(&self) -> &ProxyPolicy {
        &self.policy
    }

    pub fn mirrors(&self) -> &DownloadMirrors {
        &self.mirrors
    }

    pub fn store(&self) -> &Arc<dyn ItemStore> {
        &self.store
    }

    pub fn not_found_cache(&self) -> &NotFoundCache {
        &self.nfc
    }

    pub fn locks(&self) -> &Arc<PathLockRegistry> {
        &self.locks
    }

    pub fn proxy_mode(&self) -> ProxyMode {
        self.mode.read().mode
    }

    /// Operator change of the proxy mode.
    pub fn set_proxy_mode(&self, mode: ProxyMode) {
        self.change_mode(mode, true);
    }

    fn change_mode(&self, mode: ProxyMode, manual: bool) {
        let previous = {
            let mut state = self.mode.write();
            let previous = state.mode;
            // automatic transitions never override an operator block
            if !manual && previous == ProxyMode::BlockedManual {
                return;
            }
            state.since = now_millis();
            if previous == mode {
                return;
            }
            state.mode = mode;
            previous
        };

        info!("proxy {} mode {} -> {}", self.id, previous, mode);
        if previous == ProxyMode::BlockedManual && mode == ProxyMode::Allow {
            let entries = self.nfc.purge();
            self.events.publish(RepositoryEvent::NotFoundCachePurged {
                repository: self.id.clone(),
                entries,
            });
        }
        self.events.publish(RepositoryEvent::ProxyModeChanged {
            repository: self.id.clone(),
            previous,
            current: mode,
        });
    }

    /// Whether a request may contact the origins now. An auto-block whose
    /// retain period has elapsed lets the next request probe.
    fn may_proxy(&self) -> bool {
        let state = *self.mode.read();
        match state.mode {
            ProxyMode::Allow => true,
            ProxyMode::BlockedManual => false,
            ProxyMode::BlockedAuto => {
                now_millis() - state.since >= self.policy.auto_block_retain.saturating_mul(60_000)
            }
        }
    }

    fn uid(&self, path: &str) -> Result<RepositoryItemUid> {
        RepositoryItemUid::new(&self.id, path)
    }

    fn local_item(&self, uid: &RepositoryItemUid) -> Result<Option<StorageItem>> {
        match self.store.peek(uid) {
            Ok(item) => Ok(Some(item)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn serve_local(&self, uid: &RepositoryItemUid) -> Result<StorageItem> {
        self.store.retrieve(uid)
    }

    fn local_or_not_found(
        &self,
        uid: &RepositoryItemUid,
        local: Option<StorageItem>,
    ) -> Result<StorageItem> {
        match local {
            Some(_) => self.serve_local(uid),
            None => Err(Error::not_found(&self.id, uid.path())),
        }
    }

    /// Resolve an item, consulting the origins when the local copy is
    /// missing or stale.
    pub fn retrieve_item(&self, request: &ResourceStoreRequest) -> Result<StorageItem> {
        request.cancellation.check("retrieve")?;
        let uid = self.uid(request.path())?;
        let revalidate = request.remote_only || request.as_expired;

        let local = self.local_item(&uid)?;
        if let Some(item) = &local {
            if item.is_collection() || (!revalidate && !self.policy.is_old(item, now_millis())) {
                return self.serve_local(&uid);
            }
        }

        if request.local_only {
            return self.local_or_not_found(&uid, local);
        }
        if !self.may_proxy() {
            debug!("{} is blocked ({}), serving local only", self.id, self.proxy_mode());
            return self.local_or_not_found(&uid, local);
        }
        if !request.as_expired && self.nfc.contains(uid.path()) {
            debug!("negative cache hit for {}", uid);
            return self.local_or_not_found(&uid, local);
        }

        let _lock = self.locks.lock(&uid);

        let local = self.local_item(&uid)?;
        if let Some(item) = &local {
            if item.is_collection() || (!revalidate && !self.policy.is_old(item, now_millis())) {
                debug!("{} became fresh while waiting for the lock", uid);
                return self.serve_local(&uid);
            }
        }
        if !self.may_proxy() {
            debug!("{} was blocked while waiting for the lock", self.id);
            return self.local_or_not_found(&uid, local);
        }
        if !request.as_expired && self.nfc.contains(uid.path()) {
            debug!("{} was found missing while waiting for the lock", uid);
            return self.local_or_not_found(&uid, local);
        }

        let if_modified_since = local
            .as_ref()
            .filter(|item| !item.is_collection())
            .map(|item| item.attributes().remote_checked);

        match self.fetch_remote(&uid, request, if_modified_since)? {
            RemoteAnswer::Fetched { content, url } => {
                self.cache_item(&uid, content, &url)?;
                self.change_mode(ProxyMode::Allow, false);
                self.serve_local(&uid)
            }
            RemoteAnswer::NotModified { url } => {
                let Some(StorageItem::File(file)) = local else {
                    return Err(Error::RemoteTransient {
                        url,
                        message: "not-modified answer without local content".to_string(),
                    });
                };
                debug!("{} confirmed unchanged by {}", uid, url);
                let mut attributes = file.attributes;
                attributes.remote_checked = now_millis();
                attributes.expired = false;
                self.store.update_attributes(&uid, &attributes)?;
                self.change_mode(ProxyMode::Allow, false);
                self.serve_local(&uid)
            }
            RemoteAnswer::NotFound => {
                self.change_mode(ProxyMode::Allow, false);
                if local.is_some() {
                    warn!("{} is gone from the origins, serving the stale local copy", uid);
                    return self.serve_local(&uid);
                }
                self.nfc.insert(uid.path(), self.policy.not_found_cache_ttl);
                Err(Error::not_found(&self.id, uid.path()))
            }
            RemoteAnswer::Failed { errors } => {
                if self.policy.auto_block {
                    self.change_mode(ProxyMode::BlockedAuto, false);
                }
                if local.is_some() {
                    warn!("all origins failed for {}, serving the stale local copy", uid);
                    return self.serve_local(&uid);
                }
                Err(Error::RemoteAccess {
                    repository: self.id.clone(),
                    path: uid.path().to_string(),
                    message: errors.join("; "),
                })
            }
        }
    }

    fn fetch_remote(
        &self,
        uid: &RepositoryItemUid,
        request: &ResourceStoreRequest,
        if_modified_since: Option<i64>,
    ) -> Result<RemoteAnswer> {
        let context = FetchContext {
            if_modified_since,
            cancellation: &request.cancellation,
        };
        let attempts = self.policy.retry_count.max(1);
        let mut saw_not_found = false;
        let mut errors = Vec::new();

        for base in self.mirrors.urls(&self.remote_url) {
            let url = item_url(&base, uid.path());
            let mut attempt = 0;
            loop {
                request.cancellation.check("remote fetch")?;
                attempt += 1;
                let outcome = self.remote.fetch(&url, &context).and_then(|outcome| {
                    if let FetchOutcome::Found(content) = &outcome {
                        content.verify_length(&url)?;
                    }
                    Ok(outcome)
                });

                match outcome {
                    Ok(FetchOutcome::Found(content)) => {
                        self.mirrors.feedback_success(&base);
                        return Ok(RemoteAnswer::Fetched { content, url });
                    }
                    Ok(FetchOutcome::NotModified) => {
                        self.mirrors.feedback_success(&base);
                        return Ok(RemoteAnswer::NotModified { url });
                    }
                    Ok(FetchOutcome::NotFound) => {
                        debug!("{} not found at {}", uid, url);
                        if self.policy.authoritative_not_found {
                            return Ok(RemoteAnswer::NotFound);
                        }
                        saw_not_found = true;
                        break;
                    }
                    Err(e) if e.is_interrupted() => return Err(e),
                    Err(e @ Error::RemoteAccessDenied { .. }) => {
                        debug!("{}", e);
                        self.mirrors.feedback_failure(&base);
                        errors.push(e.to_string());
                        break;
                    }
                    Err(e) if e.is_transient() && attempt < attempts => {
                        debug!("attempt {} of {} failed: {}", attempt, attempts, e);
                    }
                    Err(e) if e.is_transient() => {
                        debug!("giving up on {} after {} attempts: {}", url, attempt, e);
                        self.mirrors.feedback_failure(&base);
                        errors.push(e.to_string());
                        break;
                    }
                    Err(e) => {
                        debug!("fetch of {} failed: {}", url, e);
                        self.mirrors.feedback_failure(&base);
                        errors.push(e.to_string());
                        break;
                    }
                }
            }
        }

        if errors.is_empty() {
            debug_assert!(saw_not_found);
            Ok(RemoteAnswer::NotFound)
        } else {
            Ok(RemoteAnswer::Failed { errors })
        }
    }

    fn cache_item(&self, uid: &RepositoryItemUid, content: RemoteContent, url: &str) -> Result<()> {
        let now = now_millis();
        let mut attributes = Attributes::new_at(now);
        attributes.remote_url = Some(url.to_string());
        if let Some(modified) = content.last_modified {
            attributes
                .extra
                .insert("remote.last_modified".to_string(), modified.to_string());
        }
        let item = FileItem::new(uid.clone(), content.bytes).with_attributes(attributes);

        if let Err(e) = self.store.store(&item) {
            error!("could not cache {} fetched from {}: {}", uid, url, e);
            return Err(e);
        }
        self.nfc.remove(uid.path());
        debug!("cached {} from {}", uid, url);
        self.events.publish(RepositoryEvent::ItemCached {
            repository: self.id.clone(),
            path: uid.path().to_string(),
        });
        Ok(())
    }

    /// Children of a locally stored collection.
    pub fn list(&self, request: &ResourceStoreRequest) -> Result<Vec<String>> {
        self.store.list(&self.uid(request.path())?)
    }

    /// Remove an item (or collection) from the local cache.
    pub fn delete_item(&self, request: &ResourceStoreRequest) -> Result<bool> {
        let uid = self.uid(request.path())?;
        let _lock = self.locks.lock(&uid);
        self.nfc.purge_under(uid.path());
        self.store.delete(&uid)
    }
}
