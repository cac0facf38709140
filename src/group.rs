//! # Group repositories
//!
//! A group owns no items. It answers requests by asking its members in
//! order; members may be proxies, hosted repositories or other groups.
//!
//! The resolution algorithms are free functions over [`MemberAccess`], the
//! capability a group needs from whoever owns the member repositories (the
//! [`crate::repository::RepositoryRegistry`] in practice, fakes in tests):
//!
//! - [`resolve`]: first member that yields the item wins. A collection found
//!   this way is replaced by a group-owned collection merging every member's
//!   children.
//! - [`retrieve_items`]: the item of every member that has it, in order.
//! - [`list_merged`]: union of the member listings.
//!
//! Every repository consulted for a request is recorded on the request, and
//! repositories already consulted are skipped, so nested groups sharing
//! members never ask the same member twice.

use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::events::{EventBus, RepositoryEvent};
use crate::item::{now_millis, Attributes, CollectionItem, StorageItem};
use crate::request::ResourceStoreRequest;
use crate::uid::RepositoryItemUid;

/// Access to the member repositories of groups.
pub trait MemberAccess {
    /// Retrieve `request.path()` from repository `member`, recording `member`
    /// as processed.
    fn retrieve_member(
        &self,
        member: &str,
        request: &mut ResourceStoreRequest,
    ) -> Result<StorageItem>;

    /// List the collection at `request.path()` in repository `member`.
    fn list_member(&self, member: &str, request: &mut ResourceStoreRequest) -> Result<Vec<String>>;

    /// Members of `id` if it is a group, `None` otherwise.
    fn group_members(&self, id: &str) -> Option<Vec<String>>;
}

/// An ordered list of member repositories plus an optional path cache
/// remembering which member last served a path.
pub struct GroupRepository {
    id: String,
    members: RwLock<Vec<String>>,
    path_cache: Option<Mutex<HashMap<String, String>>>,
    events: EventBus,
}

impl GroupRepository {
    pub fn new(id: &str, members: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            members: RwLock::new(members),
            path_cache: None,
            events: EventBus::new(),
        }
    }

    pub fn with_path_cache(mut self, enabled: bool) -> Self {
        self.path_cache = enabled.then(|| Mutex::new(HashMap::new()));
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Members in resolution order.
    pub fn members(&self) -> Vec<String> {
        self.members.read().clone()
    }

    pub fn has_member(&self, member: &str) -> bool {
        self.members.read().iter().any(|m| m == member)
    }

    pub fn has_path_cache(&self) -> bool {
        self.path_cache.is_some()
    }

    /// Member recorded for `path` in the path cache.
    pub fn cached_member(&self, path: &str) -> Option<String> {
        self.path_cache
            .as_ref()
            .and_then(|cache| cache.lock().get(path).cloned())
    }

    fn remember(&self, path: &str, member: &str) {
        if let Some(cache) = &self.path_cache {
            cache.lock().insert(path.to_string(), member.to_string());
        }
    }

    /// Clear the path cache, returning the paths that were served by `member`
    /// (or every cached path if `member` is `None`).
    fn invalidate_path_cache(&self, member: Option<&str>) -> Vec<String> {
        let Some(cache) = &self.path_cache else {
            return Vec::new();
        };
        let mut cache = cache.lock();
        let mut paths: Vec<String> = cache
            .iter()
            .filter(|(_, m)| member.is_none_or(|member| m.as_str() == member))
            .map(|(p, _)| p.clone())
            .collect();
        paths.sort();
        cache.clear();
        paths
    }

    /// Members to ask for `path`: the cached member first, then the rest in
    /// configured order.
    fn request_members(&self, path: &str) -> Vec<String> {
        let mut members = self.members();
        if let Some(cached) = self.cached_member(path) {
            if let Some(pos) = members.iter().position(|m| *m == cached) {
                let first = members.remove(pos);
                members.insert(0, first);
            }
        }
        members
    }

    /// Append `member`; returns false if it was already a member.
    ///
    /// Callers validate the membership first (see [`check_member`]).
    pub fn add_member(&self, member: &str) -> bool {
        {
            let mut members = self.members.write();
            if members.iter().any(|m| m == member) {
                return false;
            }
            members.push(member.to_string());
        }
        self.invalidate_path_cache(None);
        self.events.publish(RepositoryEvent::MembersChanged {
            group: self.id.clone(),
            added: vec![member.to_string()],
            removed: Vec::new(),
        });
        true
    }

    /// Remove `member`; returns false if it was not a member.
    ///
    /// Publishes `MemberRemoved` with the paths the group had served from it.
    pub fn remove_member(&self, member: &str) -> bool {
        {
            let mut members = self.members.write();
            let before = members.len();
            members.retain(|m| m != member);
            if members.len() == before {
                return false;
            }
        }
        let paths = self.invalidate_path_cache(Some(member));
        debug!("removed {} from group {}", member, self.id);
        self.events.publish(RepositoryEvent::MemberRemoved {
            group: self.id.clone(),
            member: member.to_string(),
            paths,
        });
        true
    }

    /// Replace the member list.
    pub fn set_members(&self, members: Vec<String>) {
        let (added, removed) = {
            let mut current = self.members.write();
            let added = members
                .iter()
                .filter(|m| !current.contains(m))
                .cloned()
                .collect::<Vec<_>>();
            let removed = current
                .iter()
                .filter(|m| !members.contains(m))
                .cloned()
                .collect::<Vec<_>>();
            *current = members;
            (added, removed)
        };
        self.invalidate_path_cache(None);
        self.events.publish(RepositoryEvent::MembersChanged {
            group: self.id.clone(),
            added,
            removed,
        });
    }

    fn uid(&self, path: &str) -> Result<RepositoryItemUid> {
        RepositoryItemUid::new(&self.id, path)
    }
}

/// Validate that `member` may be added to `group`: it must not be the group
/// itself, nor a group that (transitively) contains `group`.
pub fn check_member(group: &str, member: &str, access: &dyn MemberAccess) -> Result<()> {
    if group == member {
        return Err(Error::InvalidGrouping {
            group: group.to_string(),
            message: "a group cannot be a member of itself".to_string(),
        });
    }
    if reaches(member, group, access, &mut BTreeSet::new()) {
        return Err(Error::InvalidGrouping {
            group: group.to_string(),
            message: format!("adding {} would create a cycle", member),
        });
    }
    Ok(())
}

fn reaches(
    from: &str,
    target: &str,
    access: &dyn MemberAccess,
    seen: &mut BTreeSet<String>,
) -> bool {
    if !seen.insert(from.to_string()) {
        return false;
    }
    access.group_members(from).is_some_and(|members| {
        members
            .iter()
            .any(|m| m == target || reaches(m, target, access, seen))
    })
}

/// Non-group repositories reachable from `group`, depth first, without
/// duplicates.
pub fn transitive_members(group: &str, access: &dyn MemberAccess) -> Vec<String> {
    fn collect(
        id: &str,
        access: &dyn MemberAccess,
        seen: &mut BTreeSet<String>,
        out: &mut Vec<String>,
    ) {
        for member in access.group_members(id).unwrap_or_default() {
            if !seen.insert(member.clone()) {
                continue;
            }
            if access.group_members(&member).is_some() {
                collect(&member, access, seen, out);
            } else {
                out.push(member);
            }
        }
    }

    let mut seen = BTreeSet::from([group.to_string()]);
    let mut out = Vec::new();
    collect(group, access, &mut seen, &mut out);
    out
}

/// Record a member failure as a cause, or propagate it if it must not be
/// recovered from.
fn member_failure(
    group: &GroupRepository,
    member: &str,
    e: Error,
    causes: &mut Vec<String>,
) -> Result<()> {
    match e {
        e @ Error::Authorization { .. } => Err(e),
        e if e.is_interrupted() => Err(e),
        e @ Error::NoSuchRepository { .. } => {
            warn!("group {} references missing member {}", group.id(), member);
            causes.push(format!("{}: {}", member, e));
            Ok(())
        }
        e => {
            debug!("member {} of {} failed: {}", member, group.id(), e);
            causes.push(format!("{}: {}", member, e));
            Ok(())
        }
    }
}

/// Resolve `request` through `group`: first member with the item wins.
pub fn resolve(
    group: &GroupRepository,
    access: &dyn MemberAccess,
    request: &mut ResourceStoreRequest,
) -> Result<StorageItem> {
    request.cancellation.check("group resolution")?;
    let listing_request = request.clone();
    request.mark_processed(group.id());
    if request.group_local_only {
        request.local_only = true;
    }

    let mut causes = Vec::new();
    for member in group.request_members(request.path()) {
        if request.is_processed(&member) {
            debug!("{} already processed for {}, skipping", member, request.path());
            continue;
        }
        match access.retrieve_member(&member, request) {
            Ok(StorageItem::Collection(_)) => {
                let children = list_merged(group, access, &listing_request)?;
                return virtual_collection(group, request.path(), children);
            }
            Ok(item) => {
                group.remember(request.path(), &member);
                return Ok(item);
            }
            Err(e) => member_failure(group, &member, e, &mut causes)?,
        }
    }

    Err(Error::ItemNotFound {
        repository: group.id().to_string(),
        path: request.path().to_string(),
        causes,
    })
}

/// The item of every member that has `request.path()`, in member order.
pub fn retrieve_items(
    group: &GroupRepository,
    access: &dyn MemberAccess,
    request: &ResourceStoreRequest,
) -> Result<Vec<StorageItem>> {
    request.cancellation.check("group retrieval")?;
    let mut request = request.clone();
    request.mark_processed(group.id());
    if request.group_local_only {
        request.local_only = true;
    }

    let mut items = Vec::new();
    let mut causes = Vec::new();
    for member in group.members() {
        if request.is_processed(&member) {
            continue;
        }
        match access.retrieve_member(&member, &mut request) {
            Ok(item) => items.push(item),
            Err(e) => member_failure(group, &member, e, &mut causes)?,
        }
    }
    Ok(items)
}

/// Sorted union of the member listings of `request.path()`.
///
/// Fails with `ItemNotFound` only if no member has the collection.
pub fn list_merged(
    group: &GroupRepository,
    access: &dyn MemberAccess,
    request: &ResourceStoreRequest,
) -> Result<Vec<String>> {
    request.cancellation.check("group listing")?;
    let mut request = request.clone();
    request.mark_processed(group.id());
    if request.group_local_only {
        request.local_only = true;
    }

    let mut names = BTreeSet::new();
    let mut found = false;
    let mut causes = Vec::new();
    for member in group.members() {
        if request.is_processed(&member) {
            continue;
        }
        match access.list_member(&member, &mut request) {
            Ok(children) => {
                found = true;
                names.extend(children);
            }
            Err(e) => member_failure(group, &member, e, &mut causes)?,
        }
    }

    if found {
        Ok(names.into_iter().collect())
    } else {
        Err(Error::ItemNotFound {
            repository: group.id().to_string(),
            path: request.path().to_string(),
            causes,
        })
    }
}

/// A group-owned collection for `path` with no content of its own.
pub fn virtual_collection(
    group: &GroupRepository,
    path: &str,
    children: Vec<String>,
) -> Result<StorageItem> {
    Ok(StorageItem::Collection(CollectionItem {
        uid: group.uid(path)?,
        attributes: Attributes::new_at(now_millis()),
        children,
    }))
}
