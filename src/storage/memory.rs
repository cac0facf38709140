//! In-memory item store

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::attributes::{AttributeManager, MemoryAttributeManager};
use crate::error::{Error, Result};
use crate::item::{
    now_millis, Attributes, CollectionItem, ContentLocator, FileItem, StorageItem,
};
use crate::path::{self, PATH_ROOT};
use crate::storage::{recovered_attributes, stored_attributes, ItemStore};
use crate::uid::RepositoryItemUid;

/// Item store holding file content in memory, keyed by normalized path.
pub struct MemoryItemStore {
    repository_id: String,
    files: RwLock<BTreeMap<String, Arc<Vec<u8>>>>,
    attributes: Arc<dyn AttributeManager>,
}

impl MemoryItemStore {
    /// A store with its own in-memory attribute storage.
    pub fn new(repository_id: &str) -> Self {
        Self::with_attributes(repository_id, Arc::new(MemoryAttributeManager::new()))
    }

    pub fn with_attributes(repository_id: &str, attributes: Arc<dyn AttributeManager>) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            files: RwLock::new(BTreeMap::new()),
            attributes,
        }
    }

    /// Number of file items held.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    fn prefix_of(path: &str) -> String {
        if path == PATH_ROOT {
            PATH_ROOT.to_string()
        } else {
            format!("{}/", path)
        }
    }

    fn children_of(files: &BTreeMap<String, Arc<Vec<u8>>>, path: &str) -> Vec<String> {
        let prefix = Self::prefix_of(path);
        let mut children = BTreeSet::new();
        for key in files.range(prefix.clone()..).map(|(k, _)| k) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            children.insert(rest.split('/').next().unwrap_or(rest).to_string());
        }
        children.into_iter().collect()
    }

    fn conflict(&self, uid: &RepositoryItemUid, message: &str) -> Error {
        Error::UnsupportedOperation {
            repository: self.repository_id.clone(),
            message: format!("{}: {}", uid.path(), message),
        }
    }
}

impl ItemStore for MemoryItemStore {
    fn repository_id(&self) -> &str {
        &self.repository_id
    }

    fn attributes(&self) -> &dyn AttributeManager {
        self.attributes.as_ref()
    }

    fn peek(&self, uid: &RepositoryItemUid) -> Result<StorageItem> {
        let files = self.files.read();

        if let Some(content) = files.get(uid.path()) {
            let attributes = match self.attributes.get_attributes(uid)? {
                Some(attributes) => attributes,
                None => {
                    let recovered = recovered_attributes(uid, content, now_millis());
                    self.attributes.put_attributes(uid, &recovered)?;
                    recovered
                }
            };
            return Ok(StorageItem::File(FileItem {
                uid: uid.clone(),
                attributes,
                content: ContentLocator::Bytes(Arc::clone(content)),
            }));
        }

        let children = Self::children_of(&files, uid.path());
        if children.is_empty() && !uid.is_root() {
            return Err(Error::not_found(&self.repository_id, uid.path()));
        }
        let attributes = self
            .attributes
            .get_attributes(uid)?
            .unwrap_or_else(|| Attributes::new_at(now_millis()));
        Ok(StorageItem::Collection(CollectionItem {
            uid: uid.clone(),
            attributes,
            children,
        }))
    }

    fn store(&self, item: &FileItem) -> Result<()> {
        let uid = &item.uid;
        if uid.is_root() {
            return Err(self.conflict(uid, "cannot store a file at the root"));
        }
        let content = item.read()?;

        let mut files = self.files.write();
        if !Self::children_of(&files, uid.path()).is_empty() {
            return Err(self.conflict(uid, "a collection exists at this path"));
        }
        let mut ancestor = path::parent_path(uid.path());
        while let Some(parent) = ancestor {
            if files.contains_key(&parent) {
                return Err(self.conflict(uid, "an ancestor is a file"));
            }
            ancestor = path::parent_path(&parent);
        }

        let attributes = stored_attributes(self.attributes.get_attributes(uid)?, item, &content);
        files.insert(uid.path().to_string(), Arc::new(content));
        self.attributes.put_attributes(uid, &attributes)
    }

    fn delete(&self, uid: &RepositoryItemUid) -> Result<bool> {
        let mut files = self.files.write();

        if files.remove(uid.path()).is_some() {
            self.attributes.delete_attributes(uid)?;
            return Ok(true);
        }

        let prefix = Self::prefix_of(uid.path());
        let doomed: Vec<String> = files
            .range(prefix.clone()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in &doomed {
            files.remove(key);
            self.attributes
                .delete_attributes(&RepositoryItemUid::new(&self.repository_id, key)?)?;
        }
        self.attributes.delete_attributes(uid)?;
        Ok(!doomed.is_empty())
    }

    fn list(&self, uid: &RepositoryItemUid) -> Result<Vec<String>> {
        let files = self.files.read();
        if files.contains_key(uid.path()) {
            return Err(Error::NotACollection {
                uid: uid.to_string(),
            });
        }
        let children = Self::children_of(&files, uid.path());
        if children.is_empty() && !uid.is_root() {
            return Err(Error::not_found(&self.repository_id, uid.path()));
        }
        Ok(children)
    }
}
