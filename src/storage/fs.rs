//! Directory-backed item store

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use log::{debug, warn};
use walkdir::WalkDir;

use crate::attributes::AttributeManager;
use crate::error::{Error, Result};
use crate::item::{now_millis, Attributes, CollectionItem, ContentLocator, FileItem, StorageItem};
use crate::storage::{
    is_absent, recovered_attributes, stored_attributes, write_atomic, ItemStore,
    TEMP_FILE_PREFIX,
};
use crate::uid::RepositoryItemUid;

/// Item store keeping file content below a root directory.
///
/// The item `/org/foo.jar` lives at `<root>/org/foo.jar`; collections are
/// plain directories. Content is read lazily through
/// [`ContentLocator::File`].
pub struct FsItemStore {
    repository_id: String,
    root: PathBuf,
    attributes: Arc<dyn AttributeManager>,
}

fn modified_millis(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or_else(now_millis)
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_FILE_PREFIX)
}

impl FsItemStore {
    pub fn new(
        repository_id: &str,
        root: impl Into<PathBuf>,
        attributes: Arc<dyn AttributeManager>,
    ) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            root: root.into(),
            attributes,
        }
    }

    /// The content root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn content_path(&self, uid: &RepositoryItemUid) -> PathBuf {
        let relative = uid.path().trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    fn metadata(&self, uid: &RepositoryItemUid) -> Result<Option<fs::Metadata>> {
        match fs::metadata(self.content_path(uid)) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if is_absent(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read_children(dir: &Path) -> Result<Vec<String>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if is_absent(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !is_temp_name(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn conflict(&self, uid: &RepositoryItemUid, message: &str) -> Error {
        Error::UnsupportedOperation {
            repository: self.repository_id.clone(),
            message: format!("{}: {}", uid.path(), message),
        }
    }

    fn uid_of(&self, disk_path: &Path) -> Option<RepositoryItemUid> {
        let relative = disk_path.strip_prefix(&self.root).ok()?;
        let relative = relative.to_string_lossy().replace('\\', "/");
        RepositoryItemUid::new(&self.repository_id, &relative).ok()
    }
}

impl ItemStore for FsItemStore {
    fn repository_id(&self) -> &str {
        &self.repository_id
    }

    fn attributes(&self) -> &dyn AttributeManager {
        self.attributes.as_ref()
    }

    fn peek(&self, uid: &RepositoryItemUid) -> Result<StorageItem> {
        let Some(metadata) = self.metadata(uid)? else {
            if uid.is_root() {
                return Ok(StorageItem::Collection(CollectionItem {
                    uid: uid.clone(),
                    attributes: Attributes::new_at(now_millis()),
                    children: Vec::new(),
                }));
            }
            return Err(Error::not_found(&self.repository_id, uid.path()));
        };
        let disk_path = self.content_path(uid);

        if metadata.is_dir() {
            let attributes = self
                .attributes
                .get_attributes(uid)?
                .unwrap_or_else(|| Attributes::new_at(modified_millis(&metadata)));
            return Ok(StorageItem::Collection(CollectionItem {
                uid: uid.clone(),
                attributes,
                children: Self::read_children(&disk_path)?,
            }));
        }

        let attributes = match self.attributes.get_attributes(uid)? {
            Some(attributes) => attributes,
            None => {
                debug!("recovering attributes of {} from content", uid);
                let content = fs::read(&disk_path)?;
                let recovered =
                    recovered_attributes(uid, &content, modified_millis(&metadata));
                self.attributes.put_attributes(uid, &recovered)?;
                recovered
            }
        };
        Ok(StorageItem::File(FileItem {
            uid: uid.clone(),
            attributes,
            content: ContentLocator::File(disk_path),
        }))
    }

    fn store(&self, item: &FileItem) -> Result<()> {
        let uid = &item.uid;
        if uid.is_root() {
            return Err(self.conflict(uid, "cannot store a file at the root"));
        }
        if self.metadata(uid)?.is_some_and(|m| m.is_dir()) {
            return Err(self.conflict(uid, "a collection exists at this path"));
        }
        let mut ancestor = uid.parent();
        while let Some(parent) = ancestor {
            if parent.is_root() {
                break;
            }
            if self.metadata(&parent)?.is_some_and(|m| m.is_file()) {
                return Err(self.conflict(uid, "an ancestor is a file"));
            }
            ancestor = parent.parent();
        }

        let content = item.read()?;
        let attributes = stored_attributes(self.attributes.get_attributes(uid)?, item, &content);
        write_atomic(&self.content_path(uid), &content)?;
        self.attributes.put_attributes(uid, &attributes)
    }

    fn delete(&self, uid: &RepositoryItemUid) -> Result<bool> {
        let Some(metadata) = self.metadata(uid)? else {
            return Ok(false);
        };
        let disk_path = self.content_path(uid);

        if !metadata.is_dir() {
            fs::remove_file(&disk_path)?;
            self.attributes.delete_attributes(uid)?;
            return Ok(true);
        }

        for entry in WalkDir::new(&disk_path).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping unreadable entry below {}: {}", disk_path.display(), e);
                    continue;
                }
            };
            if is_temp_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            if let Some(child) = self.uid_of(entry.path()) {
                self.attributes.delete_attributes(&child)?;
            }
        }
        self.attributes.delete_attributes(uid)?;

        if uid.is_root() {
            for name in Self::read_children(&disk_path)? {
                let child = disk_path.join(name);
                if child.is_dir() {
                    fs::remove_dir_all(&child)?;
                } else {
                    fs::remove_file(&child)?;
                }
            }
        } else {
            fs::remove_dir_all(&disk_path)?;
        }
        Ok(true)
    }

    fn list(&self, uid: &RepositoryItemUid) -> Result<Vec<String>> {
        match self.metadata(uid)? {
            Some(metadata) if metadata.is_dir() => Self::read_children(&self.content_path(uid)),
            Some(_) => Err(Error::NotACollection {
                uid: uid.to_string(),
            }),
            None if uid.is_root() => Ok(Vec::new()),
            None => Err(Error::not_found(&self.repository_id, uid.path())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::FsAttributeManager;
    use crate::storage::contract;
    use tempfile::TempDir;

    fn make_store(temp: &TempDir) -> FsItemStore {
        FsItemStore::new(
            "central",
            temp.path().join("content"),
            Arc::new(FsAttributeManager::new(temp.path().join("attributes"))),
        )
    }

    #[test]
    fn test_fs_store_contract() {
        let temps: std::cell::RefCell<Vec<TempDir>> = Default::default();
        contract::run_all(|| {
            let temp = TempDir::new().unwrap();
            let store = make_store(&temp);
            temps.borrow_mut().push(temp);
            Box::new(store)
        });
    }

    #[test]
    fn test_content_is_read_lazily_from_disk() {
        let temp = TempDir::new().unwrap();
        let store = make_store(&temp);
        let uid = RepositoryItemUid::new("central", "/org/a.jar").unwrap();
        store.store(&FileItem::new(uid.clone(), b"abc".to_vec())).unwrap();

        let item = store.peek(&uid).unwrap();
        let file = item.as_file().unwrap();
        match &file.content {
            ContentLocator::File(p) => assert_eq!(p, &temp.path().join("content/org/a.jar")),
            other => panic!("expected file locator, got {:?}", other),
        }
        assert_eq!(file.read().unwrap(), b"abc");
    }

    #[test]
    fn test_temp_files_are_not_listed() {
        let temp = TempDir::new().unwrap();
        let store = make_store(&temp);
        let uid = RepositoryItemUid::new("central", "/dir/a.pom").unwrap();
        store.store(&FileItem::new(uid, b"pom".to_vec())).unwrap();
        fs::write(temp.path().join("content/dir/.tmp-a.pom-1-1"), b"partial").unwrap();

        let dir = RepositoryItemUid::new("central", "/dir").unwrap();
        assert_eq!(store.list(&dir).unwrap(), vec!["a.pom"]);
    }

    #[test]
    fn test_unrecorded_file_gets_recovered_attributes() {
        let temp = TempDir::new().unwrap();
        let store = make_store(&temp);
        fs::create_dir_all(temp.path().join("content/org")).unwrap();
        fs::write(temp.path().join("content/org/dropped.jar"), b"1234").unwrap();

        let uid = RepositoryItemUid::new("central", "/org/dropped.jar").unwrap();
        let item = store.peek(&uid).unwrap();
        assert_eq!(item.attributes().length, Some(4));
        assert!(store.attributes().get_attributes(&uid).unwrap().is_some());
    }

    #[test]
    fn test_delete_root_keeps_root_collection() {
        let temp = TempDir::new().unwrap();
        let store = make_store(&temp);
        let uid = RepositoryItemUid::new("central", "/a/b.jar").unwrap();
        store.store(&FileItem::new(uid, b"x".to_vec())).unwrap();

        let root = RepositoryItemUid::root("central");
        assert!(store.delete(&root).unwrap());
        assert!(store.list(&root).unwrap().is_empty());
        assert!(temp.path().join("content").is_dir());
    }

    #[test]
    fn test_empty_directory_is_a_collection() {
        let temp = TempDir::new().unwrap();
        let store = make_store(&temp);
        fs::create_dir_all(temp.path().join("content/empty")).unwrap();

        let uid = RepositoryItemUid::new("central", "/empty").unwrap();
        let item = store.peek(&uid).unwrap();
        assert!(item.as_collection().unwrap().children.is_empty());
    }
}
