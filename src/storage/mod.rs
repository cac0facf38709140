//! # Local item storage
//!
//! An [`ItemStore`] keeps the items owned by one repository, keyed by
//! [`RepositoryItemUid`]. File content goes to the store's own backend, item
//! metadata to an [`AttributeManager`] the store is constructed with.
//!
//! Stores only guarantee atomic single-key reads and writes. Serializing the
//! check-fetch-store sequence for one key is the caller's job (see
//! [`crate::proxy`] and [`crate::lock`]).
//!
//! Two backends are provided:
//!
//! - [`MemoryItemStore`]: everything in memory. Collections exist implicitly
//!   as long as they have children (the root always exists).
//! - [`FsItemStore`]: content under a directory tree; writes use
//!   [`write_atomic`] so a concurrent reader never sees a partial file.

mod fs;
mod memory;

pub use self::fs::FsItemStore;
pub use self::memory::MemoryItemStore;

use std::fs as stdfs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::attributes::AttributeManager;
use crate::error::Result;
use crate::item::{now_millis, Attributes, FileItem, StorageItem};
use crate::uid::RepositoryItemUid;

/// File name prefix of in-flight temporary files; such entries are never listed.
pub const TEMP_FILE_PREFIX: &str = ".tmp-";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Whether an I/O error means "nothing at this path". A path below a regular
/// file fails with `NotADirectory` rather than `NotFound`.
pub(crate) fn is_absent(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
    )
}

/// Write `bytes` to `path` by writing a sibling temporary file and renaming
/// it into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    stdfs::create_dir_all(parent)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(
        "{}{}-{}-{}",
        TEMP_FILE_PREFIX,
        name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    let written = (|| -> std::io::Result<()> {
        let mut file = stdfs::File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        stdfs::rename(&temp, path)
    })();

    if let Err(e) = written {
        let _ = stdfs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(())
}

/// Content storage for the items of one repository.
pub trait ItemStore: Send + Sync {
    /// Id of the repository owning this store.
    fn repository_id(&self) -> &str;

    /// The attribute storage backing this store.
    fn attributes(&self) -> &dyn AttributeManager;

    /// Read an item without touching its `last_requested` timestamp.
    ///
    /// An absent item is `Error::ItemNotFound`, never an empty file.
    fn peek(&self, uid: &RepositoryItemUid) -> Result<StorageItem>;

    /// Store a file item, replacing any previous content atomically.
    ///
    /// `created` is preserved from a previous record; `last_modified` is set
    /// to now and content-derived attributes are recomputed.
    fn store(&self, item: &FileItem) -> Result<()>;

    /// Delete a file, or a collection with everything below it.
    ///
    /// Returns whether anything was deleted.
    fn delete(&self, uid: &RepositoryItemUid) -> Result<bool>;

    /// Names of the direct children of a collection, in ascending order.
    fn list(&self, uid: &RepositoryItemUid) -> Result<Vec<String>>;

    /// Returns true if an item (file or collection) exists at `uid`.
    fn contains(&self, uid: &RepositoryItemUid) -> bool {
        self.peek(uid).is_ok()
    }

    /// Read an item and record the access in `last_requested`.
    fn retrieve(&self, uid: &RepositoryItemUid) -> Result<StorageItem> {
        let mut item = self.peek(uid)?;
        if let StorageItem::File(file) = &mut item {
            file.attributes.last_requested = now_millis();
            self.attributes().put_attributes(uid, &file.attributes)?;
        }
        Ok(item)
    }

    /// Replace the attributes of an existing item.
    fn update_attributes(&self, uid: &RepositoryItemUid, attributes: &Attributes) -> Result<()> {
        self.attributes().put_attributes(uid, attributes)
    }
}

/// Attributes to persist for `item` whose content is `content`.
pub(crate) fn stored_attributes(
    existing: Option<Attributes>,
    item: &FileItem,
    content: &[u8],
) -> Attributes {
    let now = now_millis();
    let mut attributes = item.attributes.clone();
    if let Some(existing) = existing {
        attributes.created = existing.created;
    }
    attributes.last_modified = now;
    attributes.length = None;
    attributes.sha256 = None;
    attributes.describe_content(item.uid.path(), content);
    attributes
}

/// Attributes for a file found without a readable record, derived from its
/// content and on-disk modification time.
pub(crate) fn recovered_attributes(uid: &RepositoryItemUid, content: &[u8], mtime: i64) -> Attributes {
    let mut attributes = Attributes::new_at(mtime);
    attributes.last_requested = now_millis();
    attributes.describe_content(uid.path(), content);
    attributes
}
