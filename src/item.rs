//! Storage items and their attributes

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::uid::RepositoryItemUid;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Hex encoded SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Guess a MIME type from the file extension.
pub fn guess_mime_type(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "jar" | "war" | "ear" => "application/java-archive",
        "pom" | "xml" => "application/xml",
        "json" => "application/json",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "txt" | "sha1" | "sha256" | "sha512" | "md5" | "asc" => "text/plain",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

/// Metadata tracked per item independently of content bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    /// First successful store.
    pub created: i64,
    /// Last successful store (local deploy or remote fetch).
    pub last_modified: i64,
    /// Last read through the item store.
    pub last_requested: i64,
    /// Last time an origin confirmed this content; drives freshness.
    pub remote_checked: i64,
    /// Manually expired; forces revalidation regardless of age.
    #[serde(default)]
    pub expired: bool,
    /// Origin URL the content came from, if proxied.
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Free-form string attributes.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Attributes {
    /// Fresh attributes for an item stored now.
    pub fn new_at(now: i64) -> Self {
        Self {
            created: now,
            last_modified: now,
            last_requested: now,
            remote_checked: now,
            expired: false,
            remote_url: None,
            length: None,
            sha256: None,
            mime_type: None,
            extra: BTreeMap::new(),
        }
    }

    /// Recompute the content-derived fields.
    pub fn describe_content(&mut self, path: &str, content: &[u8]) {
        self.length = Some(content.len() as u64);
        self.sha256 = Some(sha256_hex(content));
        if self.mime_type.is_none() {
            self.mime_type = Some(guess_mime_type(path).to_string());
        }
    }

    /// True if the item came from a proxied origin.
    pub fn is_remote(&self) -> bool {
        self.remote_url.is_some()
    }
}

/// Where the bytes of a file item live.
#[derive(Debug, Clone)]
pub enum ContentLocator {
    /// Held in memory.
    Bytes(Arc<Vec<u8>>),
    /// Read lazily from a file on disk.
    File(PathBuf),
}

impl ContentLocator {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ContentLocator::Bytes(Arc::new(bytes))
    }

    /// Read the whole content.
    pub fn read(&self) -> Result<Vec<u8>> {
        match self {
            ContentLocator::Bytes(bytes) => Ok(bytes.as_ref().clone()),
            ContentLocator::File(path) => Ok(fs::read(path)?),
        }
    }
}

/// A file item: content plus attributes.
#[derive(Debug, Clone)]
pub struct FileItem {
    pub uid: RepositoryItemUid,
    pub attributes: Attributes,
    pub content: ContentLocator,
}

impl FileItem {
    /// A new file item with attributes describing `content`.
    pub fn new(uid: RepositoryItemUid, content: Vec<u8>) -> Self {
        let mut attributes = Attributes::new_at(now_millis());
        attributes.describe_content(uid.path(), &content);
        Self {
            uid,
            attributes,
            content: ContentLocator::from_bytes(content),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        self.content.read()
    }

    /// Content length, or zero if unknown.
    pub fn len(&self) -> u64 {
        self.attributes.length.unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A collection item: the names of its direct children.
#[derive(Debug, Clone)]
pub struct CollectionItem {
    pub uid: RepositoryItemUid,
    pub attributes: Attributes,
    /// Child names in ascending order.
    pub children: Vec<String>,
}

/// Either a file or a collection.
#[derive(Debug, Clone)]
pub enum StorageItem {
    File(FileItem),
    Collection(CollectionItem),
}

impl StorageItem {
    pub fn uid(&self) -> &RepositoryItemUid {
        match self {
            StorageItem::File(f) => &f.uid,
            StorageItem::Collection(c) => &c.uid,
        }
    }

    pub fn path(&self) -> &str {
        self.uid().path()
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            StorageItem::File(f) => &f.attributes,
            StorageItem::Collection(c) => &c.attributes,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            StorageItem::File(f) => &mut f.attributes,
            StorageItem::Collection(c) => &mut c.attributes,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, StorageItem::Collection(_))
    }

    pub fn as_file(&self) -> Option<&FileItem> {
        match self {
            StorageItem::File(f) => Some(f),
            StorageItem::Collection(_) => None,
        }
    }

    pub fn into_file(self) -> Option<FileItem> {
        match self {
            StorageItem::File(f) => Some(f),
            StorageItem::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionItem> {
        match self {
            StorageItem::File(_) => None,
            StorageItem::Collection(c) => Some(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_item_describes_content() {
        let uid = RepositoryItemUid::new("r", "/org/foo/1.0/foo-1.0.jar").unwrap();
        let item = FileItem::new(uid, b"jar bytes".to_vec());
        assert_eq!(item.len(), 9);
        assert_eq!(
            item.attributes.mime_type.as_deref(),
            Some("application/java-archive")
        );
        assert_eq!(item.attributes.sha256.as_ref().unwrap().len(), 64);
        assert!(!item.attributes.is_remote());
        assert_eq!(item.read().unwrap(), b"jar bytes");
    }

    #[test]
    fn test_zero_length_content_is_distinct() {
        let uid = RepositoryItemUid::new("r", "/empty.txt").unwrap();
        let item = FileItem::new(uid, Vec::new());
        assert!(item.is_empty());
        assert_eq!(item.attributes.length, Some(0));
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type("/a/b.pom"), "application/xml");
        assert_eq!(guess_mime_type("/a/b.JAR"), "application/java-archive");
        assert_eq!(guess_mime_type("/a/noext"), "application/octet-stream");
    }

    #[test]
    fn test_attributes_json_roundtrip_tolerates_missing_optional_fields() {
        let json = r#"{"created":1,"last_modified":2,"last_requested":3,"remote_checked":4}"#;
        let attrs: Attributes = serde_json::from_str(json).unwrap();
        assert_eq!(attrs.last_requested, 3);
        assert!(!attrs.expired);
        assert!(attrs.extra.is_empty());
    }

    #[test]
    fn test_storage_item_accessors() {
        let uid = RepositoryItemUid::new("r", "/dir").unwrap();
        let mut item = StorageItem::Collection(CollectionItem {
            uid,
            attributes: Attributes::new_at(10),
            children: vec!["a".to_string()],
        });
        assert!(item.is_collection());
        assert!(item.as_file().is_none());
        item.attributes_mut().expired = true;
        assert!(item.attributes().expired);
        assert_eq!(item.path(), "/dir");
    }
}
