//! # Remote origins
//!
//! The proxy talks to origins through the [`RemoteStorage`] trait. A fetch
//! returns the content, a definitive absence, or `NotModified` for a
//! conditional request; every other failure is an error the proxy classifies
//! as retryable or not.
//!
//! [`DefaultRemoteStorage`] dispatches on the URL scheme: `http`/`https` go
//! through a blocking `reqwest` client, `file` URLs read the local
//! filesystem. Tests substitute their own implementation.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::time::{Duration, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use log::{debug, trace};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::item::now_millis;
use crate::request::Cancellation;

const READ_CHUNK: usize = 64 * 1024;

/// Content returned by an origin.
#[derive(Debug, Clone, Default)]
pub struct RemoteContent {
    pub bytes: Vec<u8>,
    /// Length announced by the origin, if any.
    pub content_length: Option<u64>,
    /// Origin modification time in epoch milliseconds, if announced.
    pub last_modified: Option<i64>,
}

impl RemoteContent {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Self::default()
        }
    }

    /// A body shorter or longer than the announced length is a transient failure.
    pub fn verify_length(&self, url: &str) -> Result<()> {
        match self.content_length {
            Some(expected) if expected != self.bytes.len() as u64 => Err(Error::RemoteTransient {
                url: url.to_string(),
                message: format!(
                    "content length mismatch: announced {}, received {}",
                    expected,
                    self.bytes.len()
                ),
            }),
            _ => Ok(()),
        }
    }
}

/// Result of a single fetch attempt.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Found(RemoteContent),
    NotFound,
    /// The origin confirmed the conditional request's timestamp is current.
    NotModified,
}

/// Per-attempt fetch parameters.
#[derive(Debug, Clone)]
pub struct FetchContext<'a> {
    /// Send a conditional request for content newer than this (epoch millis).
    pub if_modified_since: Option<i64>,
    pub cancellation: &'a Cancellation,
}

/// Transport to origin servers.
pub trait RemoteStorage: Send + Sync {
    /// Fetch the item at `url`.
    ///
    /// Transient failures are `Error::RemoteTransient`; a refused request is
    /// `Error::RemoteAccessDenied`; cancellation is `Error::TaskInterrupted`.
    fn fetch(&self, url: &str, context: &FetchContext<'_>) -> Result<FetchOutcome>;
}

/// Join an origin base URL and an item path.
pub fn item_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Format epoch milliseconds as an HTTP date.
pub fn http_date(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|d| d.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}

/// Parse an HTTP date into epoch milliseconds.
pub fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.timestamp_millis())
}

fn transient(url: &str, message: impl ToString) -> Error {
    Error::RemoteTransient {
        url: url.to_string(),
        message: message.to_string(),
    }
}

/// Map a response status to an outcome. `Ok(None)` means the body should be read.
fn status_outcome(url: &str, status: StatusCode) -> Result<Option<FetchOutcome>> {
    match status {
        s if s.is_success() => Ok(None),
        StatusCode::NOT_MODIFIED => Ok(Some(FetchOutcome::NotModified)),
        StatusCode::NOT_FOUND | StatusCode::GONE => Ok(Some(FetchOutcome::NotFound)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::RemoteAccessDenied {
            url: url.to_string(),
        }),
        s => Err(transient(url, format!("unexpected status {}", s))),
    }
}

/// Read `reader` to the end in chunks, checking `cancellation` between chunks.
fn read_cancellable(
    url: &str,
    reader: &mut impl Read,
    cancellation: &Cancellation,
    size_hint: Option<u64>,
) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(size_hint.unwrap_or(0).min(16 * 1024 * 1024) as usize);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        cancellation.check(&format!("download of {}", url))?;
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => bytes.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(transient(url, e)),
        }
    }
    Ok(bytes)
}

/// HTTP(S) transport over a blocking `reqwest` client.
pub struct HttpRemoteStorage {
    client: Client,
}

impl HttpRemoteStorage {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .user_agent(concat!("artifact-repo/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl RemoteStorage for HttpRemoteStorage {
    fn fetch(&self, url: &str, context: &FetchContext<'_>) -> Result<FetchOutcome> {
        context.cancellation.check(&format!("download of {}", url))?;

        let mut request = self.client.get(url);
        if let Some(date) = context.if_modified_since.and_then(http_date) {
            request = request.header(IF_MODIFIED_SINCE, date);
        }
        let mut response = request.send().map_err(|e| transient(url, e))?;
        trace!("GET {} -> {}", url, response.status());

        if let Some(outcome) = status_outcome(url, response.status())? {
            return Ok(outcome);
        }

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_http_date);
        let bytes = read_cancellable(url, &mut response, context.cancellation, content_length)?;

        Ok(FetchOutcome::Found(RemoteContent {
            bytes,
            content_length,
            last_modified,
        }))
    }
}

/// Transport reading `file://` URLs, mainly for tests and local mirrors.
#[derive(Debug, Default)]
pub struct FileRemoteStorage;

impl FileRemoteStorage {
    fn file_path(url: &str) -> Result<PathBuf> {
        Url::parse(url)?
            .to_file_path()
            .map_err(|_| Error::InvalidPath {
                path: url.to_string(),
                message: "not a local file URL".to_string(),
            })
    }
}

impl RemoteStorage for FileRemoteStorage {
    fn fetch(&self, url: &str, context: &FetchContext<'_>) -> Result<FetchOutcome> {
        let path = Self::file_path(url)?;
        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(FetchOutcome::NotFound),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(FetchOutcome::NotFound),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Err(Error::RemoteAccessDenied {
                    url: url.to_string(),
                })
            }
            Err(e) => return Err(transient(url, e)),
        };

        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64);
        if let (Some(since), Some(modified)) = (context.if_modified_since, last_modified) {
            // HTTP dates carry second precision
            if modified / 1000 <= since / 1000 {
                return Ok(FetchOutcome::NotModified);
            }
        }

        let mut file = fs::File::open(&path).map_err(|e| transient(url, e))?;
        let bytes = read_cancellable(url, &mut file, context.cancellation, Some(metadata.len()))?;
        Ok(FetchOutcome::Found(RemoteContent {
            content_length: Some(metadata.len()),
            bytes,
            last_modified,
        }))
    }
}

/// Scheme-dispatching transport used for configured repositories.
pub struct DefaultRemoteStorage {
    http: HttpRemoteStorage,
    file: FileRemoteStorage,
}

impl DefaultRemoteStorage {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpRemoteStorage::new(connect_timeout, read_timeout)?,
            file: FileRemoteStorage,
        })
    }
}

impl RemoteStorage for DefaultRemoteStorage {
    fn fetch(&self, url: &str, context: &FetchContext<'_>) -> Result<FetchOutcome> {
        match Url::parse(url)?.scheme() {
            "http" | "https" => self.http.fetch(url, context),
            "file" => self.file.fetch(url, context),
            other => Err(Error::UnsupportedOperation {
                repository: url.to_string(),
                message: format!("unsupported URL scheme '{}'", other),
            }),
        }
    }
}

/// An alternative origin serving the same content as the canonical one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    pub id: String,
    pub url: String,
}

/// Ordered mirrors with a time-bounded blacklist of failing ones.
#[derive(Debug)]
pub struct DownloadMirrors {
    mirrors: Vec<Mirror>,
    blacklist_minutes: i64,
    blacklisted_until: Mutex<HashMap<String, i64>>,
}

impl DownloadMirrors {
    pub fn new(mirrors: Vec<Mirror>, blacklist_minutes: i64) -> Self {
        Self {
            mirrors,
            blacklist_minutes,
            blacklisted_until: Mutex::new(HashMap::new()),
        }
    }

    pub fn mirrors(&self) -> &[Mirror] {
        &self.mirrors
    }

    /// Origins to try, in order: usable mirrors, then `canonical`.
    pub fn urls(&self, canonical: &str) -> Vec<String> {
        let now = now_millis();
        let mut blacklist = self.blacklisted_until.lock();
        blacklist.retain(|_, until| *until > now);

        let mut urls: Vec<String> = self
            .mirrors
            .iter()
            .filter(|m| m.url != canonical && !blacklist.contains_key(&m.url))
            .map(|m| m.url.clone())
            .collect();
        urls.push(canonical.to_string());
        urls
    }

    pub fn is_blacklisted(&self, url: &str) -> bool {
        self.blacklisted_until
            .lock()
            .get(url)
            .is_some_and(|until| *until > now_millis())
    }

    pub fn feedback_success(&self, url: &str) {
        self.blacklisted_until.lock().remove(url);
    }

    /// Blacklist `url` if it is a configured mirror.
    pub fn feedback_failure(&self, url: &str) {
        if self.blacklist_minutes <= 0 || !self.mirrors.iter().any(|m| m.url == url) {
            return;
        }
        debug!(
            "blacklisting mirror {} for {} minutes",
            url, self.blacklist_minutes
        );
        let until = now_millis().saturating_add(self.blacklist_minutes.saturating_mul(60_000));
        self.blacklisted_until.lock().insert(url.to_string(), until);
    }
}
