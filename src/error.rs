//! # Error Handling
//!
//! This module defines the centralized error handling mechanism for the
//! `artifact-repo` crate. It uses the `thiserror` library to create a
//! comprehensive `Error` enum that covers the failure modes of the content
//! resolution core, providing clear and descriptive error messages.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum that represents all possible errors that can
//!   occur within the crate. Each variant carries the repository, path or URL
//!   it concerns so that a failure can be traced back to a request.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`, used
//!   throughout the crate.
//!
//! ## Failure Classes
//!
//! Callers usually need to answer one question: should this request be
//! retried later? The variants are grouped accordingly:
//!
//! - **Absence**: `ItemNotFound` is a typed absence, never content.
//! - **Transient remote failure**: `RemoteAccess` is raised once every
//!   configured origin failed without a definitive answer. `RemoteTransient`
//!   and `RemoteAccessDenied` describe a single attempt and stay inside the
//!   proxy retry loop.
//! - **Caller rights**: `Authorization` originates outside the core and is
//!   always propagated.
//! - **Cancellation**: `TaskInterrupted` is raised when a cooperative stop
//!   flag was observed.
//! - **Local storage**: `StorageCorruption`, `Io` and `Json` concern the
//!   on-disk backends.

use std::sync::Arc;

use thiserror::Error;

/// Main error type for artifact-repo operations
#[derive(Error, Debug)]
pub enum Error {
    /// The requested item does not exist, locally or after exhausting the
    /// configured origins.
    ///
    /// `causes` collects member-level reasons when the lookup went through a
    /// group repository.
    #[error("Item not found: {repository}:{path}{}", format_causes(causes))]
    ItemNotFound {
        repository: String,
        path: String,
        causes: Vec<String>,
    },

    /// Every configured origin failed transiently.
    #[error("Remote access failed for {repository}:{path}: {message}")]
    RemoteAccess {
        repository: String,
        path: String,
        message: String,
    },

    /// A single fetch attempt against an origin failed in a retryable way
    /// (timeout, connection refused, 5xx, truncated body).
    #[error("Transient remote failure for {url}: {message}")]
    RemoteTransient { url: String, message: String },

    /// The origin refused the request (401/403).
    #[error("Remote access denied for {url}")]
    RemoteAccessDenied { url: String },

    /// The caller lacks the rights to perform the action.
    #[error("Access denied to {repository}:{path} for action '{action}'")]
    Authorization {
        repository: String,
        path: String,
        action: String,
    },

    /// A cooperative cancellation flag was observed.
    #[error("Task interrupted: {message}")]
    TaskInterrupted { message: String },

    /// Stored content or attributes could not be read back.
    #[error("Storage corruption at {uid}: {message}")]
    StorageCorruption { uid: String, message: String },

    /// The operation is not supported by this kind of repository.
    #[error("Unsupported operation on {repository}: {message}")]
    UnsupportedOperation { repository: String, message: String },

    /// No repository is registered under the given id.
    #[error("No such repository: {id}")]
    NoSuchRepository { id: String },

    /// A group membership change would be invalid (cycle, self reference).
    #[error("Invalid grouping for {group}: {message}")]
    InvalidGrouping { group: String, message: String },

    /// A repository path could not be normalized.
    #[error("Invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// A listing was requested for a file item.
    #[error("Not a collection: {uid}")]
    NotACollection { uid: String },

    /// A walk was stopped with a cause.
    #[error("Walk stopped: {cause}")]
    WalkerStopped {
        #[source]
        cause: Arc<Error>,
    },

    /// An error occurred while parsing or validating the configuration file.
    ///
    /// This error includes the specific parsing issue and optionally a hint
    /// about how to fix it.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON error from the attribute storage, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// An HTTP client setup error, wrapped from `reqwest::Error`.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

fn format_causes(causes: &[String]) -> String {
    if causes.is_empty() {
        String::new()
    } else {
        format!(" ({})", causes.join("; "))
    }
}

impl Error {
    /// Builds an `ItemNotFound` without member causes.
    pub fn not_found(repository: &str, path: &str) -> Self {
        Error::ItemNotFound {
            repository: repository.to_string(),
            path: path.to_string(),
            causes: Vec::new(),
        }
    }

    /// Builds a `TaskInterrupted` error.
    pub fn interrupted(message: impl Into<String>) -> Self {
        Error::TaskInterrupted {
            message: message.into(),
        }
    }

    /// Returns true for a typed absence.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::ItemNotFound { .. } => true,
            Error::WalkerStopped { cause } => cause.is_not_found(),
            _ => false,
        }
    }

    /// Returns true for failures a caller may retry later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::RemoteAccess { .. } | Error::RemoteTransient { .. }
        )
    }

    /// Returns true when cancellation was observed.
    pub fn is_interrupted(&self) -> bool {
        match self {
            Error::TaskInterrupted { .. } => true,
            Error::WalkerStopped { cause } => cause.is_interrupted(),
            _ => false,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
