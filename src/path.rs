//! Path manipulation utilities for repository item paths

use crate::error::{Error, Result};
use glob::Pattern;
use regex::Regex;

/// The root path of every repository.
pub const PATH_ROOT: &str = "/";

/// Separator used between path segments.
pub const PATH_SEPARATOR: char = '/';

/// Normalize a repository item path.
///
/// The result is absolute (`/`-rooted), has no empty, `.` or `..` segments
/// and no trailing slash except for the root itself. A `..` that would climb
/// above the root is rejected. Backslashes are treated as separators.
pub fn normalize_path(path: &str) -> Result<String> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::InvalidPath {
                        path: path.to_string(),
                        message: "path escapes the repository root".to_string(),
                    });
                }
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Ok(PATH_ROOT.to_string());
    }

    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in segments {
        normalized.push(PATH_SEPARATOR);
        normalized.push_str(segment);
    }
    Ok(normalized)
}

/// Return the parent of a normalized path, or `None` for the root.
pub fn parent_path(path: &str) -> Option<String> {
    if path == PATH_ROOT {
        return None;
    }
    match path.rfind(PATH_SEPARATOR) {
        Some(0) => Some(PATH_ROOT.to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// Return the last segment of a normalized path (empty for the root).
pub fn file_name(path: &str) -> &str {
    match path.rfind(PATH_SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join a child name onto a normalized collection path.
pub fn join(parent: &str, name: &str) -> Result<String> {
    if parent == PATH_ROOT {
        normalize_path(&format!("/{}", name))
    } else {
        normalize_path(&format!("{}/{}", parent, name))
    }
}

/// Return true if `path` equals `prefix` or lies below it.
pub fn is_under(path: &str, prefix: &str) -> bool {
    if prefix == PATH_ROOT || path == prefix {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with(PATH_SEPARATOR))
}

/// Return true if any segment of a normalized path is hidden (starts with `.`).
pub fn is_hidden(path: &str) -> bool {
    path.split(PATH_SEPARATOR).any(|s| s.starts_with('.'))
}

/// Match a path against a glob pattern
pub fn glob_match(pattern: &str, path: &str) -> Result<bool> {
    let pattern = Pattern::new(pattern).map_err(Error::Glob)?;
    Ok(pattern.matches(path))
}

/// Compiled set of regular expressions classifying paths, e.g. which items
/// count as metadata for the purpose of freshness.
#[derive(Debug, Clone, Default)]
pub struct PathClassifier {
    patterns: Vec<Regex>,
}

impl PathClassifier {
    /// Compile the given patterns.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()).map_err(Error::Regex))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Return true if any pattern matches the path.
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Encode a repository id to be filesystem-safe
///
/// This converts characters that are problematic for filesystems
/// into safe alternatives.
pub fn encode_repository_id(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' => '-',
            '\\' => '-',
            ':' => '_',
            '*' => '_',
            '?' => '_',
            '"' => '_',
            '<' => '_',
            '>' => '_',
            '|' => '_',
            // Keep alphanumeric, dots, dashes, underscores as-is
            c if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' => c,
            // Replace other characters with underscores
            _ => '_',
        })
        .collect()
}
