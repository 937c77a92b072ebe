// Ignore policy: decides whether a filesystem path is noise for the sync pipeline.
//
// Two independent rule sets, OR-ed together:
// - directory segments: any path segment equal to an ignored directory name
// - suffixes: the file name ends with an ignored suffix

use std::collections::BTreeSet;
use std::path::Path;

use crate::path::normalize::{normalize_rule, segments};

/// Directories skipped by default: VCS metadata, editor state, build output,
/// interpreter caches.
pub const DEFAULT_IGNORED_DIRS: &[&str] =
    &[".git", ".vscode", ".idea", ".pio", "__pycache__", "target", "node_modules"];

/// File suffixes skipped by default: logs, temp files, editor swap files,
/// compiled bytecode.
pub const DEFAULT_IGNORED_SUFFIXES: &[&str] = &[".log", ".tmp", ".swp", ".pyc", "~"];

/// Immutable ignore ruleset. Both change detectors share one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnorePolicy {
    dirs: BTreeSet<String>,
    suffixes: BTreeSet<String>,
}

impl Default for IgnorePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_DIRS.iter().copied(), DEFAULT_IGNORED_SUFFIXES.iter().copied())
    }
}

impl IgnorePolicy {
    /// Build a policy from directory names and suffixes. Entries are trimmed,
    /// normalized and lowercased; blank entries are dropped.
    pub fn new<D, S>(dirs: D, suffixes: S) -> Self
    where
        D: IntoIterator,
        D::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let dirs = dirs
            .into_iter()
            .map(|dir| normalize_rule(dir.as_ref()))
            .filter(|dir| !dir.is_empty())
            .collect();
        let suffixes = suffixes
            .into_iter()
            .map(|suffix| normalize_rule(suffix.as_ref()))
            .filter(|suffix| !suffix.is_empty())
            .collect();
        Self { dirs, suffixes }
    }

    pub fn ignored_dirs(&self) -> impl Iterator<Item = &str> {
        self.dirs.iter().map(String::as_str)
    }

    pub fn ignored_suffixes(&self) -> impl Iterator<Item = &str> {
        self.suffixes.iter().map(String::as_str)
    }

    /// Returns true if `path` should be treated as noise.
    pub fn should_ignore(&self, path: &Path) -> bool {
        self.should_ignore_str(&path.to_string_lossy())
    }

    /// Like [`should_ignore`](Self::should_ignore), but evaluates only the part
    /// of `path` below `root`. A repository living inside a directory whose
    /// name is ignored (e.g. `/home/me/target/repo`) is not ignored wholesale.
    /// Paths outside `root` are evaluated in full.
    pub fn should_ignore_under(&self, root: &Path, path: &Path) -> bool {
        match path.strip_prefix(root) {
            Ok(relative) => self.should_ignore(relative),
            Err(_) => self.should_ignore(path),
        }
    }

    /// Returns true if a directory with this name must be pruned from traversal.
    pub fn is_ignored_dir_name(&self, name: &str) -> bool {
        self.dirs.contains(&normalize_rule(name))
    }

    /// String form of [`should_ignore`](Self::should_ignore); separators may be
    /// `/` or `\`.
    pub fn should_ignore_str(&self, path: &str) -> bool {
        let parts = segments(path);

        if parts.iter().any(|segment| self.dirs.contains(segment)) {
            return true;
        }

        match parts.last() {
            Some(file_name) => {
                self.suffixes.iter().any(|suffix| file_name.ends_with(suffix.as_str()))
            }
            None => false,
        }
    }
}
