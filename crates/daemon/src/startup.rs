// Startup checks: the managed directory must exist and be a git working tree.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("repository path does not exist or is not a directory: {0}")]
    MissingDirectory(PathBuf),
    #[error("not a git repository (no .git at {0})")]
    NotARepository(PathBuf),
    #[error("failed to resolve repository path {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start change detector: {0:#}")]
    Detector(anyhow::Error),
}

/// The working directory under management. Canonical, absolute, and known to
/// contain `.git` when constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    root: PathBuf,
}

impl RepositoryHandle {
    pub fn open(path: &Path) -> Result<Self, StartupError> {
        if !path.is_dir() {
            return Err(StartupError::MissingDirectory(path.to_path_buf()));
        }
        let root = fs::canonicalize(path)
            .map_err(|source| StartupError::Canonicalize { path: path.to_path_buf(), source })?;

        // `.git` is a directory in a normal clone and a file in worktrees/submodules.
        if !root.join(".git").exists() {
            return Err(StartupError::NotARepository(root));
        }

        info!(repo = %root.display(), "repository opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_accepts_directory_with_git_dir() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();

        let repo = RepositoryHandle::open(tmp.path()).unwrap();
        assert_eq!(repo.root(), tmp.path().canonicalize().unwrap());
    }

    #[test]
    fn open_accepts_git_file_for_worktrees() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".git"), "gitdir: /elsewhere/.git/worktrees/x\n").unwrap();

        assert!(RepositoryHandle::open(tmp.path()).is_ok());
    }

    #[test]
    fn open_rejects_plain_directory() {
        let tmp = TempDir::new().unwrap();
        let error = RepositoryHandle::open(tmp.path()).unwrap_err();
        assert!(matches!(error, StartupError::NotARepository(_)));
        assert!(error.to_string().contains("not a git repository"));
    }

    #[test]
    fn open_rejects_missing_path() {
        let tmp = TempDir::new().unwrap();
        let error = RepositoryHandle::open(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(error, StartupError::MissingDirectory(_)));
    }

    #[test]
    fn open_rejects_regular_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(RepositoryHandle::open(&file), Err(StartupError::MissingDirectory(_))));
    }

    #[test]
    fn detector_error_shows_context_chain() {
        let error = StartupError::Detector(
            anyhow::anyhow!("inotify limit reached").context("failed to watch directory: /repo"),
        );
        assert_eq!(
            error.to_string(),
            "failed to start change detector: failed to watch directory: /repo: inotify limit reached"
        );
    }
}
