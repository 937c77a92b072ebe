// Configuration files for the sync engine.
//
// Repository config: `<repo>/.autosync/config.toml`
// Global config: `~/.autosync/config.toml`
//
// The first file that exists wins; with neither, built-in defaults apply.

use std::path::{Path, PathBuf};
use std::time::Duration;

use autosync_common::ignore::{DEFAULT_IGNORED_DIRS, DEFAULT_IGNORED_SUFFIXES};
use autosync_common::types::SyncMode;
use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::git::message::DEFAULT_COMMIT_PREFIX;
pub use crate::git::orchestrator::PushPolicy;
use crate::watcher::debounce::DEFAULT_QUIET_SECS;
use crate::watcher::poll::DEFAULT_POLL_INTERVAL_SECS;

const CONFIG_DIR: &str = ".autosync";
const CONFIG_FILE: &str = "config.toml";

/// Root directory for global state: `~/.autosync/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(CONFIG_DIR))
}

/// Path to the global config file: `~/.autosync/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join(CONFIG_FILE))
}

/// Path to the repository config file: `<repo>/.autosync/config.toml`.
pub fn repo_config_path(repo_root: &Path) -> PathBuf {
    repo_root.join(CONFIG_DIR).join(CONFIG_FILE)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AutosyncConfig {
    pub sync: SyncSection,
    pub git: GitSection,
    pub ignore: IgnoreSection,
}

/// When and how changes are detected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSection {
    pub mode: SyncMode,
    /// Quiet interval before a burst of changes triggers a sync.
    pub debounce_secs: u64,
    /// Scan interval for `mode = "polling"`.
    pub poll_interval_secs: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            mode: SyncMode::Event,
            debounce_secs: DEFAULT_QUIET_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitSection {
    /// Remote used when `branch` is set.
    pub remote: String,
    /// Push/pull `<remote> <branch>` explicitly. Unset means the current
    /// branch's upstream.
    pub branch: Option<String>,
    pub commit_prefix: String,
    /// `disabled` or `auto_rebase`.
    pub push_policy: PushPolicy,
}

impl Default for GitSection {
    fn default() -> Self {
        Self {
            remote: "origin".into(),
            branch: None,
            commit_prefix: DEFAULT_COMMIT_PREFIX.into(),
            push_policy: PushPolicy::AutoRebase,
        }
    }
}

/// Replaces (does not extend) the built-in ignore lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IgnoreSection {
    pub dirs: Vec<String>,
    pub suffixes: Vec<String>,
}

impl Default for IgnoreSection {
    fn default() -> Self {
        Self {
            dirs: DEFAULT_IGNORED_DIRS.iter().map(|s| s.to_string()).collect(),
            suffixes: DEFAULT_IGNORED_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AutosyncConfig {
    /// Load the repository config, else the global one, else defaults.
    /// A file that exists but does not parse is an error.
    pub fn load(repo_root: &Path) -> Result<Self, ConfigError> {
        let candidates = std::iter::once(repo_config_path(repo_root)).chain(global_config_path());
        for path in candidates {
            if path.is_file() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    pub fn into_engine_config(self, repository: PathBuf) -> EngineConfig {
        EngineConfig {
            repository,
            mode: self.sync.mode,
            commit_prefix: self.git.commit_prefix,
            debounce: Duration::from_secs(self.sync.debounce_secs),
            poll_interval: Duration::from_secs(self.sync.poll_interval_secs.max(1)),
            ignore_dirs: self.ignore.dirs,
            ignore_suffixes: self.ignore.suffixes,
            remote: self.git.remote,
            branch: self.git.branch,
            push_policy: self.git.push_policy,
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
