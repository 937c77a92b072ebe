// Polling detector: re-hash the whole tree on a fixed interval and diff the
// result against the previous scan.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use autosync_common::ignore::IgnorePolicy;
use autosync_common::types::SyncMode;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use super::hash::{diff_tables, hash_file, sha256_hex, FingerprintTable};
use super::{ChangeRecord, ChangeSource, DetectorEvent};

/// Default interval between scans.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Owns the fingerprint table between scans.
pub struct PollingScanner {
    root: PathBuf,
    policy: Arc<IgnorePolicy>,
    table: Option<FingerprintTable>,
}

impl PollingScanner {
    pub fn new(root: PathBuf, policy: Arc<IgnorePolicy>) -> Self {
        Self { root, policy, table: None }
    }

    /// Scan the tree and return what changed since the previous scan.
    ///
    /// The first call only records the baseline and returns nothing. The new
    /// table always replaces the old one.
    pub fn scan(&mut self) -> Result<Vec<ChangeRecord>> {
        let current = scan_tree(&self.root, &self.policy)?;
        let records = match &self.table {
            None => {
                debug!(root = %self.root.display(), files = current.len(), "polling baseline recorded");
                Vec::new()
            }
            Some(previous) => diff_tables(previous, &current)
                .into_iter()
                .map(|(path, kind)| ChangeRecord::new(path, kind))
                .collect(),
        };
        self.table = Some(current);
        Ok(records)
    }

    pub fn tracked_files(&self) -> usize {
        self.table.as_ref().map_or(0, |table| table.len())
    }
}

/// Hash every non-ignored regular file and symlink under `root`.
///
/// Symlinks are fingerprinted by their target path, which is what git records
/// for them; they are never followed. Ignored directories are pruned without
/// descending. Subdirectories or files that cannot be read are skipped for
/// this scan; failing to read `root` itself is an error.
pub fn scan_tree(root: &Path, policy: &IgnorePolicy) -> Result<FingerprintTable> {
    let mut table = FingerprintTable::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if dir.as_path() == root => {
                return Err(e).with_context(|| format!("failed to read directory: {}", root.display()));
            }
            Err(e) => {
                trace!(path = %dir.display(), error = %e, "skipping unreadable directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                let name = entry.file_name();
                if policy.is_ignored_dir_name(&name.to_string_lossy()) {
                    trace!(path = %path.display(), "pruning ignored directory");
                    continue;
                }
                pending.push(path);
            } else if file_type.is_file() {
                if policy.should_ignore_under(root, &path) {
                    continue;
                }
                match hash_file(&path) {
                    Ok(hash) => {
                        table.insert(path, hash);
                    }
                    Err(e) => trace!(error = %e, "skipping unreadable file"),
                }
            } else if file_type.is_symlink() {
                if policy.should_ignore_under(root, &path) {
                    continue;
                }
                match fs::read_link(&path) {
                    Ok(target) => {
                        table.insert(path, sha256_hex(target.as_os_str().as_encoded_bytes()));
                    }
                    Err(e) => trace!(error = %e, "skipping unreadable symlink"),
                }
            }
        }
    }

    Ok(table)
}

/// `ChangeSource` that runs a `PollingScanner` every `interval`.
pub struct PollingSource {
    scanner: PollingScanner,
    interval: Duration,
}

impl PollingSource {
    pub fn new(root: PathBuf, policy: Arc<IgnorePolicy>, interval: Duration) -> Self {
        Self { scanner: PollingScanner::new(root, policy), interval }
    }
}

impl ChangeSource for PollingSource {
    fn mode(&self) -> SyncMode {
        SyncMode::Polling
    }

    fn start(
        self: Box<Self>,
        tx: mpsc::Sender<DetectorEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>> {
        let PollingSource { mut scanner, interval } = *self;
        // Baseline now, so changes made right after start are seen by the first poll.
        scanner.scan().context("failed to record polling baseline")?;

        Ok(tokio::spawn(async move {
            debug!(interval_secs = interval.as_secs_f64(), "polling detector started");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => {
                        debug!("polling detector stopping");
                        return;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }

                scanner = match scan_once(scanner, &tx).await {
                    Some(scanner) => scanner,
                    None => return,
                };
            }
        }))
    }
}

/// One scan on the blocking pool. Returns the scanner back, or None when the
/// detector should stop (fatal scan error or receiver gone).
async fn scan_once(
    mut scanner: PollingScanner,
    tx: &mpsc::Sender<DetectorEvent>,
) -> Option<PollingScanner> {
    let joined = tokio::task::spawn_blocking(move || {
        let result = scanner.scan();
        (scanner, result)
    })
    .await;

    let (scanner, result) = match joined {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "polling scan task failed");
            let _ = tx.send(DetectorEvent::Failed(format!("polling scan task failed: {e}"))).await;
            return None;
        }
    };

    match result {
        Ok(records) => {
            if !records.is_empty() {
                debug!(changes = records.len(), "polling scan found changes");
            }
            for record in records {
                if tx.send(DetectorEvent::Changed(record)).await.is_err() {
                    debug!("detector channel closed, stopping polling");
                    return None;
                }
            }
            Some(scanner)
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "polling scan failed");
            let _ = tx.send(DetectorEvent::Failed(format!("{e:#}"))).await;
            None
        }
    }
}
