// Change detection: notify-based events or periodic re-hashing, both feeding
// the same `DetectorEvent` channel consumed by the sync loop.

pub mod debounce;
pub mod event;
pub mod hash;
pub mod poll;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use autosync_common::ignore::IgnorePolicy;
use autosync_common::types::SyncMode;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub use event::{EventSource, FileWatcher};
pub use poll::{PollingScanner, PollingSource};

/// Capacity for detector → sync loop channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    /// Rename or move, keyed on the destination path.
    Renamed,
}

/// One observed filesystem change under the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub observed_at: Instant,
}

impl ChangeRecord {
    pub fn new(path: PathBuf, kind: ChangeKind) -> Self {
        Self { path, kind, observed_at: Instant::now() }
    }
}

/// What a detector sends to the sync loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEvent {
    Changed(ChangeRecord),
    /// The detector can no longer observe the tree. The loop terminates.
    Failed(String),
}

/// A change detector. Implementations own their background task; it must end
/// when `shutdown` fires or the receiving side of `tx` is dropped.
pub trait ChangeSource: Send {
    fn mode(&self) -> SyncMode;

    /// Establish the subscription (or baseline) and spawn the detector task.
    /// Errors here mean the detector never started.
    fn start(
        self: Box<Self>,
        tx: mpsc::Sender<DetectorEvent>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>>;
}

/// Pick the detector implementation for `mode`.
pub fn source_for(
    mode: SyncMode,
    root: PathBuf,
    policy: Arc<IgnorePolicy>,
    poll_interval: Duration,
) -> Box<dyn ChangeSource> {
    match mode {
        SyncMode::Event => Box::new(EventSource::new(root, policy)),
        SyncMode::Polling => Box::new(PollingSource::new(root, policy, poll_interval)),
    }
}
