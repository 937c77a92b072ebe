// Debounce gate: coalesces bursts of change records into a single sync trigger.
//
// A window opens with the first accepted record and closes `quiet` later; all
// paths seen in between ride on the same trigger. Records arriving less than
// `quiet` after the last successful sync are dropped from triggering. The
// file change itself is not lost: the next sync stages every outstanding
// working-tree difference regardless of which record triggered it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::trace;

use super::{ChangeKind, ChangeRecord};

/// Default quiet interval.
pub const DEFAULT_QUIET_SECS: u64 = 5;

/// Configuration for the debounce gate.
#[derive(Debug, Clone)]
pub struct DebounceConfig {
    pub quiet: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { quiet: Duration::from_secs(DEFAULT_QUIET_SECS) }
    }
}

impl DebounceConfig {
    pub fn with_quiet(quiet: Duration) -> Self {
        Self { quiet }
    }
}

/// What produced a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// A change detector, after the debounce window closed.
    Detector,
    /// An explicit request from the front end.
    Manual,
}

/// "Run a sync now", with the paths that caused it (sorted, de-duplicated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTrigger {
    pub source: TriggerSource,
    pub paths: Vec<PathBuf>,
}

impl SyncTrigger {
    pub fn manual() -> Self {
        Self { source: TriggerSource::Manual, paths: Vec::new() }
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }
}

/// Single-consumer debounce state. Owned by the sync loop.
pub struct DebounceGate {
    config: DebounceConfig,
    window_opened_at: Option<Instant>,
    pending: BTreeMap<PathBuf, ChangeKind>,
    last_sync_at: Option<Instant>,
    suppressed: u64,
}

impl DebounceGate {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            window_opened_at: None,
            pending: BTreeMap::new(),
            last_sync_at: None,
            suppressed: 0,
        }
    }

    /// Offer a record to the gate. Returns false when it was dropped because a
    /// sync completed less than one quiet interval ago.
    pub fn push(&mut self, record: ChangeRecord) -> bool {
        self.push_at(record, Instant::now())
    }

    /// Like `push` but with a specific timestamp (for testing).
    pub fn push_at(&mut self, record: ChangeRecord, now: Instant) -> bool {
        if self.in_cooldown(now) {
            self.suppressed += 1;
            trace!(path = %record.path.display(), "change within debounce interval of last sync, not triggering");
            return false;
        }

        self.window_opened_at.get_or_insert(now);
        // Last kind wins for the same path.
        self.pending.insert(record.path, record.kind);
        true
    }

    /// Take the trigger if the current window has closed.
    pub fn take_ready(&mut self) -> Option<SyncTrigger> {
        self.take_ready_at(Instant::now())
    }

    /// Like `take_ready` but with a specific timestamp (for testing).
    pub fn take_ready_at(&mut self, now: Instant) -> Option<SyncTrigger> {
        let deadline = self.next_deadline()?;
        if now < deadline {
            return None;
        }

        self.window_opened_at = None;
        let paths = std::mem::take(&mut self.pending).into_keys().collect();
        Some(SyncTrigger { source: TriggerSource::Detector, paths })
    }

    /// Record that a sync finished successfully; starts the cooldown.
    pub fn mark_synced(&mut self) {
        self.mark_synced_at(Instant::now());
    }

    /// Like `mark_synced` but with a specific timestamp (for testing).
    pub fn mark_synced_at(&mut self, now: Instant) {
        self.last_sync_at = Some(now);
    }

    /// When the open window closes, or None if no window is open.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.window_opened_at.map(|opened| opened + self.config.quiet)
    }

    /// Number of distinct paths waiting in the open window.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Records dropped because they arrived during the post-sync cooldown.
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed
    }

    fn in_cooldown(&self, now: Instant) -> bool {
        match self.last_sync_at {
            Some(last) => now
                .checked_duration_since(last)
                .map_or(true, |elapsed| elapsed < self.config.quiet),
            None => false,
        }
    }
}
