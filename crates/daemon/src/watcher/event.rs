// Event-driven detector: OS-native notifications (inotify/fsevents/
// ReadDirectoryChangesW) translated into `ChangeRecord`s.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use autosync_common::ignore::IgnorePolicy;
use autosync_common::types::SyncMode;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use super::{ChangeKind, ChangeRecord, ChangeSource, DetectorEvent, EVENT_CHANNEL_CAPACITY};

/// Watches a repository recursively. Events flow until the watcher is dropped.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Start watching `root`, returning the watcher and a fresh receiver.
    pub fn start(
        root: &Path,
        policy: Arc<IgnorePolicy>,
    ) -> Result<(Self, mpsc::Receiver<DetectorEvent>)> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let watcher = Self::with_sender(root, policy, tx)?;
        Ok((watcher, rx))
    }

    /// Start watching `root`, delivering into an existing channel.
    pub fn with_sender(
        root: &Path,
        policy: Arc<IgnorePolicy>,
        tx: mpsc::Sender<DetectorEvent>,
    ) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize watch root: {}", root.display()))?;

        let root_for_filter = root.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let events = match res {
                Ok(event) => translate_event(&event, &root_for_filter, &policy),
                Err(e) => {
                    error!(error = %e, "file watcher error");
                    vec![DetectorEvent::Failed(format!("file watcher error: {e}"))]
                }
            };
            for event in events {
                if tx.blocking_send(event).is_err() {
                    debug!("event channel closed, stopping event dispatch");
                    return;
                }
            }
        })
        .context("failed to create file watcher")?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch directory: {}", root.display()))?;

        debug!(path = %root.display(), "file watcher started");

        Ok(Self { _watcher: watcher })
    }
}

/// `ChangeSource` wrapper that keeps a `FileWatcher` alive in a task.
pub struct EventSource {
    root: PathBuf,
    policy: Arc<IgnorePolicy>,
}

impl EventSource {
    pub fn new(root: PathBuf, policy: Arc<IgnorePolicy>) -> Self {
        Self { root, policy }
    }
}

impl ChangeSource for EventSource {
    fn mode(&self) -> SyncMode {
        SyncMode::Event
    }

    fn start(
        self: Box<Self>,
        tx: mpsc::Sender<DetectorEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>> {
        let watcher = FileWatcher::with_sender(&self.root, self.policy, tx.clone())?;

        Ok(tokio::spawn(async move {
            let _watcher = watcher;
            tokio::select! {
                _ = shutdown.recv() => debug!("event detector stopping"),
                _ = tx.closed() => debug!("event detector receiver dropped"),
            }
        }))
    }
}

/// Returns true if the path is inside the watched root (guards against symlink escapes).
fn is_inside_root(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Translate a `notify::Event` into zero or more detector events.
/// Paths outside the root or matched by the ignore policy are dropped.
fn translate_event(event: &Event, root: &Path, policy: &IgnorePolicy) -> Vec<DetectorEvent> {
    if event.paths.iter().any(|p| p == root) {
        match event.kind {
            EventKind::Remove(_) => {
                return vec![DetectorEvent::Failed(format!(
                    "watched directory was removed: {}",
                    root.display()
                ))];
            }
            // The watch follows the inode, so events would keep arriving for a
            // path that no longer exists.
            EventKind::Modify(ModifyKind::Name(_)) => {
                return vec![DetectorEvent::Failed(format!(
                    "watched directory was moved: {}",
                    root.display()
                ))];
            }
            _ => {}
        }
    }

    // The backend dropped events (e.g. inotify queue overflow). Anything may
    // have changed, so report the root and let the next sync stage it all.
    if event.need_rescan() {
        warn!(root = %root.display(), "file watcher lost events, scheduling a full sync");
        return vec![DetectorEvent::Changed(ChangeRecord::new(root.to_path_buf(), ChangeKind::Modified))];
    }

    let changes: Vec<(PathBuf, ChangeKind)> = match &event.kind {
        // Git does not track empty directories; files created inside a new
        // directory produce their own events.
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => with_kind(&event.paths, ChangeKind::Created),
        EventKind::Modify(ModifyKind::Metadata(_)) => {
            trace!("skipping metadata-only modify event");
            Vec::new()
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            // [from, to]: one record keyed on the destination.
            RenameMode::Both => event
                .paths
                .last()
                .map(|to| vec![(to.clone(), ChangeKind::Renamed)])
                .unwrap_or_default(),
            RenameMode::To => with_kind(&event.paths, ChangeKind::Renamed),
            RenameMode::From => with_kind(&event.paths, ChangeKind::Deleted),
            // Backends that cannot pair the halves (fsevents) report each side.
            _ => event
                .paths
                .iter()
                .map(|p| {
                    let kind = if p.exists() { ChangeKind::Renamed } else { ChangeKind::Deleted };
                    (p.clone(), kind)
                })
                .collect(),
        },
        EventKind::Modify(_) => with_kind(&event.paths, ChangeKind::Modified),
        EventKind::Remove(_) => with_kind(&event.paths, ChangeKind::Deleted),
        _ => {
            trace!(kind = ?event.kind, "skipping non-content event");
            Vec::new()
        }
    };

    changes
        .into_iter()
        .filter(|(path, _)| {
            if is_inside_root(path, root) {
                true
            } else {
                warn!(path = %path.display(), "ignoring event outside watch root (possible symlink escape)");
                false
            }
        })
        .filter(|(path, _)| !policy.should_ignore_under(root, path))
        .map(|(path, kind)| DetectorEvent::Changed(ChangeRecord::new(path, kind)))
        .collect()
}

fn with_kind(paths: &[PathBuf], kind: ChangeKind) -> Vec<(PathBuf, ChangeKind)> {
    paths.iter().map(|p| (p.clone(), kind)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, DataChange, Flag, MetadataKind, RemoveKind};
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::{timeout, Duration};

    // ── translate_event unit tests ──────────────────────────────────

    fn make_event(kind: EventKind, paths: Vec<PathBuf>) -> Event {
        Event { kind, paths, attrs: Default::default() }
    }

    fn translate(kind: EventKind, paths: &[&str]) -> Vec<DetectorEvent> {
        let event = make_event(kind, paths.iter().map(PathBuf::from).collect());
        translate_event(&event, Path::new("/repo"), &IgnorePolicy::default())
    }

    fn changes(events: Vec<DetectorEvent>) -> Vec<(PathBuf, ChangeKind)> {
        events
            .into_iter()
            .map(|event| match event {
                DetectorEvent::Changed(record) => (record.path, record.kind),
                DetectorEvent::Failed(reason) => panic!("unexpected failure: {reason}"),
            })
            .collect()
    }

    #[test]
    fn create_file_is_created() {
        let result = changes(translate(EventKind::Create(CreateKind::File), &["/repo/src/main.c"]));
        assert_eq!(result, vec![(PathBuf::from("/repo/src/main.c"), ChangeKind::Created)]);
    }

    #[test]
    fn create_folder_is_skipped() {
        assert!(translate(EventKind::Create(CreateKind::Folder), &["/repo/newdir"]).is_empty());
    }

    #[test]
    fn modify_data_is_modified() {
        let result = changes(translate(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/repo/a.c"],
        ));
        assert_eq!(result, vec![(PathBuf::from("/repo/a.c"), ChangeKind::Modified)]);
    }

    #[test]
    fn remove_file_is_deleted() {
        let result = changes(translate(EventKind::Remove(RemoveKind::File), &["/repo/a.c"]));
        assert_eq!(result, vec![(PathBuf::from("/repo/a.c"), ChangeKind::Deleted)]);
    }

    #[test]
    fn rename_both_keys_on_destination() {
        let result = changes(translate(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/repo/old.c", "/repo/new.c"],
        ));
        assert_eq!(result, vec![(PathBuf::from("/repo/new.c"), ChangeKind::Renamed)]);
    }

    #[test]
    fn rename_halves_map_to_deleted_and_renamed() {
        let from = changes(translate(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/repo/old.c"]));
        let to = changes(translate(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/repo/new.c"]));
        assert_eq!(from, vec![(PathBuf::from("/repo/old.c"), ChangeKind::Deleted)]);
        assert_eq!(to, vec![(PathBuf::from("/repo/new.c"), ChangeKind::Renamed)]);
    }

    #[test]
    fn unpaired_rename_of_missing_path_is_deleted() {
        let result = changes(translate(
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
            &["/repo/definitely-not-here.c"],
        ));
        assert_eq!(result, vec![(PathBuf::from("/repo/definitely-not-here.c"), ChangeKind::Deleted)]);
    }

    #[test]
    fn metadata_and_access_events_are_skipped() {
        assert!(translate(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/repo/a.c"]
        )
        .is_empty());
        assert!(translate(EventKind::Access(AccessKind::Any), &["/repo/a.c"]).is_empty());
    }

    #[test]
    fn ignored_paths_are_filtered() {
        let result = changes(translate(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &[
                "/repo/.git/index",
                "/repo/build.log",
                "/repo/.pio/build/firmware.elf",
                "/repo/src/main.c",
            ],
        ));
        assert_eq!(result, vec![(PathBuf::from("/repo/src/main.c"), ChangeKind::Modified)]);
    }

    #[test]
    fn ignore_is_evaluated_relative_to_root() {
        let root = Path::new("/home/me/target/repo");
        let event = make_event(
            EventKind::Create(CreateKind::File),
            vec![PathBuf::from("/home/me/target/repo/main.c")],
        );
        let result = translate_event(&event, root, &IgnorePolicy::default());
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn rejects_outside_root() {
        assert!(translate(EventKind::Create(CreateKind::File), &["/etc/passwd"]).is_empty());
    }

    #[test]
    fn root_removal_is_fatal() {
        let result = translate(EventKind::Remove(RemoveKind::Folder), &["/repo"]);
        assert_eq!(result.len(), 1);
        assert!(matches!(&result[0], DetectorEvent::Failed(reason) if reason.contains("removed")));
    }

    #[test]
    fn root_rename_is_fatal() {
        for mode in [RenameMode::From, RenameMode::Any] {
            let result = translate(EventKind::Modify(ModifyKind::Name(mode)), &["/repo"]);
            assert_eq!(result.len(), 1, "mode {mode:?}");
            assert!(matches!(&result[0], DetectorEvent::Failed(reason) if reason.contains("moved")));
        }
    }

    #[test]
    fn root_content_modify_is_not_fatal() {
        let result = translate(EventKind::Modify(ModifyKind::Data(DataChange::Any)), &["/repo"]);
        assert!(result.iter().all(|event| matches!(event, DetectorEvent::Changed(_))));
    }

    #[test]
    fn rescan_reports_root_as_modified() {
        let event = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        let result = changes(translate_event(&event, Path::new("/repo"), &IgnorePolicy::default()));
        assert_eq!(result, vec![(PathBuf::from("/repo"), ChangeKind::Modified)]);
    }

    #[test]
    fn other_events_without_rescan_are_skipped() {
        assert!(translate(EventKind::Other, &["/repo/a.c"]).is_empty());
    }

    #[test]
    fn inside_root_is_component_aware() {
        let root = Path::new("/repo");
        assert!(is_inside_root(Path::new("/repo/a.c"), root));
        assert!(is_inside_root(Path::new("/repo/sub/a.c"), root));
        assert!(!is_inside_root(Path::new("/repox/a.c"), root));
    }

    // ── Integration tests: actual filesystem ───────────────────────

    async fn next_change(rx: &mut mpsc::Receiver<DetectorEvent>, file_name: &str) -> Option<ChangeRecord> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            match timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(DetectorEvent::Changed(record))) if record.path.ends_with(file_name) => {
                    return Some(record)
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        None
    }

    #[tokio::test]
    async fn watcher_detects_create() {
        let tmp = TempDir::new().unwrap();
        let (watcher, mut rx) = FileWatcher::start(tmp.path(), Arc::new(IgnorePolicy::default())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(tmp.path().join("main.c"), "int main() {}").unwrap();

        let record = next_change(&mut rx, "main.c").await.expect("expected an event for main.c");
        assert!(matches!(record.kind, ChangeKind::Created | ChangeKind::Modified));

        drop(watcher);
    }

    #[tokio::test]
    async fn watcher_detects_delete() {
        let tmp = TempDir::new().unwrap();
        let file_path = tmp.path().join("to_delete.c");
        fs::write(&file_path, "bye").unwrap();

        let (watcher, mut rx) = FileWatcher::start(tmp.path(), Arc::new(IgnorePolicy::default())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::remove_file(&file_path).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut found_delete = false;
        while tokio::time::Instant::now() < deadline {
            match timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(DetectorEvent::Changed(record))) if record.kind == ChangeKind::Deleted => {
                    assert!(record.path.ends_with("to_delete.c"));
                    found_delete = true;
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(found_delete, "expected a Deleted record for to_delete.c");

        drop(watcher);
    }

    #[tokio::test]
    async fn watcher_filters_ignored_paths() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("__pycache__")).unwrap();
        let (watcher, mut rx) = FileWatcher::start(tmp.path(), Arc::new(IgnorePolicy::default())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(tmp.path().join("__pycache__").join("mod.pyc"), "x").unwrap();
        fs::write(tmp.path().join("debug.log"), "x").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        fs::write(tmp.path().join("kept.c"), "x").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while tokio::time::Instant::now() < deadline {
            match timeout(Duration::from_secs(2), rx.recv()).await {
                Ok(Some(DetectorEvent::Changed(record))) => {
                    assert!(
                        record.path.ends_with("kept.c"),
                        "ignored path leaked through: {}",
                        record.path.display()
                    );
                    break;
                }
                Ok(Some(DetectorEvent::Failed(reason))) => panic!("watcher failed: {reason}"),
                _ => panic!("timed out waiting for kept.c"),
            }
        }

        drop(watcher);
    }

    #[tokio::test]
    async fn event_source_stops_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let source = Box::new(EventSource::new(tmp.path().to_path_buf(), Arc::new(IgnorePolicy::default())));
        let handle = source.start(tx, shutdown_rx).unwrap();

        shutdown_tx.send(()).unwrap();
        timeout(Duration::from_secs(2), handle)
            .await
            .expect("detector task should stop promptly")
            .expect("detector task should not panic");
    }

    #[test]
    fn missing_root_fails_to_start() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(FileWatcher::start(&missing, Arc::new(IgnorePolicy::default())).is_err());
    }
}
