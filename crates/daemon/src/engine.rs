// Engine lifecycle: one detector task, one single-consumer sync loop, a
// supervisor that reports abnormal loop exits, and the handle the front end
// holds to stop the engine, request manual syncs, and observe outcomes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use autosync_common::ignore::IgnorePolicy;
use autosync_common::types::{SyncMode, SyncOutcome, SyncStage};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::config::AutosyncConfig;
use crate::git::message::preview_paths;
use crate::git::orchestrator::{PushPolicy, SyncOrchestrator, SyncSettings};
use crate::git::worker::{CommandExecutor, GitWorker, ProcessCommandExecutor, PushTarget};
use crate::startup::{RepositoryHandle, StartupError};
use crate::watcher::debounce::{DebounceConfig, DebounceGate, SyncTrigger, TriggerSource};
use crate::watcher::{source_for, ChangeSource, DetectorEvent, EVENT_CHANNEL_CAPACITY};

/// Buffered engine events per subscriber before it starts lagging.
const ENGINE_EVENT_CAPACITY: usize = 64;

/// Everything `start_engine` needs.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub repository: PathBuf,
    pub mode: SyncMode,
    pub commit_prefix: String,
    pub debounce: Duration,
    pub poll_interval: Duration,
    pub ignore_dirs: Vec<String>,
    pub ignore_suffixes: Vec<String>,
    pub remote: String,
    pub branch: Option<String>,
    pub push_policy: PushPolicy,
}

impl EngineConfig {
    /// Built-in defaults for `repository`.
    pub fn new(repository: impl Into<PathBuf>) -> Self {
        AutosyncConfig::default().into_engine_config(repository.into())
    }

    pub fn ignore_policy(&self) -> IgnorePolicy {
        IgnorePolicy::new(&self.ignore_dirs, &self.ignore_suffixes)
    }

    pub fn push_target(&self) -> PushTarget {
        match &self.branch {
            Some(branch) if !branch.trim().is_empty() => PushTarget::Branch {
                remote: self.remote.clone(),
                branch: branch.trim().to_string(),
            },
            _ => PushTarget::Upstream,
        }
    }

    fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            commit_prefix: self.commit_prefix.clone(),
            target: self.push_target(),
            push_policy: self.push_policy,
        }
    }
}

/// What the engine reports to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// One orchestration run finished (detector-triggered or manual).
    SyncCompleted { source: TriggerSource, paths: Vec<PathBuf>, outcome: SyncOutcome },
    /// The sync loop ended without a stop request; no further automatic
    /// syncs will happen.
    LoopTerminated { reason: String },
}

/// Runs orchestrations one at a time and publishes their outcomes.
struct SyncRunner<E> {
    orchestrator: Arc<SyncOrchestrator<E>>,
    lock: Arc<Mutex<()>>,
    events: broadcast::Sender<EngineEvent>,
}

impl<E: CommandExecutor + 'static> SyncRunner<E> {
    fn new(orchestrator: SyncOrchestrator<E>, events: broadcast::Sender<EngineEvent>) -> Self {
        Self { orchestrator: Arc::new(orchestrator), lock: Arc::new(Mutex::new(())), events }
    }

    async fn run(&self, trigger: SyncTrigger) -> SyncOutcome {
        // The guard moves into the blocking task so the run stays exclusive
        // even if the caller stops waiting for it.
        let guard = Arc::clone(&self.lock).lock_owned().await;
        let source = trigger.source;
        let paths = trigger.paths.clone();
        debug!(source = ?source, paths = %preview_paths(&paths), "sync started");

        let orchestrator = Arc::clone(&self.orchestrator);
        let outcome = match tokio::task::spawn_blocking(move || {
            let _guard = guard;
            orchestrator.run(&trigger)
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "sync task aborted");
                SyncOutcome::OperationFailed {
                    stage: SyncStage::Internal,
                    reason: format!("sync task aborted: {e}"),
                }
            }
        };

        log_outcome(source, &outcome);
        // No subscribers is fine.
        let _ = self.events.send(EngineEvent::SyncCompleted { source, paths, outcome: outcome.clone() });
        outcome
    }
}

fn log_outcome(source: TriggerSource, outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::PushRejectedUnrecovered { hint, diagnostic } => warn!(
            source = ?source,
            hint = ?hint,
            advice = hint.advice(),
            diagnostic = %diagnostic,
            "committed locally but push failed"
        ),
        SyncOutcome::OperationFailed { stage, reason } => {
            warn!(source = ?source, stage = %stage, reason = %reason, "sync failed")
        }
        SyncOutcome::NoChanges => debug!(source = ?source, "sync found no changes"),
        other => info!(source = ?source, outcome = other.kind(), "sync finished"),
    }
}

/// Handle to a running engine. Dropping it stops the engine.
pub struct EngineHandle<E = ProcessCommandExecutor> {
    repository: RepositoryHandle,
    mode: SyncMode,
    runner: Arc<SyncRunner<E>>,
    events: broadcast::Sender<EngineEvent>,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl<E: CommandExecutor + 'static> EngineHandle<E> {
    /// Request a stop. The detector and loop halt promptly; an orchestration
    /// already running finishes first.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Stop and wait for the loop and detector to exit.
    pub async fn wait(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Run a sync now, bypassing the detector and the debounce gate. Waits
    /// for any in-flight run first.
    pub async fn trigger_manual_sync(&self) -> SyncOutcome {
        info!(repo = %self.repository.root().display(), "manual sync requested");
        self.runner.run(SyncTrigger::manual()).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn repository(&self) -> &RepositoryHandle {
        &self.repository
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// False once the loop has exited (stopped or terminated).
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl<E> Drop for EngineHandle<E> {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Validate the repository, start the configured detector, and spawn the
/// sync loop. Must be called from within a tokio runtime.
pub async fn start_engine(config: EngineConfig) -> Result<EngineHandle, StartupError> {
    let repository = RepositoryHandle::open(&config.repository)?;
    let policy = Arc::new(config.ignore_policy());
    let source =
        source_for(config.mode, repository.root().to_path_buf(), policy, config.poll_interval);
    start_with(repository, &config, ProcessCommandExecutor, source)
}

pub(crate) fn start_with<E: CommandExecutor + 'static>(
    repository: RepositoryHandle,
    config: &EngineConfig,
    executor: E,
    source: Box<dyn ChangeSource>,
) -> Result<EngineHandle<E>, StartupError> {
    let (shutdown_tx, _) = broadcast::channel(4);
    let (events_tx, _) = broadcast::channel(ENGINE_EVENT_CAPACITY);
    let (detector_tx, detector_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let mode = source.mode();
    let detector_task =
        source.start(detector_tx, shutdown_tx.subscribe()).map_err(StartupError::Detector)?;

    let worker = GitWorker::with_executor(repository.root(), executor);
    let runner = Arc::new(SyncRunner::new(
        SyncOrchestrator::new(worker, config.sync_settings()),
        events_tx.clone(),
    ));
    let gate = DebounceGate::new(DebounceConfig::with_quiet(config.debounce));

    let loop_task =
        tokio::spawn(sync_loop(Arc::clone(&runner), detector_rx, shutdown_tx.subscribe(), gate));
    let task = tokio::spawn(supervise(loop_task, detector_task, shutdown_tx.clone(), events_tx.clone()));

    info!(
        repo = %repository.root().display(),
        mode = %mode,
        debounce_ms = config.debounce.as_millis() as u64,
        target = %config.push_target(),
        "sync engine started"
    );

    Ok(EngineHandle { repository, mode, runner, events: events_tx, shutdown_tx, task: Some(task) })
}

/// Waits for the loop; reports abnormal exits and makes sure the detector
/// is told to stop either way.
async fn supervise(
    loop_task: JoinHandle<Result<(), String>>,
    detector_task: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
    events: broadcast::Sender<EngineEvent>,
) {
    let failure = match loop_task.await {
        Ok(Ok(())) => None,
        Ok(Err(reason)) => Some(reason),
        Err(e) => Some(format!("sync loop panicked: {e}")),
    };

    if let Some(reason) = failure {
        error!(reason = %reason, "sync loop terminated, automatic syncing has stopped");
        let _ = events.send(EngineEvent::LoopTerminated { reason });
    } else {
        debug!("sync loop stopped");
    }

    let _ = shutdown_tx.send(());
    if let Err(e) = detector_task.await {
        warn!(error = %e, "change detector task ended abnormally");
    }
}

/// Single consumer of detector events. Returns `Err` with a reason when it
/// ends for anything other than a stop request.
async fn sync_loop<E: CommandExecutor + 'static>(
    runner: Arc<SyncRunner<E>>,
    mut detector_rx: mpsc::Receiver<DetectorEvent>,
    mut shutdown: broadcast::Receiver<()>,
    mut gate: DebounceGate,
) -> Result<(), String> {
    loop {
        let deadline = gate.next_deadline();

        tokio::select! {
            biased;
            _ = shutdown.recv() => return Ok(()),
            event = detector_rx.recv() => match event {
                Some(DetectorEvent::Changed(record)) => {
                    trace!(path = %record.path.display(), kind = ?record.kind, "change observed");
                    gate.push(record);
                }
                Some(DetectorEvent::Failed(reason)) => return Err(reason),
                None => return Err("change detector stopped unexpectedly".to_string()),
            },
            _ = sleep_until_deadline(deadline) => {
                if let Some(trigger) = gate.take_ready() {
                    let outcome = runner.run(trigger).await;
                    if outcome.is_success() {
                        gate.mark_synced();
                    }
                }
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
