// Sync orchestrator: turns one trigger into status → add → commit → push,
// with a single stash/rebase-pull/retry pass when the push is rejected.
//
// Every run ends in a `SyncOutcome`; nothing here panics or returns an error.
// Cleanup steps (stash pop, rebase abort) are best-effort and only logged.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use autosync_common::types::{SyncOutcome, SyncStage};

use super::hint::classify_failure;
use super::message::{compose_commit_message, preview_paths};
use super::worker::{CommandExecutor, GitWorker, GitWorkerError, ProcessCommandExecutor, PushTarget};
use crate::watcher::debounce::SyncTrigger;

const NOTHING_TO_COMMIT: &str = "nothing to commit";
const NO_LOCAL_CHANGES: &str = "No local changes to save";
const STASH_LABEL_PREFIX: &str = "autosync";

/// What to do after a successful commit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PushPolicy {
    /// Commit locally only.
    Disabled,
    /// Push; on rejection stash, `pull --rebase`, and retry once.
    #[default]
    AutoRebase,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub commit_prefix: String,
    pub target: PushTarget,
    pub push_policy: PushPolicy,
}

pub struct SyncOrchestrator<E = ProcessCommandExecutor> {
    worker: GitWorker<E>,
    settings: SyncSettings,
}

impl<E: CommandExecutor> SyncOrchestrator<E> {
    pub fn new(worker: GitWorker<E>, settings: SyncSettings) -> Self {
        Self { worker, settings }
    }

    pub fn worker(&self) -> &GitWorker<E> {
        &self.worker
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run one sync, stamping the commit with local time.
    pub fn run(&self, trigger: &SyncTrigger) -> SyncOutcome {
        self.run_at(trigger, &Local::now())
    }

    /// Like `run` but with a specific commit timestamp (for testing).
    pub fn run_at<Tz>(&self, trigger: &SyncTrigger, at: &DateTime<Tz>) -> SyncOutcome
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let status = match self.worker.status() {
            Ok(output) => output,
            Err(error) => return operation_failed(SyncStage::Status, &error),
        };
        if status.stdout.trim().is_empty() {
            debug!(repo = %self.worker.repo_path().display(), "working tree clean, nothing to sync");
            return SyncOutcome::NoChanges;
        }

        if let Err(error) = self.worker.add_all() {
            return operation_failed(SyncStage::Stage, &error);
        }

        let message = compose_commit_message(&self.settings.commit_prefix, &trigger.paths, at);
        match self.worker.commit(&message) {
            Ok(output) if output.mentions(NOTHING_TO_COMMIT) => {
                debug!("commit reported nothing to commit");
                return SyncOutcome::NoChanges;
            }
            Ok(_) => {
                info!(
                    message = %message,
                    paths = %preview_paths(&trigger.paths),
                    "committed changes"
                );
            }
            Err(error) if error.mentions(NOTHING_TO_COMMIT) => {
                debug!("commit reported nothing to commit");
                return SyncOutcome::NoChanges;
            }
            Err(error) => return operation_failed(SyncStage::Commit, &error),
        }

        if self.settings.push_policy == PushPolicy::Disabled {
            debug!("push disabled, keeping commit local");
            return SyncOutcome::Committed;
        }

        match self.worker.push(&self.settings.target) {
            Ok(_) => {
                info!(target = %self.settings.target, "pushed");
                SyncOutcome::CommittedAndPushed
            }
            Err(error) => {
                warn!(
                    target = %self.settings.target,
                    error = %error,
                    "push rejected, attempting stash and rebase pull"
                );
                self.recover_and_retry_push()
            }
        }
    }

    fn recover_and_retry_push(&self) -> SyncOutcome {
        let target = &self.settings.target;
        let stashed = self.stash_if_dirty();

        let pull = self.worker.pull_rebase(target);
        if let Err(error) = &pull {
            warn!(error = %error, "pull --rebase failed");
            self.abort_rebase_if_in_progress();
        }

        if stashed {
            if let Err(error) = self.worker.stash_pop() {
                warn!(error = %error, "failed to restore stashed changes; they remain in `git stash list`");
            }
        }

        if let Err(error) = pull {
            return push_unrecovered(&error);
        }

        match self.worker.push(target) {
            Ok(_) => {
                info!(target = %target, "push succeeded after rebase pull");
                SyncOutcome::PushRejectedRecovered
            }
            Err(error) => push_unrecovered(&error),
        }
    }

    /// Leave no half-applied rebase behind, or the next sync would stage the
    /// conflict markers. When git cannot say, abort anyway.
    fn abort_rebase_if_in_progress(&self) {
        let in_progress = self.worker.rebase_in_progress().unwrap_or_else(|error| {
            warn!(error = %error, "could not resolve rebase state, attempting abort");
            true
        });
        if !in_progress {
            return;
        }
        if let Err(error) = self.worker.rebase_abort() {
            warn!(error = %error, "failed to abort half-applied rebase");
        }
    }

    /// Set aside anything that appeared after our commit. Returns true only
    /// when a stash entry was actually created.
    fn stash_if_dirty(&self) -> bool {
        let status = match self.worker.status() {
            Ok(output) => output,
            Err(error) => {
                warn!(error = %error, "status before stash failed, pulling without stash");
                return false;
            }
        };
        if status.stdout.trim().is_empty() {
            return false;
        }

        let label = format!("{STASH_LABEL_PREFIX}-{}", Uuid::new_v4());
        match self.worker.stash_push(&label) {
            Ok(output) if output.mentions(NO_LOCAL_CHANGES) => false,
            Ok(_) => {
                debug!(label = %label, "stashed local changes");
                true
            }
            Err(error) => {
                warn!(error = %error, "stash failed, pulling without stash");
                false
            }
        }
    }
}

fn operation_failed(stage: SyncStage, error: &GitWorkerError) -> SyncOutcome {
    warn!(stage = %stage, error = %error, "sync step failed");
    SyncOutcome::OperationFailed { stage, reason: error.to_string() }
}

fn push_unrecovered(error: &GitWorkerError) -> SyncOutcome {
    let diagnostic = error.diagnostic().to_string();
    let hint = classify_failure(&diagnostic);
    warn!(hint = ?hint, diagnostic = %diagnostic, "push could not be recovered");
    SyncOutcome::PushRejectedUnrecovered { hint, diagnostic }
}
