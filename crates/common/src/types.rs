// Core domain types shared by the engine and any front end.

use serde::{Deserialize, Serialize};

/// How the engine detects changes in the working tree.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Live filesystem notifications (inotify/fsevents/ReadDirectoryChangesW).
    #[default]
    Event,
    /// Periodic full-tree re-hash.
    Polling,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Event => write!(f, "event"),
            Self::Polling => write!(f, "polling"),
        }
    }
}

impl std::str::FromStr for SyncMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "event" | "events" | "watch" => Ok(Self::Event),
            "poll" | "polling" => Ok(Self::Polling),
            other => Err(format!("unknown sync mode `{other}` (expected `event` or `polling`)")),
        }
    }
}

/// Orchestrator step that produced an `OperationFailed` outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Status,
    Stage,
    Commit,
    Push,
    /// The sync task itself aborted before reaching a terminal state.
    Internal,
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Status => "status",
            Self::Stage => "stage",
            Self::Commit => "commit",
            Self::Push => "push",
            Self::Internal => "internal",
        };
        f.write_str(label)
    }
}

/// Why a push could not be completed after recovery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureHint {
    /// The remote refused our credentials (missing SSH key, bad token, ...).
    Credentials,
    /// Network failure, diverged history that could not be rebased, or any
    /// other remote-side problem.
    Remote,
}

impl FailureHint {
    /// Short human-readable advice for the front end.
    pub fn advice(self) -> &'static str {
        match self {
            Self::Credentials => {
                "check that an SSH key is loaded in ssh-agent, or switch the remote to HTTPS \
                 with a credential helper"
            }
            Self::Remote => "check network connectivity and the remote branch, then sync again",
        }
    }
}

/// Terminal result of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Working tree was clean (or someone else committed first).
    NoChanges,
    /// Changes committed; pushing is disabled.
    Committed,
    CommittedAndPushed,
    /// First push was rejected; rebase-pull and retry succeeded.
    PushRejectedRecovered,
    /// Push was rejected and recovery did not succeed. Needs a human.
    PushRejectedUnrecovered { hint: FailureHint, diagnostic: String },
    OperationFailed { stage: SyncStage, reason: String },
}

impl SyncOutcome {
    /// True when the run left the repository in the state the engine wanted:
    /// either nothing to do, or local commits are where they should be.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::NoChanges
                | Self::Committed
                | Self::CommittedAndPushed
                | Self::PushRejectedRecovered
        )
    }

    /// Short label used in logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoChanges => "no_changes",
            Self::Committed => "committed",
            Self::CommittedAndPushed => "committed_and_pushed",
            Self::PushRejectedRecovered => "push_rejected_recovered",
            Self::PushRejectedUnrecovered { .. } => "push_rejected_unrecovered",
            Self::OperationFailed { .. } => "operation_failed",
        }
    }
}
