use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl GitCommandOutput {
    /// Case-insensitive search across both streams; git prints some
    /// markers (e.g. `nothing to commit`) to either one.
    pub fn mentions(&self, marker: &str) -> bool {
        let marker = marker.to_lowercase();
        self.stdout.to_lowercase().contains(&marker) || self.stderr.to_lowercase().contains(&marker)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitWorkerError {
    SpawnFailed { command: String, message: String },
    CommandFailed { command: String, code: Option<i32>, stdout: String, stderr: String },
}

impl GitWorkerError {
    /// The text most useful to a human: stderr, or stdout when git wrote the
    /// explanation there (e.g. `nothing to commit`).
    pub fn diagnostic(&self) -> &str {
        match self {
            GitWorkerError::SpawnFailed { message, .. } => message,
            GitWorkerError::CommandFailed { stdout, stderr, .. } => {
                if stderr.trim().is_empty() {
                    stdout.trim()
                } else {
                    stderr.trim()
                }
            }
        }
    }

    /// Case-insensitive search across every captured stream.
    pub fn mentions(&self, marker: &str) -> bool {
        let marker = marker.to_lowercase();
        match self {
            GitWorkerError::SpawnFailed { message, .. } => message.to_lowercase().contains(&marker),
            GitWorkerError::CommandFailed { stdout, stderr, .. } => {
                stdout.to_lowercase().contains(&marker) || stderr.to_lowercase().contains(&marker)
            }
        }
    }
}

impl Display for GitWorkerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GitWorkerError::SpawnFailed { command, message } => {
                write!(f, "failed to run `{command}`: {message}")
            }
            GitWorkerError::CommandFailed { command, code, .. } => {
                write!(f, "`{command}` failed with code {:?}: {}", code, self.diagnostic())
            }
        }
    }
}

impl Error for GitWorkerError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            // Never block on an interactive credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Where `git push` / `git pull --rebase` point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushTarget {
    /// Whatever the current branch's configured upstream is.
    Upstream,
    /// An explicit remote and branch, e.g. `origin main`.
    Branch { remote: String, branch: String },
}

impl PushTarget {
    fn args(&self) -> Vec<String> {
        match self {
            PushTarget::Upstream => Vec::new(),
            PushTarget::Branch { remote, branch } => vec![remote.clone(), branch.clone()],
        }
    }
}

impl Display for PushTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PushTarget::Upstream => write!(f, "upstream"),
            PushTarget::Branch { remote, branch } => write!(f, "{remote}/{branch}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GitWorker<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    executor: E,
}

impl GitWorker<ProcessCommandExecutor> {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self { repo_path: repo_path.into(), executor: ProcessCommandExecutor }
    }
}

impl<E: CommandExecutor> GitWorker<E> {
    pub fn with_executor(repo_path: impl Into<PathBuf>, executor: E) -> Self {
        Self { repo_path: repo_path.into(), executor }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Machine-readable status; empty stdout means a clean tree.
    pub fn status(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["status".to_string(), "--porcelain".to_string()])
    }

    /// Stage everything: modifications, deletions and untracked files.
    pub fn add_all(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["add".to_string(), "-A".to_string()])
    }

    pub fn commit(&self, message: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["commit".to_string(), "-m".to_string(), message.to_string()])
    }

    pub fn push(&self, target: &PushTarget) -> Result<GitCommandOutput, GitWorkerError> {
        let mut args = vec!["push".to_string()];
        args.extend(target.args());
        self.run(args)
    }

    pub fn pull_rebase(&self, target: &PushTarget) -> Result<GitCommandOutput, GitWorkerError> {
        let mut args = vec!["pull".to_string(), "--rebase".to_string()];
        args.extend(target.args());
        self.run(args)
    }

    /// Stash tracked and untracked changes under `label`.
    pub fn stash_push(&self, label: &str) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec![
            "stash".to_string(),
            "push".to_string(),
            "--include-untracked".to_string(),
            "-m".to_string(),
            label.to_string(),
        ])
    }

    pub fn stash_pop(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["stash".to_string(), "pop".to_string()])
    }

    pub fn rebase_abort(&self) -> Result<GitCommandOutput, GitWorkerError> {
        self.run(vec!["rebase".to_string(), "--abort".to_string()])
    }

    /// Resolve paths inside the git directory via `git rev-parse --git-path`.
    /// Linked worktrees and submodules keep `.git` as a file pointing
    /// elsewhere, so these cannot be joined onto `<repo>/.git` by hand.
    pub fn git_paths(&self, names: &[&str]) -> Result<Vec<PathBuf>, GitWorkerError> {
        let mut args = vec!["rev-parse".to_string()];
        for name in names {
            args.push("--git-path".to_string());
            args.push(name.to_string());
        }
        let output = self.run(args)?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let path = PathBuf::from(line);
                if path.is_absolute() {
                    path
                } else {
                    self.repo_path.join(path)
                }
            })
            .collect())
    }

    /// True when a failed `pull --rebase` left a rebase half-applied.
    pub fn rebase_in_progress(&self) -> Result<bool, GitWorkerError> {
        let markers = self.git_paths(&["rebase-merge", "rebase-apply"])?;
        Ok(markers.iter().any(|path| path.exists()))
    }

    fn run(&self, args: Vec<String>) -> Result<GitCommandOutput, GitWorkerError> {
        let command = format!("git {}", args.join(" "));
        let result = self.executor.execute("git", &args, &self.repo_path).map_err(|error| {
            GitWorkerError::SpawnFailed { command: command.clone(), message: error.to_string() }
        })?;

        if result.success {
            return Ok(GitCommandOutput { stdout: result.stdout, stderr: result.stderr });
        }

        Err(GitWorkerError::CommandFailed {
            command,
            code: result.code,
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }
}
