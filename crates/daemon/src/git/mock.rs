// Scripted `CommandExecutor` for unit tests: records every invocation and
// replays canned results in order.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::worker::{CommandExecutor, CommandResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

#[derive(Clone, Default)]
pub(crate) struct MockExecutor {
    calls: Arc<Mutex<Vec<Invocation>>>,
    responses: Arc<Mutex<VecDeque<Result<CommandResult, std::io::Error>>>>,
}

impl MockExecutor {
    pub fn new(responses: Vec<Result<CommandResult, std::io::Error>>) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().expect("mock calls lock poisoned").clone()
    }

    /// Each invocation's arguments joined by spaces, e.g. `"status --porcelain"`.
    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.args.join(" ")).collect()
    }

    pub fn count(&self, command_prefix: &str) -> usize {
        self.commands().iter().filter(|command| command.starts_with(command_prefix)).count()
    }
}

impl CommandExecutor for MockExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        self.calls.lock().expect("mock calls lock poisoned").push(Invocation {
            program: program.to_string(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
        });

        self.responses
            .lock()
            .expect("mock responses lock poisoned")
            .pop_front()
            .expect("missing mock response")
    }
}

pub(crate) fn ok(stdout: &str) -> Result<CommandResult, std::io::Error> {
    Ok(CommandResult { success: true, code: Some(0), stdout: stdout.to_string(), stderr: String::new() })
}

pub(crate) fn fail(code: i32, stderr: &str) -> Result<CommandResult, std::io::Error> {
    Ok(CommandResult {
        success: false,
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    })
}

pub(crate) fn fail_stdout(code: i32, stdout: &str) -> Result<CommandResult, std::io::Error> {
    Ok(CommandResult {
        success: false,
        code: Some(code),
        stdout: stdout.to_string(),
        stderr: String::new(),
    })
}
