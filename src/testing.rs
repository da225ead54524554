//! Test doubles shared by the unit tests.

use crate::error::ToolError;
use crate::pipeline::shell::{Executor, ToolOutput};
use std::sync::{Arc, Mutex};

/// Records every command instead of running it.
///
/// Commands containing any of the `fail_on` fragments exit with status 1;
/// `stdout` is returned for every other command.
#[derive(Default)]
pub struct RecordingExecutor {
    commands: Mutex<Vec<String>>,
    fail_on: Vec<String>,
    stdout: String,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_on(fragments: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            fail_on: fragments.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn with_stdout(stdout: &str) -> Arc<Self> {
        Arc::new(Self {
            stdout: stdout.to_string(),
            ..Self::default()
        })
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl Executor for RecordingExecutor {
    fn execute(&self, command: &str) -> Result<ToolOutput, ToolError> {
        self.commands.lock().unwrap().push(command.to_string());
        if self.fail_on.iter().any(|f| command.contains(f.as_str())) {
            return Err(ToolError::NonZeroExit {
                command: command.to_string(),
                code: Some(1),
                stderr: "simulated failure".to_string(),
            });
        }
        Ok(ToolOutput {
            stdout: self.stdout.clone(),
            stderr: String::new(),
        })
    }
}
