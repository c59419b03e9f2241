// Process execution seam - the orchestrator never hard-codes std::process.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, ExternalCommandFailedDetails, Result};
use crate::utils::shell;

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

/// One external command invocation.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: None,
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Shell-pasteable rendering, used in logs and error details.
    pub fn command_line(&self) -> String {
        shell::render_command_line(&self.program, &self.args)
    }
}

/// Runs external commands. The production impl shells out; tests substitute
/// a scripted recorder so step sequencing can be asserted without side effects.
pub trait ProcessRunner {
    fn run(&self, request: &RunRequest) -> Result<RunOutput>;

    /// Run a command and fail with the command's own exit status if it does.
    fn check_run(&self, request: &RunRequest) -> Result<RunOutput> {
        let output = self.run(request)?;
        if output.success {
            return Ok(output);
        }
        Err(Error::external_command_failed(
            ExternalCommandFailedDetails {
                command: request.command_line(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            },
        ))
    }
}

/// Default runner backed by `std::process::Command`.
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, request: &RunRequest) -> Result<RunOutput> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);
        if let Some(dir) = &request.cwd {
            cmd.current_dir(dir);
        }

        let out = cmd.output().map_err(|e| {
            Error::internal_io(
                format!("Failed to run {}: {}", request.command_line(), e),
                Some(request.program.clone()),
            )
        })?;

        Ok(RunOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            exit_code: out.status.code().unwrap_or(-1),
            success: out.status.success(),
        })
    }
}
