//! Subprocess execution with captured output.
//!
//! `ProcessRunner` is the seam between command assembly and the OS so the
//! native build can be exercised against a fake runner.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

use crate::error::{Result, ToolchainError};

/// Outcome of a finished subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, or `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a program to completion and captures its output.
pub trait ProcessRunner {
    fn run(&self, program: &Path, args: &[OsString], cwd: Option<&Path>) -> Result<ProcessOutput>;
}

/// Runs commands with `std::process::Command`, blocking until exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[OsString], cwd: Option<&Path>) -> Result<ProcessOutput> {
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|e| ToolchainError::Spawn {
            program: program.to_path_buf(),
            source: e,
        })?;

        Ok(ProcessOutput {
            status: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Renders an argv for display, quoting arguments that contain spaces.
pub fn display_command(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(|a| a.as_os_str()))
        .map(|part| {
            let s = part.to_string_lossy();
            if s.contains(' ') {
                format!("\"{s}\"")
            } else {
                s.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
