//! External programs: archiver, parity tool and disc burner
//!
//! Every program is spawned through a `CommandRunner`, and each call
//! blocks until the program exits. Nothing is retried: a half-written
//! redundancy set is not safe to resume automatically.

pub mod archiver;
pub mod burner;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod parity;

pub use archiver::{Archiver, ArchiveMode};
pub use burner::MediaWriter;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockRunner, RecordedCall};
pub use parity::{ParityTool, RepairOutcome};

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// One program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Program name or path
    pub program: String,
    /// Arguments, in order
    pub args: Vec<OsString>,
    /// Working directory
    pub cwd: PathBuf,
    /// Capture stdout instead of passing it through to the terminal
    pub capture: bool,
}

impl ToolCommand {
    /// Command running `program` in `cwd`
    pub fn new(program: impl Into<String>, cwd: &Path) -> Self {
        ToolCommand {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            capture: false,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Capture stdout
    pub fn captured(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Arguments as lossy strings, for logs and tests
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

/// How a program exited
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit status; `None` when killed by a signal
    pub status: Option<i32>,
    /// Captured stdout (empty unless the command asked for capture)
    pub stdout: String,
}

impl ToolOutput {
    /// Successful exit with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        ToolOutput {
            status: Some(0),
            stdout: stdout.into(),
        }
    }

    /// Whether the program exited with status 0
    pub fn succeeded(&self) -> bool {
        self.status == Some(0)
    }

    /// Turn a nonzero exit into `Error::ToolFailed`
    pub fn check(self, tool: &str, context: impl Into<String>) -> Result<Self> {
        if self.succeeded() {
            Ok(self)
        } else {
            Err(Error::ToolFailed {
                tool: tool.to_string(),
                status: self.status,
                context: context.into(),
            })
        }
    }
}

/// Spawns external programs
pub trait CommandRunner {
    /// Run `command` to completion
    ///
    /// A program that starts and exits nonzero is reported through
    /// `ToolOutput::status`, not as an error.
    fn run(&mut self, command: &ToolCommand) -> Result<ToolOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &mut R {
    fn run(&mut self, command: &ToolCommand) -> Result<ToolOutput> {
        (**self).run(command)
    }
}

/// Runs programs as child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a process runner
    pub fn new() -> Self {
        ProcessRunner
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&mut self, command: &ToolCommand) -> Result<ToolOutput> {
        info!(
            "running {} {:?} in {:?}",
            command.program,
            command.arg_strings(),
            command.cwd
        );

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).current_dir(&command.cwd);

        let launch_error = |source| Error::ToolLaunch {
            tool: command.program.clone(),
            source,
        };

        if command.capture {
            let output = cmd
                .stdin(Stdio::inherit())
                .stderr(Stdio::inherit())
                .output()
                .map_err(launch_error)?;
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            for line in stdout.lines() {
                debug!("{}: {}", command.program, line);
            }
            Ok(ToolOutput {
                status: output.status.code(),
                stdout,
            })
        } else {
            let status = cmd.status().map_err(launch_error)?;
            Ok(ToolOutput {
                status: status.code(),
                stdout: String::new(),
            })
        }
    }
}
