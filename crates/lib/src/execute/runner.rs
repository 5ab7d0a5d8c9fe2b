//! Child process execution.
//!
//! Every compile, link, bootstrap and external-tool invocation goes through a
//! [`CommandRunner`], so the driver can be exercised without a real toolchain.

use std::future::Future;
use std::io;

use tracing::{debug, trace};

use crate::toolchain::Command;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  /// Exit code, `None` if the process was terminated by a signal.
  pub status: Option<i32>,
  pub success: bool,
  pub stdout: String,
  pub stderr: String,
}

pub trait CommandRunner: Send + Sync + 'static {
  /// Run `command` to completion. An `Err` means the process could not be
  /// spawned; a non-zero exit is reported through [`CommandOutput::success`].
  fn run(&self, command: &Command) -> impl Future<Output = io::Result<CommandOutput>> + Send;
}

/// Runs commands as child processes with `tokio::process`.
///
/// Environment overrides are layered on top of the inherited environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
  async fn run(&self, command: &Command) -> io::Result<CommandOutput> {
    debug!(command = %command, cwd = ?command.cwd, "spawning process");

    let mut child = tokio::process::Command::new(&command.program);
    child.args(&command.args).envs(&command.env);
    if let Some(cwd) = &command.cwd {
      child.current_dir(cwd);
    }

    let output = child.output().await?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !stderr.is_empty() {
      trace!(stderr = %stderr, "command stderr");
    }

    Ok(CommandOutput {
      status: output.status.code(),
      success: output.status.success(),
      stdout,
      stderr,
    })
  }
}
