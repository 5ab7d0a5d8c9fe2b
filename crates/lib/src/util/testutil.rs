//! Test utilities for kiln-lib.
//!
//! Cross-platform shell helpers plus [`RecordingRunner`], a [`CommandRunner`]
//! that records every command and fabricates the files a compiler, linker or
//! archiver would have written.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::execute::{CommandOutput, CommandRunner};
use crate::toolchain::Command;

/// Returns the shell command and args to echo an environment variable.
#[cfg(unix)]
pub fn shell_echo_env(var: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), format!("echo \"${}\"", var)])
}

#[cfg(windows)]
pub fn shell_echo_env(var: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), format!("echo %{}%", var)])
}

/// Returns the shell command and args to execute a shell script.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), script.to_string()])
}

/// Returns the command and args to echo a message.
#[cfg(unix)]
pub fn echo_msg(msg: &str) -> (&'static str, Vec<String>) {
  ("/bin/echo", vec![msg.to_string()])
}

#[cfg(windows)]
pub fn echo_msg(msg: &str) -> (&'static str, Vec<String>) {
  ("cmd.exe", vec!["/C".to_string(), format!("echo {}", msg)])
}

/// Records commands instead of running them.
///
/// Output files named by the usual flags (`-o`, `/Fo`, `/OUT:`, `ar rcs`) are
/// created empty. Commands whose rendering contains a `fail_on` pattern exit
/// with status 1 and create nothing.
#[derive(Debug, Default)]
pub struct RecordingRunner {
  commands: Mutex<Vec<Command>>,
  failures: Vec<String>,
  creates: Vec<(String, PathBuf)>,
  stdout: String,
}

impl RecordingRunner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_stdout(mut self, stdout: &str) -> Self {
    self.stdout = stdout.to_string();
    self
  }

  pub fn fail_on(mut self, pattern: &str) -> Self {
    self.failures.push(pattern.to_string());
    self
  }

  /// Create `path` whenever a command containing `pattern` succeeds.
  pub fn creating(mut self, pattern: &str, path: impl Into<PathBuf>) -> Self {
    self.creates.push((pattern.to_string(), path.into()));
    self
  }

  pub fn commands(&self) -> Vec<Command> {
    self.commands.lock().unwrap().clone()
  }

  pub fn rendered(&self) -> Vec<String> {
    self.commands().iter().map(ToString::to_string).collect()
  }

  /// Rendered commands whose program is `program`.
  pub fn invocations_of(&self, program: &str) -> Vec<String> {
    self
      .commands()
      .iter()
      .filter(|c| c.program == program)
      .map(ToString::to_string)
      .collect()
  }
}

fn declared_outputs(command: &Command) -> Vec<PathBuf> {
  let mut outputs = Vec::new();
  let mut args = command.args.iter().peekable();
  if command.program.ends_with("ar") && args.peek().map(|a| a.as_str()) == Some("rcs") {
    args.next();
    if let Some(archive) = args.next() {
      outputs.push(PathBuf::from(archive));
    }
    return outputs;
  }
  while let Some(arg) = args.next() {
    if arg == "-o" {
      if let Some(path) = args.next() {
        outputs.push(PathBuf::from(path));
      }
    } else if let Some(path) = ["/Fo", "/Fi", "/OUT:", "/IMPLIB:"]
      .iter()
      .find_map(|prefix| arg.strip_prefix(prefix))
    {
      outputs.push(PathBuf::from(path));
    }
  }
  outputs
}

fn touch(path: &Path) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, b"")
}

impl CommandRunner for RecordingRunner {
  async fn run(&self, command: &Command) -> io::Result<CommandOutput> {
    let rendered = command.to_string();
    self.commands.lock().unwrap().push(command.clone());

    if self.failures.iter().any(|p| rendered.contains(p.as_str())) {
      return Ok(CommandOutput {
        status: Some(1),
        success: false,
        stdout: String::new(),
        stderr: format!("error: {}", rendered),
      });
    }

    for path in declared_outputs(command) {
      touch(&path)?;
    }
    for (pattern, path) in &self.creates {
      if rendered.contains(pattern.as_str()) {
        touch(path)?;
      }
    }

    Ok(CommandOutput {
      status: Some(0),
      success: true,
      stdout: self.stdout.clone(),
      stderr: String::new(),
    })
  }
}
