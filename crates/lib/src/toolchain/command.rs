//! Structured command invocations.
//!
//! A [`Command`] is synthesized once and then rendered or executed by a
//! single adapter, so tests can assert on its structure.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::env::ToolchainEnvironment;

/// A literal program invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Command {
  pub program: String,
  pub args: Vec<String>,
  /// Environment overrides layered on top of the ambient environment.
  pub env: BTreeMap<String, String>,
  pub cwd: Option<PathBuf>,
}

impl Command {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      ..Self::default()
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn path_arg(self, path: &Path) -> Self {
    self.arg(path.to_string_lossy())
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  /// Attach every variable of a toolchain environment as an override.
  pub fn toolchain_env(mut self, env: &ToolchainEnvironment) -> Self {
    for (key, value) in env.iter() {
      self.env.insert(key.to_string(), value.to_string());
    }
    self
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cwd = Some(dir.into());
    self
  }
}

fn quote(arg: &str) -> String {
  if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"') {
    format!("\"{}\"", arg.replace('"', "\\\""))
  } else {
    arg.to_string()
  }
}

/// Renders the command line only; environment overrides are not shown.
impl fmt::Display for Command {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", quote(&self.program))?;
    for arg in &self.args {
      write!(f, " {}", quote(arg))?;
    }
    Ok(())
  }
}
