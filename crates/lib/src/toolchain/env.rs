//! Toolchain environment cache.
//!
//! Native compiler drivers (MSVC in particular) need a handful of search-path
//! variables that are normally produced by an expensive bootstrap script. The
//! variables are captured once per build type and persisted as
//! `<output_root>/<build_type>/toolchain.env`, then attached to every
//! compile/link command as environment overrides.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::command::Command;
use crate::consts::TOOLCHAIN_ENV_FILE;
use crate::execute::CommandRunner;
use crate::request::BuildType;

/// Variables captured from the bootstrap mechanism.
pub const ALLOWED_VARS: [&str; 4] = ["INCLUDE", "LIB", "LIBPATH", "PATH"];

#[derive(Debug, Error)]
pub enum EnvCacheError {
  #[error("toolchain environment io error: {0}")]
  Io(#[from] io::Error),

  #[error("malformed toolchain environment cache {path}: line {line} is not KEY=value")]
  Malformed { path: PathBuf, line: usize },

  #[error("toolchain environment bootstrap failed: {message}")]
  Bootstrap { message: String },
}

/// How a [`ToolchainEnvironment`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
  /// Loaded from the persisted cache file.
  Hit,
  /// Produced by running the bootstrap mechanism and persisted.
  Miss,
  /// No bootstrap mechanism exists; the ambient environment is used as is.
  Degraded,
}

/// Allow-listed toolchain variables, keyed by canonical (upper case) name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ToolchainEnvironment {
  vars: BTreeMap<String, String>,
}

fn canonical_name(key: &str) -> Option<&'static str> {
  ALLOWED_VARS.iter().copied().find(|name| name.eq_ignore_ascii_case(key))
}

impl ToolchainEnvironment {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.vars.insert(key.into(), value.into());
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.vars.get(key).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize {
    self.vars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vars.is_empty()
  }

  /// Extract the allow-listed variables from an environment dump
  /// (`set` / `env` output). Names match case-insensitively and lines that
  /// are not `KEY=value` (banners, blank lines) are ignored.
  pub fn from_env_dump(dump: &str) -> Self {
    let mut env = Self::new();
    for line in dump.lines() {
      let line = line.trim_end_matches('\r');
      if let Some((key, value)) = line.split_once('=')
        && let Some(name) = canonical_name(key.trim())
      {
        env.insert(name, value);
      }
    }
    env
  }

  /// Parse the cache file format. `path` is only used for error reporting.
  pub fn parse(text: &str, path: &Path) -> Result<Self, EnvCacheError> {
    let mut env = Self::new();
    for (idx, line) in text.lines().enumerate() {
      let line = line.trim_end_matches('\r');
      if line.trim().is_empty() || line.starts_with('#') {
        continue;
      }
      let (key, value) = line.split_once('=').ok_or_else(|| EnvCacheError::Malformed {
        path: path.to_path_buf(),
        line: idx + 1,
      })?;
      env.insert(key, value);
    }
    Ok(env)
  }

  /// Render as sorted `KEY=value` lines. Values spanning lines cannot be
  /// represented and are dropped.
  pub fn render(&self) -> String {
    let mut out = String::new();
    for (key, value) in &self.vars {
      if value.contains('\n') || value.contains('\r') {
        warn!(var = %key, "dropping toolchain variable with multi-line value");
        continue;
      }
      out.push_str(key);
      out.push('=');
      out.push_str(value);
      out.push('\n');
    }
    out
  }

  /// Load a cache file, returning `None` if it does not exist.
  pub fn load(path: &Path) -> Result<Option<Self>, EnvCacheError> {
    match std::fs::read_to_string(path) {
      Ok(text) => Self::parse(&text, path).map(Some),
      Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(err) => Err(err.into()),
    }
  }

  pub fn save(&self, path: &Path) -> Result<(), EnvCacheError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, self.render())?;
    Ok(())
  }
}

/// A toolchain environment together with how it was obtained.
#[derive(Debug, Clone)]
pub struct ResolvedEnvironment {
  pub env: ToolchainEnvironment,
  pub status: CacheStatus,
}

/// The platform's environment bootstrap mechanism.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvBootstrap {
  /// The bootstrap script (`vcvarsall.bat`), if one was found.
  pub script: Option<PathBuf>,
  /// Architecture argument passed to the script (`x64`, `arm64`).
  pub arch: String,
}

impl EnvBootstrap {
  /// Find the bootstrap script: `KILN_VCVARS` first, then (on Windows) the
  /// latest Visual Studio installation reported by `vswhere`.
  pub async fn locate(arch: impl Into<String>) -> Self {
    let arch = arch.into();
    if let Ok(script) = std::env::var("KILN_VCVARS")
      && !script.is_empty()
    {
      return Self {
        script: Some(PathBuf::from(script)),
        arch,
      };
    }
    Self {
      script: find_vcvarsall().await,
      arch,
    }
  }

  /// The command that runs the script and dumps the resulting environment.
  pub fn command(&self) -> Option<Command> {
    let script = self.script.as_ref()?;
    let cmd = if cfg!(windows) {
      Command::new("cmd").args([
        "/C".to_string(),
        format!("call \"{}\" {} && set", script.display(), self.arch),
      ])
    } else {
      Command::new("/bin/sh").args([
        "-c".to_string(),
        format!(". \"{}\" {} >/dev/null && env", script.display(), self.arch),
      ])
    };
    Some(cmd)
  }
}

#[cfg(windows)]
async fn find_vcvarsall() -> Option<PathBuf> {
  let program_files = std::env::var("ProgramFiles(x86)").ok()?;
  let vswhere = Path::new(&program_files).join(r"Microsoft Visual Studio\Installer\vswhere.exe");
  let output = tokio::process::Command::new(&vswhere)
    .args(["-latest", "-property", "installationPath"])
    .output()
    .await
    .ok()?;
  if !output.status.success() {
    return None;
  }
  let install = String::from_utf8_lossy(&output.stdout).trim().to_string();
  let script = Path::new(&install).join(r"VC\Auxiliary\Build\vcvarsall.bat");
  script.exists().then_some(script)
}

#[cfg(not(windows))]
async fn find_vcvarsall() -> Option<PathBuf> {
  None
}

/// Path of the cache file for one build type.
pub fn cache_path(output_root: &Path, build_type: BuildType) -> PathBuf {
  output_root.join(build_type.as_str()).join(TOOLCHAIN_ENV_FILE)
}

/// Resolve the toolchain environment for `build_type`.
///
/// A readable cache is returned unless `reconfigure` is set. A malformed cache
/// is regenerated. Without a bootstrap mechanism the environment is empty and
/// the status is [`CacheStatus::Degraded`].
pub async fn resolve<R: CommandRunner>(
  output_root: &Path,
  build_type: BuildType,
  reconfigure: bool,
  bootstrap: &EnvBootstrap,
  runner: &R,
) -> Result<ResolvedEnvironment, EnvCacheError> {
  let path = cache_path(output_root, build_type);

  if !reconfigure {
    match ToolchainEnvironment::load(&path) {
      Ok(Some(env)) => {
        debug!(path = %path.display(), vars = env.len(), "toolchain environment cache hit");
        return Ok(ResolvedEnvironment {
          env,
          status: CacheStatus::Hit,
        });
      }
      Ok(None) => {}
      Err(err @ EnvCacheError::Malformed { .. }) => {
        warn!(error = %err, "regenerating toolchain environment");
      }
      Err(err) => return Err(err),
    }
  }

  let Some(cmd) = bootstrap.command() else {
    warn!(
      build_type = %build_type,
      "no toolchain bootstrap mechanism found, using the ambient environment"
    );
    return Ok(ResolvedEnvironment {
      env: ToolchainEnvironment::new(),
      status: CacheStatus::Degraded,
    });
  };

  info!(command = %cmd, "bootstrapping toolchain environment");
  let output = runner.run(&cmd).await.map_err(|e| EnvCacheError::Bootstrap {
    message: format!("{}: {}", cmd.program, e),
  })?;
  if !output.success {
    return Err(EnvCacheError::Bootstrap {
      message: format!("`{}` exited with {:?}: {}", cmd, output.status, output.stderr.trim()),
    });
  }

  let env = ToolchainEnvironment::from_env_dump(&output.stdout);
  env.save(&path)?;
  debug!(path = %path.display(), vars = env.len(), "toolchain environment cached");

  Ok(ResolvedEnvironment {
    env,
    status: CacheStatus::Miss,
  })
}
