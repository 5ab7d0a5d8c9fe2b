//! External dependency builder.
//!
//! Vendored source trees are configured and built by a secondary tool into
//! `<location>/build/<build_type>/`. A build is skipped entirely when the
//! expected artifact already exists and neither `clean` nor `reconfigure` was
//! requested.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::artifact::{ArtifactKind, BuildArtifact};
use crate::consts::{DEFAULT_BUILD_FILE, DEFAULT_OUTPUT_DIR};
use crate::execute::{CommandOutput, CommandRunner, ExecuteError};
use crate::request::{BuildRequest, BuildType};
use crate::target::{ExternalSpec, ExternalToolKind};
use crate::toolchain::{Command, Toolchain};

/// Marker CMake leaves in a configured build directory.
const CMAKE_CACHE: &str = "CMakeCache.txt";

/// Programs used to drive external builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalConfig {
  pub cmake: String,
  /// The kiln executable used for `tool = "kiln"` dependencies.
  pub kiln: PathBuf,
}

impl Default for ExternalConfig {
  fn default() -> Self {
    Self {
      cmake: "cmake".to_string(),
      kiln: PathBuf::from("kiln"),
    }
  }
}

impl ExternalConfig {
  /// `KILN_CMAKE` overrides the cmake program; kiln itself is the running
  /// executable.
  pub fn from_env() -> Self {
    let mut config = Self::default();
    if let Ok(cmake) = std::env::var("KILN_CMAKE")
      && !cmake.is_empty()
    {
      config.cmake = cmake;
    }
    if let Ok(exe) = std::env::current_exe() {
      config.kiln = exe;
    }
    config
  }
}

/// Build directory of an external tree for one build type.
pub fn build_dir(location: &Path, build_type: BuildType) -> PathBuf {
  location.join(DEFAULT_OUTPUT_DIR).join(build_type.as_str())
}

fn artifact_kind(path: &Path) -> ArtifactKind {
  match path.extension().and_then(|e| e.to_str()) {
    Some("dll" | "so" | "dylib") => ArtifactKind::DynamicLibrary,
    _ => ArtifactKind::StaticLibrary,
  }
}

fn failure_message(cmd: &Command, output: &CommandOutput) -> String {
  let status = output.status.map_or("signal".to_string(), |c| c.to_string());
  let stderr = output.stderr.trim();
  if stderr.is_empty() {
    format!("`{}` exited with {}", cmd, status)
  } else {
    format!("`{}` exited with {}: {}", cmd, status, stderr)
  }
}

/// Run one step of an external build, mapping any failure to
/// [`ExecuteError::ExternalBuildFailed`].
async fn run_step<R: CommandRunner>(target: &str, cmd: &Command, runner: &R) -> Result<(), ExecuteError> {
  info!(target = %target, command = %cmd, "running external tool");
  let output = runner.run(cmd).await.map_err(|e| ExecuteError::ExternalBuildFailed {
    target: target.to_string(),
    message: format!("could not run `{}`: {}", cmd.program, e),
  })?;
  if !output.success {
    return Err(ExecuteError::ExternalBuildFailed {
      target: target.to_string(),
      message: failure_message(cmd, &output),
    });
  }
  Ok(())
}

/// Configures and builds external libraries.
#[derive(Debug, Clone)]
pub struct ExternalBuilder<'a> {
  config: &'a ExternalConfig,
  toolchain: &'a Toolchain,
}

impl<'a> ExternalBuilder<'a> {
  pub fn new(config: &'a ExternalConfig, toolchain: &'a Toolchain) -> Self {
    Self { config, toolchain }
  }

  /// The artifact `name` is expected to produce, whether or not it exists.
  pub fn expected_artifact(&self, name: &str, spec: &ExternalSpec, build_type: BuildType) -> BuildArtifact {
    let dir = build_dir(&spec.location, build_type);
    let path = match &spec.artifact {
      Some(relative) => dir.join(relative),
      None => dir.join(self.toolchain.artifact_file_name(name, ArtifactKind::StaticLibrary)),
    };
    let kind = artifact_kind(&path);
    BuildArtifact::new(path, kind)
  }

  /// Command for the configure step, or `None` when configuring is just
  /// creating the build directory.
  pub fn configure_command(&self, spec: &ExternalSpec, build_type: BuildType) -> Option<Command> {
    match spec.tool {
      ExternalToolKind::CMake => {
        let mut cmd = Command::new(self.config.cmake.as_str())
          .arg("-S")
          .path_arg(&spec.location)
          .arg("-B")
          .path_arg(&build_dir(&spec.location, build_type))
          .arg("-D")
          .arg(format!("CMAKE_BUILD_TYPE={}", build_type))
          .arg("-D")
          .arg("BUILD_SHARED_LIBS=OFF");
        for (key, value) in &spec.options {
          cmd = cmd.arg("-D").arg(format!("{}={}", key, value));
        }
        Some(cmd)
      }
      ExternalToolKind::Kiln => None,
    }
  }

  pub fn build_command(&self, spec: &ExternalSpec, request: &BuildRequest) -> Command {
    let build_type = request.build_type;
    match spec.tool {
      ExternalToolKind::CMake => Command::new(self.config.cmake.as_str())
        .arg("--build")
        .path_arg(&build_dir(&spec.location, build_type))
        .arg("--config")
        .arg(build_type.as_str()),
      ExternalToolKind::Kiln => {
        let mut cmd = Command::new(self.config.kiln.to_string_lossy())
          .arg("build")
          .arg("--build-type")
          .arg(build_type.as_str())
          .arg("--project")
          .path_arg(&spec.location.join(DEFAULT_BUILD_FILE))
          .arg("--output-root")
          .path_arg(&spec.location.join(DEFAULT_OUTPUT_DIR));
        if request.reconfigure {
          cmd = cmd.arg("--reconfigure");
        }
        cmd.current_dir(&spec.location)
      }
    }
  }

  /// Make sure the external library `name` is built.
  ///
  /// Performs no work if the expected artifact exists and neither `clean`
  /// nor `reconfigure` is set; otherwise runs exactly one configure and one
  /// build step.
  pub async fn ensure_built<R: CommandRunner>(
    &self,
    name: &str,
    spec: &ExternalSpec,
    request: &BuildRequest,
    runner: &R,
  ) -> Result<BuildArtifact, ExecuteError> {
    let artifact = self.expected_artifact(name, spec, request.build_type);

    if artifact.path.exists() && !request.clean && !request.reconfigure {
      debug!(target = %name, path = %artifact.path.display(), "external artifact present, nothing to do");
      return Ok(artifact);
    }

    let dir = build_dir(&spec.location, request.build_type);
    std::fs::create_dir_all(&dir)?;

    if let Some(configure) = self.configure_command(spec, request.build_type) {
      run_step(name, &configure, runner).await?;
    }
    run_step(name, &self.build_command(spec, request), runner).await?;

    if !artifact.path.exists() {
      return Err(ExecuteError::ExternalBuildFailed {
        target: name.to_string(),
        message: format!("expected artifact {} was not produced", artifact.path.display()),
      });
    }

    info!(target = %name, path = %artifact.path.display(), "external library built");
    Ok(artifact)
  }

  /// Build the whole project with CMake instead of walking the target graph.
  ///
  /// Configures `project_dir` into `build_dir` when no CMake cache exists
  /// there or `reconfigure` is set, then builds it.
  pub async fn build_project<R: CommandRunner>(
    &self,
    project_dir: &Path,
    build_dir: &Path,
    request: &BuildRequest,
    runner: &R,
  ) -> Result<(), ExecuteError> {
    let name = project_dir
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| project_dir.display().to_string());
    let build_type = request.build_type.as_str();

    std::fs::create_dir_all(build_dir)?;

    if request.reconfigure || !build_dir.join(CMAKE_CACHE).exists() {
      let configure = Command::new(self.config.cmake.as_str())
        .arg("-S")
        .path_arg(project_dir)
        .arg("-B")
        .path_arg(build_dir)
        .arg("-D")
        .arg(format!("CMAKE_BUILD_TYPE={}", build_type));
      run_step(&name, &configure, runner).await?;
    } else {
      debug!(dir = %build_dir.display(), "reusing configured build directory");
    }

    let build = Command::new(self.config.cmake.as_str())
      .arg("--build")
      .path_arg(build_dir)
      .arg("--config")
      .arg(build_type);
    run_step(&name, &build, runner).await
  }
}
