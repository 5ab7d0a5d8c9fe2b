//! Build configuration and the per-invocation build context.

use std::path::{Path, PathBuf};

use crate::consts::OBJ_DIR;
use crate::external::ExternalConfig;
use crate::platform::Arch;
use crate::request::BuildRequest;
use crate::target::TargetGraph;
use crate::toolchain::{EnvBootstrap, Toolchain, ToolchainEnvironment};

/// Where and with what a build runs.
#[derive(Debug, Clone)]
pub struct BuildOptions {
  /// Directory holding the project declaration.
  pub project_dir: PathBuf,
  /// Root of the output tree; each build type gets a subdirectory.
  pub output_root: PathBuf,
  pub toolchain: Toolchain,
  pub bootstrap: EnvBootstrap,
  pub external: ExternalConfig,
  /// Maximum number of targets built at once.
  pub parallelism: usize,
}

impl BuildOptions {
  /// Host defaults: toolchain and external tools from the environment, no
  /// bootstrap script, one worker per core.
  pub fn new(project_dir: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
    Self {
      project_dir: project_dir.into(),
      output_root: output_root.into(),
      toolchain: Toolchain::from_env(),
      bootstrap: EnvBootstrap {
        script: None,
        arch: Arch::current().map(|a| a.msvc_arch()).unwrap_or("x64").to_string(),
      },
      external: ExternalConfig::from_env(),
      parallelism: num_cpus(),
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Everything one build invocation needs, passed explicitly to every step.
///
/// The graph is immutable for the duration of the build and the toolchain
/// environment has already been resolved.
#[derive(Debug)]
pub struct BuildContext {
  pub graph: TargetGraph,
  pub request: BuildRequest,
  pub toolchain: Toolchain,
  pub env: ToolchainEnvironment,
  pub external: ExternalConfig,
  pub output_root: PathBuf,
}

impl BuildContext {
  /// `<output_root>/<build_type>`
  pub fn build_dir(&self) -> PathBuf {
    build_dir(&self.output_root, &self.request)
  }

  /// `<output_root>/<build_type>/obj/<target>`
  pub fn object_dir(&self, target: &str) -> PathBuf {
    self.build_dir().join(OBJ_DIR).join(target)
  }
}

pub(super) fn build_dir(output_root: &Path, request: &BuildRequest) -> PathBuf {
  output_root.join(request.build_type.as_str())
}
