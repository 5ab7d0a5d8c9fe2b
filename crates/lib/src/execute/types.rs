//! Types for build execution.
//!
//! Error types, per-target outcomes and the end-of-build summary.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::artifact::BuildArtifact;
use crate::output_lock::OutputLockError;
use crate::request::BuildType;
use crate::toolchain::{CacheStatus, EnvCacheError};

/// The dependency whose failure caused a target to be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDependency(pub String);

impl fmt::Display for FailedDependency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Errors that can occur during build execution.
///
/// `CompileFailed`, `LinkFailed`, `ExternalBuildFailed` and `Io` raised while
/// building a target are recorded against that target. The remaining
/// variants abort the invocation.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The compiler returned failure for one source file.
  #[error("{target}: failed to compile {file}: {message}")]
  CompileFailed {
    target: String,
    file: PathBuf,
    message: String,
  },

  /// The linker or archiver returned failure.
  #[error("{target}: link failed: {message}")]
  LinkFailed { target: String, message: String },

  /// The secondary build tool returned failure or produced no artifact.
  #[error("{target}: external build failed: {message}")]
  ExternalBuildFailed { target: String, message: String },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Env(#[from] EnvCacheError),

  #[error(transparent)]
  Lock(#[from] OutputLockError),

  /// The target graph cannot be ordered.
  #[error(transparent)]
  Graph(#[from] crate::target::GraphError),
}

/// What happened to one target.
#[derive(Debug)]
pub enum TargetOutcome {
  /// The target was built (or its external artifact was already present).
  Built(BuildArtifact),
  /// A package whose members all built.
  Bundled { members: Vec<String> },
  /// The artifact could not be opened for writing; the previous artifact is
  /// reused. Not a failure.
  SkippedBusy(BuildArtifact),
  Failed(ExecuteError),
  SkippedDueToDependencyFailure(FailedDependency),
}

impl TargetOutcome {
  /// Whether dependents may proceed.
  pub fn is_success(&self) -> bool {
    matches!(self, Self::Built(_) | Self::Bundled { .. } | Self::SkippedBusy(_))
  }

  /// The artifact dependents link against, if any.
  pub fn artifact(&self) -> Option<&BuildArtifact> {
    match self {
      Self::Built(artifact) | Self::SkippedBusy(artifact) => Some(artifact),
      _ => None,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Self::Built(_) => "built",
      Self::Bundled { .. } => "bundled",
      Self::SkippedBusy(_) => "busy",
      Self::Failed(_) => "failed",
      Self::SkippedDueToDependencyFailure(_) => "skipped",
    }
  }
}

/// Result of one build invocation.
#[derive(Debug, Default)]
pub struct BuildSummary {
  pub build_type: BuildType,
  /// Targets in the order they were scheduled.
  pub order: Vec<String>,
  pub outcomes: BTreeMap<String, TargetOutcome>,
  /// How the toolchain environment was obtained; `None` when delegated.
  pub env_status: Option<CacheStatus>,
  /// Build directory, when the whole project was delegated to CMake.
  pub delegated: Option<PathBuf>,
}

impl BuildSummary {
  /// True unless a target failed or was skipped because a dependency failed.
  pub fn is_success(&self) -> bool {
    self.outcomes.values().all(TargetOutcome::is_success)
  }

  fn count(&self, f: impl Fn(&TargetOutcome) -> bool) -> usize {
    self.outcomes.values().filter(|o| f(o)).count()
  }

  pub fn succeeded(&self) -> usize {
    self.count(|o| matches!(o, TargetOutcome::Built(_) | TargetOutcome::Bundled { .. }))
  }

  pub fn busy(&self) -> usize {
    self.count(|o| matches!(o, TargetOutcome::SkippedBusy(_)))
  }

  pub fn failed(&self) -> usize {
    self.count(|o| matches!(o, TargetOutcome::Failed(_)))
  }

  pub fn skipped(&self) -> usize {
    self.count(|o| matches!(o, TargetOutcome::SkippedDueToDependencyFailure(_)))
  }

  /// Outcomes in scheduling order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &TargetOutcome)> {
    self
      .order
      .iter()
      .filter_map(|name| self.outcomes.get(name).map(|o| (name.as_str(), o)))
  }
}
