//! Build execution module.
//!
//! This module provides the build driver. It handles:
//! - Wave-based dependency ordering over the target graph
//! - Parallel execution of independent targets
//! - Failure propagation and skip tracking
//! - Clean, and delegation of the whole project to CMake

pub mod clean;
pub mod context;
pub mod native;
pub mod runner;
pub mod types;

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::artifact::BuildArtifact;
use crate::external::ExternalBuilder;
use crate::output_lock::OutputLock;
use crate::request::BuildRequest;
use crate::target::{GraphError, TargetGraph, TargetId, TargetKind};
use crate::toolchain::{ToolchainEnvironment, env};

pub use clean::clean;
pub use context::{BuildContext, BuildOptions};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use types::{BuildSummary, ExecuteError, FailedDependency, TargetOutcome};

/// Build every target of `graph`.
///
/// This is the main entry point for the build driver. It:
/// 1. Takes the per-build-type output lock
/// 2. Removes previous outputs when `clean` is requested
/// 3. Resolves the toolchain environment once
/// 4. Builds targets wave by wave, with parallelism within each wave
/// 5. Skips every target depending on a failed one
///
/// Per-target failures are recorded in the summary. Only lock, environment
/// and alternate-tool failures are returned as errors.
pub async fn build<R: CommandRunner>(
  graph: TargetGraph,
  request: BuildRequest,
  options: BuildOptions,
  runner: Arc<R>,
) -> Result<BuildSummary, ExecuteError> {
  let _lock = OutputLock::acquire(&options.output_root, request.build_type, "kiln build")?;

  if request.clean {
    clean::remove_outputs(&graph, &options.output_root, request.build_type)?;
  }

  let mut summary = BuildSummary {
    build_type: request.build_type,
    ..BuildSummary::default()
  };

  if request.use_alternate_tool {
    let dir = context::build_dir(&options.output_root, &request);
    info!(dir = %dir.display(), "delegating project to cmake");
    ExternalBuilder::new(&options.external, &options.toolchain)
      .build_project(&options.project_dir, &dir, &request, runner.as_ref())
      .await?;
    summary.delegated = Some(dir);
    return Ok(summary);
  }

  let env = if graph.targets().any(|t| t.kind.is_native()) {
    let resolved = env::resolve(
      &options.output_root,
      request.build_type,
      request.reconfigure,
      &options.bootstrap,
      runner.as_ref(),
    )
    .await?;
    summary.env_status = Some(resolved.status);
    resolved.env
  } else {
    ToolchainEnvironment::new()
  };

  let ctx = Arc::new(BuildContext {
    graph,
    request,
    toolchain: options.toolchain,
    env,
    external: options.external,
    output_root: options.output_root,
  });

  run_waves(ctx, runner, options.parallelism, &mut summary).await?;
  Ok(summary)
}

async fn run_waves<R: CommandRunner>(
  ctx: Arc<BuildContext>,
  runner: Arc<R>,
  parallelism: usize,
  summary: &mut BuildSummary,
) -> Result<(), ExecuteError> {
  let waves = ctx.graph.waves()?;
  info!(
    targets = ctx.graph.len(),
    wave_count = waves.len(),
    build_type = %ctx.request.build_type,
    "starting build"
  );

  let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
  let mut completed: HashMap<TargetId, BuildArtifact> = HashMap::new();
  let mut failed: HashSet<TargetId> = HashSet::new();

  for (wave_idx, wave) in waves.iter().enumerate() {
    debug!(wave = wave_idx, targets = wave.len(), "executing wave");

    let mut ready = Vec::new();
    for &id in wave {
      let name = ctx.graph.get(id).name.clone();
      summary.order.push(name.clone());

      let failed_dep = ctx.graph.dependencies(id).into_iter().find(|dep| failed.contains(dep));
      if let Some(dep) = failed_dep {
        let dep = FailedDependency(ctx.graph.get(dep).name.clone());
        warn!(target = %name, failed_dep = %dep, "skipping target due to failed dependency");
        failed.insert(id);
        summary
          .outcomes
          .insert(name, TargetOutcome::SkippedDueToDependencyFailure(dep));
      } else {
        ready.push(id);
      }
    }

    if ready.is_empty() {
      continue;
    }

    for (id, result) in execute_wave(&ctx, &runner, &ready, &completed, &semaphore).await {
      let name = ctx.graph.get(id).name.clone();
      let outcome = result.unwrap_or_else(|e| {
        error!(target = %name, error = %e, "target failed");
        TargetOutcome::Failed(e)
      });
      if outcome.is_success() {
        if let Some(artifact) = outcome.artifact() {
          completed.insert(id, artifact.clone());
        }
      } else {
        failed.insert(id);
      }
      summary.outcomes.insert(name, outcome);
    }
  }

  info!(
    succeeded = summary.succeeded(),
    busy = summary.busy(),
    failed = summary.failed(),
    skipped = summary.skipped(),
    "build complete"
  );
  Ok(())
}

/// Build the targets of one wave concurrently, bounded by `semaphore`.
async fn execute_wave<R: CommandRunner>(
  ctx: &Arc<BuildContext>,
  runner: &Arc<R>,
  targets: &[TargetId],
  completed: &HashMap<TargetId, BuildArtifact>,
  semaphore: &Arc<Semaphore>,
) -> Vec<(TargetId, Result<TargetOutcome, ExecuteError>)> {
  let mut join_set = JoinSet::new();
  let mut task_targets = HashMap::new();

  for &id in targets {
    let ctx = ctx.clone();
    let runner = runner.clone();
    let completed = completed.clone();
    let semaphore = semaphore.clone();

    let handle = join_set.spawn(async move {
      let result = match semaphore.acquire().await {
        Ok(_permit) => build_target(&ctx, runner.as_ref(), id, &completed).await,
        Err(e) => Err(ExecuteError::Io(io::Error::other(e))),
      };
      (id, result)
    });
    task_targets.insert(handle.id(), id);
  }

  let mut results = Vec::with_capacity(targets.len());
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok(result) => results.push(result),
      Err(e) => {
        error!(error = %e, "build task panicked");
        if let Some(&id) = task_targets.get(&e.id()) {
          results.push((id, Err(ExecuteError::Io(io::Error::other(format!("build task panicked: {}", e))))));
        }
      }
    }
  }
  results
}

/// Dispatch one target by kind.
async fn build_target<R: CommandRunner>(
  ctx: &BuildContext,
  runner: &R,
  id: TargetId,
  completed: &HashMap<TargetId, BuildArtifact>,
) -> Result<TargetOutcome, ExecuteError> {
  let target = ctx.graph.get(id);
  match target.kind {
    TargetKind::ExternalLibrary => {
      let spec = target.external.as_ref().ok_or_else(|| GraphError::InvalidDeclaration {
        target: target.name.clone(),
        message: "external library without a location".to_string(),
      })?;
      let artifact = ExternalBuilder::new(&ctx.external, &ctx.toolchain)
        .ensure_built(&target.name, spec, &ctx.request, runner)
        .await?;
      Ok(TargetOutcome::Built(artifact))
    }
    // Members precede the package in wave order, and a failed member has
    // already caused the package to be skipped.
    TargetKind::Package => {
      let members = target.members.iter().map(|m| ctx.graph.get(*m).name.clone()).collect();
      info!(target = %target.name, "package complete");
      Ok(TargetOutcome::Bundled { members })
    }
    TargetKind::Library | TargetKind::DynamicLibrary | TargetKind::Executable => {
      native::build_native(ctx, runner, id, completed).await
    }
  }
}
