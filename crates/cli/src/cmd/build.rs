//! Implementation of the `kiln build` command.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use tracing::info;

use kiln_lib::execute::{BuildOptions, BuildSummary, ProcessRunner, TargetOutcome, build};
use kiln_lib::request::{BuildFeatures, BuildRequest};
use kiln_lib::toolchain::EnvBootstrap;

use crate::ProjectArgs;
use crate::output::{
  OutputFormat, format_duration, print_error, print_json, print_skipped, print_stat, print_success, print_warning,
};

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
  #[command(flatten)]
  pub project: ProjectArgs,

  /// Remove previous outputs of this build type first
  #[arg(long)]
  pub clean: bool,

  /// Re-run external configuration and re-derive the toolchain environment
  #[arg(long)]
  pub reconfigure: bool,

  /// Hand the whole project to the secondary build tool
  #[arg(long)]
  pub use_alternate_tool: bool,

  /// Stop after macro expansion; nothing is linked
  #[arg(long)]
  pub only_preprocessor: bool,

  /// Compile in debug allocation tracking
  #[arg(long)]
  pub track_allocations: bool,

  /// Compile in performance instrumentation
  #[arg(long)]
  pub instrumentation: bool,

  /// Route allocations through the C runtime allocator
  #[arg(long)]
  pub crt_allocator: bool,

  /// Maximum number of targets built at once
  #[arg(short, long)]
  pub jobs: Option<usize>,

  /// Output format
  #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
  pub output: OutputFormat,
}

impl BuildArgs {
  fn request(&self) -> BuildRequest {
    BuildRequest {
      build_type: self.project.build_type,
      clean: self.clean,
      reconfigure: self.reconfigure,
      use_alternate_tool: self.use_alternate_tool,
      only_preprocessor: self.only_preprocessor,
      features: BuildFeatures {
        track_allocations: self.track_allocations,
        instrumentation: self.instrumentation,
        crt_allocator: self.crt_allocator,
      },
    }
  }
}

/// Execute the build command.
///
/// Returns `Ok(false)` when any target failed or was skipped because a
/// dependency failed.
pub fn cmd_build(args: &BuildArgs) -> Result<bool> {
  let project = super::load(&args.project)?;
  let output_root = super::output_root(&args.project, &project);
  let request = args.request();

  let mut options = BuildOptions::new(&project.root, &output_root);
  if let Some(jobs) = args.jobs {
    options.parallelism = jobs.max(1);
  }

  let started = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let summary = rt
    .block_on(async {
      options.bootstrap = EnvBootstrap::locate(options.bootstrap.arch.clone()).await;
      info!(
        output_root = %output_root.display(),
        parallelism = options.parallelism,
        "starting build"
      );
      build(project.graph, request, options, Arc::new(ProcessRunner)).await
    })
    .context("Build failed")?;

  if args.output.is_json() {
    print_json(&summary_json(&summary))?;
  } else {
    print_summary(&summary);
    print_stat("Finished in", &format_duration(started.elapsed()));
  }

  Ok(summary.is_success())
}

fn print_summary(summary: &BuildSummary) {
  if let Some(project) = &summary.delegated {
    print_success(&format!("Delegated {} build of {}", summary.build_type, project.display()));
    return;
  }

  for (name, outcome) in summary.iter() {
    match outcome {
      TargetOutcome::Built(artifact) => print_success(&format!("{} ({})", name, artifact.path.display())),
      TargetOutcome::Bundled { members } => print_success(&format!("{} [{}]", name, members.join(", "))),
      TargetOutcome::SkippedBusy(artifact) => print_warning(&format!(
        "{}: {} is in use, keeping the previous artifact",
        name,
        artifact.path.display()
      )),
      TargetOutcome::Failed(err) => print_error(&format!("{}", err)),
      TargetOutcome::SkippedDueToDependencyFailure(dep) => {
        print_skipped(&format!("{}: skipped because '{}' failed", name, dep))
      }
    }
  }

  println!();
  print_stat("Build type", summary.build_type.as_str());
  print_stat("Succeeded", &summary.succeeded().to_string());
  print_stat("Busy", &summary.busy().to_string());
  print_stat("Failed", &summary.failed().to_string());
  print_stat("Skipped", &summary.skipped().to_string());
}

fn summary_json(summary: &BuildSummary) -> serde_json::Value {
  let targets: Vec<_> = summary
    .iter()
    .map(|(name, outcome)| {
      let mut entry = json!({ "name": name, "status": outcome.label() });
      if let Some(artifact) = outcome.artifact() {
        entry["artifact"] = json!(artifact);
      }
      match outcome {
        TargetOutcome::Failed(err) => entry["error"] = json!(err.to_string()),
        TargetOutcome::SkippedDueToDependencyFailure(dep) => entry["failed_dependency"] = json!(dep.0),
        TargetOutcome::Bundled { members } => entry["members"] = json!(members),
        _ => {}
      }
      entry
    })
    .collect();

  json!({
    "build_type": summary.build_type,
    "success": summary.is_success(),
    "env_status": summary.env_status,
    "delegated": summary.delegated,
    "succeeded": summary.succeeded(),
    "busy": summary.busy(),
    "failed": summary.failed(),
    "skipped": summary.skipped(),
    "targets": targets,
  })
}
