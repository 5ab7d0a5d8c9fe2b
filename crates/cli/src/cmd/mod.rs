mod build;
mod clean;
mod graph;

use std::path::PathBuf;

use anyhow::{Context, Result};

use kiln_lib::consts::DEFAULT_OUTPUT_DIR;
use kiln_lib::eval::{Project, load_project};

use crate::ProjectArgs;

pub use build::{BuildArgs, cmd_build};
pub use clean::cmd_clean;
pub use graph::cmd_graph;

/// Evaluate the declaration named by `args`.
fn load(args: &ProjectArgs) -> Result<Project> {
  load_project(&args.project, args.build_type)
    .with_context(|| format!("failed to evaluate {}", args.project.display()))
}

/// `--output-root`, or `<project dir>/build`.
fn output_root(args: &ProjectArgs, project: &Project) -> PathBuf {
  args
    .output_root
    .clone()
    .unwrap_or_else(|| project.root.join(DEFAULT_OUTPUT_DIR))
}
