//! Implementation of the `kiln clean` command.

use anyhow::{Context, Result};

use kiln_lib::execute::clean;

use crate::ProjectArgs;
use crate::output::print_success;

pub fn cmd_clean(args: &ProjectArgs) -> Result<()> {
  let project = super::load(args)?;
  let output_root = super::output_root(args, &project);

  clean(&project.graph, &output_root, args.build_type).context("Clean failed")?;
  print_success(&format!(
    "Removed {} outputs under {}",
    args.build_type,
    output_root.display()
  ));
  Ok(())
}
