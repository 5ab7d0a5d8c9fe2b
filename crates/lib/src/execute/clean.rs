//! Removal of build outputs.

use std::io;
use std::path::Path;

use tracing::{debug, info};

use super::types::ExecuteError;
use crate::external;
use crate::output_lock::OutputLock;
use crate::request::BuildType;
use crate::target::TargetGraph;

fn remove_dir(dir: &Path) -> Result<(), ExecuteError> {
  match std::fs::remove_dir_all(dir) {
    Ok(()) => {
      info!(dir = %dir.display(), "removed");
      Ok(())
    }
    Err(err) if err.kind() == io::ErrorKind::NotFound => {
      debug!(dir = %dir.display(), "nothing to remove");
      Ok(())
    }
    Err(err) => Err(err.into()),
  }
}

/// Remove `<output_root>/<build_type>` and the build directory of every
/// external library. Callers must hold the output lock.
pub(super) fn remove_outputs(graph: &TargetGraph, output_root: &Path, build_type: BuildType) -> Result<(), ExecuteError> {
  remove_dir(&output_root.join(build_type.as_str()))?;
  for target in graph.targets() {
    if let Some(spec) = &target.external {
      remove_dir(&external::build_dir(&spec.location, build_type))?;
    }
  }
  Ok(())
}

/// Remove all outputs of one build type.
///
/// Not atomic: a failure part way leaves a partially removed tree, which the
/// next build recreates as needed.
pub fn clean(graph: &TargetGraph, output_root: &Path, build_type: BuildType) -> Result<(), ExecuteError> {
  let _lock = OutputLock::acquire(output_root, build_type, "kiln clean")?;
  remove_outputs(graph, output_root, build_type)
}
