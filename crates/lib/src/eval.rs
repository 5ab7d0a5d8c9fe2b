//! Project evaluation.
//!
//! [`load_project`] runs a declaration file in a fresh Lua VM and returns the
//! resulting [`TargetGraph`]. Graph construction errors raised inside Lua
//! callbacks come back as [`EvalError::Graph`], not as Lua strings.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;
use tracing::{debug, info};

use crate::lua::runtime;
use crate::request::BuildType;
use crate::target::{GraphError, TargetGraph};

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  #[error("cannot read project file {path}: {source}", path = .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("lua error: {0}")]
  Lua(LuaError),

  #[error(transparent)]
  Graph(GraphError),
}

impl From<LuaError> for EvalError {
  fn from(err: LuaError) -> Self {
    match graph_error(&err) {
      Some(graph) => Self::Graph(graph),
      None => Self::Lua(err),
    }
  }
}

/// Find a [`GraphError`] raised from a Rust callback, if any.
fn graph_error(err: &LuaError) -> Option<GraphError> {
  match err {
    LuaError::ExternalError(inner) => inner.downcast_ref::<GraphError>().cloned(),
    LuaError::CallbackError { cause, .. } | LuaError::WithContext { cause, .. } => graph_error(cause),
    _ => None,
  }
}

/// An evaluated project.
#[derive(Debug)]
pub struct Project {
  /// Directory holding the declaration file; relative paths resolve here.
  pub root: PathBuf,
  pub build_file: PathBuf,
  pub graph: TargetGraph,
}

/// Evaluate the declaration file at `path` for `build_type`.
pub fn load_project(path: &Path, build_type: BuildType) -> Result<Project, EvalError> {
  let build_file = dunce::canonicalize(path).map_err(|source| EvalError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  let root = build_file.parent().unwrap_or(Path::new(".")).to_path_buf();
  info!(path = %build_file.display(), build_type = %build_type, "evaluating project");

  let graph = Rc::new(RefCell::new(TargetGraph::new()));

  // lua holds clones of the graph handle; drop it before unwrapping
  {
    let lua = runtime::create_runtime(graph.clone(), &root, build_type)?;
    runtime::load_file(&lua, &build_file)?;
  }

  let graph = match Rc::try_unwrap(graph) {
    Ok(cell) => cell.into_inner(),
    // a script stashed a closure somewhere that outlived the VM
    Err(shared) => shared.borrow().clone(),
  };
  debug!(targets = graph.len(), "project evaluated");

  Ok(Project {
    root,
    build_file,
    graph,
  })
}
