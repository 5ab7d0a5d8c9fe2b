//! Target model.
//!
//! Declares the buildable units of a project and the propagation of include
//! directories and macros across link edges.

pub mod graph;
pub mod lua;
pub mod types;

pub use graph::TargetGraph;
pub use types::{
  Access, ExternalSpec, ExternalToolKind, GraphError, IncludeDir, MacroDef, MacroValue, Target, TargetId, TargetKind,
  TargetOptions,
};
