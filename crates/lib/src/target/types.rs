//! Types for the target model.
//!
//! A [`Target`] is one declared buildable unit. Targets live inside a
//! [`TargetGraph`](super::TargetGraph) and refer to each other through
//! [`TargetId`] handles.

use std::fmt;
use std::path::PathBuf;

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Handle to a target registered in a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetId(pub(crate) NodeIndex);

/// The kind of buildable unit a target describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind {
  Library,
  DynamicLibrary,
  Executable,
  ExternalLibrary,
  Package,
}

impl TargetKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Library => "library",
      Self::DynamicLibrary => "dynamic-library",
      Self::Executable => "executable",
      Self::ExternalLibrary => "external-library",
      Self::Package => "package",
    }
  }

  /// Whether the target is compiled and linked by the native toolchain.
  pub fn is_native(&self) -> bool {
    matches!(self, Self::Library | Self::DynamicLibrary | Self::Executable)
  }

  /// Whether other targets may list this target in their links.
  pub fn is_linkable(&self) -> bool {
    matches!(self, Self::Library | Self::DynamicLibrary | Self::ExternalLibrary)
  }
}

impl fmt::Display for TargetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Visibility of an include directory or macro across link edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
  /// Visible to every target that (transitively) links the declaring target.
  Public,
  /// Visible only to the declaring target.
  #[default]
  Private,
}

impl std::str::FromStr for Access {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "public" => Ok(Self::Public),
      "private" => Ok(Self::Private),
      other => Err(format!("unknown access level '{}' (expected 'public' or 'private')", other)),
    }
  }
}

/// A preprocessor macro value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MacroValue {
  Int(i64),
  Str(String),
}

impl fmt::Display for MacroValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int(i) => write!(f, "{}", i),
      Self::Str(s) => write!(f, "{}", s),
    }
  }
}

impl From<&str> for MacroValue {
  fn from(s: &str) -> Self {
    Self::Str(s.to_string())
  }
}

impl From<i64> for MacroValue {
  fn from(i: i64) -> Self {
    Self::Int(i)
  }
}

/// An include directory tagged with its access level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeDir {
  pub path: PathBuf,
  pub access: Access,
}

/// A macro definition tagged with its access level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroDef {
  pub name: String,
  pub value: MacroValue,
  pub access: Access,
}

/// Secondary build tool used for an external library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExternalToolKind {
  /// A CMake-style generator/builder.
  #[default]
  CMake,
  /// Another kiln project, built by invoking kiln on it.
  Kiln,
}

impl std::str::FromStr for ExternalToolKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "cmake" => Ok(Self::CMake),
      "kiln" => Ok(Self::Kiln),
      other => Err(format!("unknown external tool '{}' (expected 'cmake' or 'kiln')", other)),
    }
  }
}

/// Where and how an external library is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSpec {
  /// Source directory of the vendored project.
  pub location: PathBuf,
  pub tool: ExternalToolKind,
  /// Artifact path relative to the external build directory.
  /// Defaults to the toolchain's static library name for the target.
  pub artifact: Option<PathBuf>,
  /// `-D KEY=VALUE` pairs handed to the configure step.
  pub options: Vec<(String, String)>,
}

/// Per-target native build options.
///
/// This is a closed set: declarations naming any other option are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOptions {
  /// Adds the wide-character API macros (`UNICODE`, `_UNICODE`).
  pub unicode_support: bool,
  pub compile_flags: Vec<String>,
  pub link_flags: Vec<String>,
  /// System libraries handed to the linker.
  pub libs: Vec<String>,
}

impl TargetOptions {
  pub const KEYS: &'static [&'static str] = &["unicode_support", "compile_flags", "link_flags", "libs"];
}

/// A buildable unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
  pub name: String,
  pub kind: TargetKind,
  pub sources: Vec<PathBuf>,
  pub includes: Vec<IncludeDir>,
  pub macros: Vec<MacroDef>,
  /// Direct dependencies, in declaration order.
  pub links: Vec<TargetId>,
  pub options: TargetOptions,
  /// Set for `ExternalLibrary` targets only.
  pub external: Option<ExternalSpec>,
  /// Set for `Package` targets only.
  pub members: Vec<TargetId>,
}

impl Target {
  pub(crate) fn new(name: &str, kind: TargetKind) -> Self {
    Self {
      name: name.to_string(),
      kind,
      sources: Vec::new(),
      includes: Vec::new(),
      macros: Vec::new(),
      links: Vec::new(),
      options: TargetOptions::default(),
      external: None,
      members: Vec::new(),
    }
  }
}

/// Errors raised while constructing a target graph.
///
/// All of these are fatal to the whole build: the graph itself is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("duplicate target: '{0}' is already declared")]
  DuplicateTarget(String),

  #[error("cyclic dependency: linking '{from}' -> '{to}' would create a cycle")]
  CyclicDependency { from: String, to: String },

  #[error("unknown target: '{0}'")]
  UnknownTarget(String),

  #[error("invalid link '{from}' -> '{to}': {reason}")]
  InvalidLink { from: String, to: String, reason: String },

  #[error("invalid declaration for '{target}': {message}")]
  InvalidDeclaration { target: String, message: String },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn access_parses_case_insensitively() {
    assert_eq!("PUBLIC".parse::<Access>(), Ok(Access::Public));
    assert_eq!("private".parse::<Access>(), Ok(Access::Private));
    assert!("protected".parse::<Access>().is_err());
  }

  #[test]
  fn macro_value_display() {
    assert_eq!(MacroValue::Int(1).to_string(), "1");
    assert_eq!(MacroValue::from("garden_gameplay.dll").to_string(), "garden_gameplay.dll");
  }

  #[test]
  fn only_library_kinds_are_linkable() {
    assert!(TargetKind::Library.is_linkable());
    assert!(TargetKind::DynamicLibrary.is_linkable());
    assert!(TargetKind::ExternalLibrary.is_linkable());
    assert!(!TargetKind::Executable.is_linkable());
    assert!(!TargetKind::Package.is_linkable());
  }

  #[test]
  fn external_tool_parses() {
    assert_eq!("CMake".parse::<ExternalToolKind>(), Ok(ExternalToolKind::CMake));
    assert_eq!("kiln".parse::<ExternalToolKind>(), Ok(ExternalToolKind::Kiln));
    assert!("meson".parse::<ExternalToolKind>().is_err());
  }
}
