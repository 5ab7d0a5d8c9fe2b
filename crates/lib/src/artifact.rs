//! Build artifacts.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// What a successful build step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
  /// A directory of object (or preprocessed) files.
  ObjectSet,
  StaticLibrary,
  DynamicLibrary,
  Executable,
}

impl fmt::Display for ArtifactKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::ObjectSet => "objects",
      Self::StaticLibrary => "static-library",
      Self::DynamicLibrary => "dynamic-library",
      Self::Executable => "executable",
    };
    write!(f, "{}", s)
  }
}

/// The output of building a target.
///
/// The file on disk is authoritative; this value is only a reference to it
/// for the duration of one build invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArtifact {
  pub path: PathBuf,
  pub kind: ArtifactKind,
  /// Import library produced next to a dynamic library, on toolchains that
  /// link against one instead of the library itself.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub import_library: Option<PathBuf>,
}

impl BuildArtifact {
  pub fn new(path: impl Into<PathBuf>, kind: ArtifactKind) -> Self {
    Self {
      path: path.into(),
      kind,
      import_library: None,
    }
  }

  /// The file dependents hand to the linker.
  pub fn link_input(&self) -> &Path {
    self.import_library.as_deref().unwrap_or(&self.path)
  }
}
