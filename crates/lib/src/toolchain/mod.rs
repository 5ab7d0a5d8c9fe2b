//! Native toolchain description, command synthesis and environment cache.
//!
//! # Submodules
//!
//! - [`command`] - the structured [`Command`] value
//! - [`synth`] - pure translation of compile/link requests into commands
//! - [`env`] - the persisted toolchain environment

pub mod command;
pub mod env;
pub mod synth;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactKind;
use crate::platform::Os;

pub use command::Command;
pub use env::{CacheStatus, EnvBootstrap, EnvCacheError, ResolvedEnvironment, ToolchainEnvironment};
pub use synth::{CompileOptions, CompileRequest, LinkKind, LinkRequest, synthesize_compile, synthesize_link};

/// Flag dialect of a compiler driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolchainFlavor {
  /// `cl.exe` / `link.exe` / `lib.exe`.
  Msvc,
  /// `cc` / `c++` / `ar` (gcc and clang).
  Gnu,
}

/// The programs used for native compilation and linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
  pub flavor: ToolchainFlavor,
  pub cc: String,
  pub cxx: String,
  pub linker: String,
  pub archiver: String,
  /// Operating system the artifacts are named for.
  #[serde(skip)]
  os: Option<Os>,
}

impl Toolchain {
  pub fn msvc() -> Self {
    Self {
      flavor: ToolchainFlavor::Msvc,
      cc: "cl.exe".to_string(),
      cxx: "cl.exe".to_string(),
      linker: "link.exe".to_string(),
      archiver: "lib.exe".to_string(),
      os: Some(Os::Windows),
    }
  }

  pub fn gnu() -> Self {
    Self {
      flavor: ToolchainFlavor::Gnu,
      cc: "cc".to_string(),
      cxx: "c++".to_string(),
      linker: "c++".to_string(),
      archiver: "ar".to_string(),
      os: Os::current(),
    }
  }

  /// The default toolchain of the host.
  pub fn host() -> Self {
    match Os::current() {
      Some(Os::Windows) => Self::msvc(),
      _ => Self::gnu(),
    }
  }

  /// The host toolchain with programs overridden by `KILN_CC`, `KILN_CXX`,
  /// `KILN_LINKER` and `KILN_AR`.
  pub fn from_env() -> Self {
    let mut toolchain = Self::host();
    let overrides = [
      ("KILN_CC", &mut toolchain.cc),
      ("KILN_CXX", &mut toolchain.cxx),
      ("KILN_LINKER", &mut toolchain.linker),
      ("KILN_AR", &mut toolchain.archiver),
    ];
    for (var, slot) in overrides {
      if let Ok(value) = std::env::var(var)
        && !value.is_empty()
      {
        *slot = value;
      }
    }
    toolchain
  }

  pub fn object_extension(&self) -> &'static str {
    match self.flavor {
      ToolchainFlavor::Msvc => "obj",
      ToolchainFlavor::Gnu => "o",
    }
  }

  /// File name of the artifact a target called `name` produces.
  pub fn artifact_file_name(&self, name: &str, kind: ArtifactKind) -> String {
    match (self.flavor, kind) {
      (_, ArtifactKind::ObjectSet) => name.to_string(),
      (ToolchainFlavor::Msvc, ArtifactKind::StaticLibrary) => format!("{}.lib", name),
      (ToolchainFlavor::Msvc, ArtifactKind::DynamicLibrary) => format!("{}.dll", name),
      (ToolchainFlavor::Msvc, ArtifactKind::Executable) => format!("{}.exe", name),
      (ToolchainFlavor::Gnu, ArtifactKind::StaticLibrary) => format!("lib{}.a", name),
      (ToolchainFlavor::Gnu, ArtifactKind::DynamicLibrary) => match self.os {
        Some(Os::MacOs) => format!("lib{}.dylib", name),
        Some(Os::Windows) => format!("{}.dll", name),
        _ => format!("lib{}.so", name),
      },
      (ToolchainFlavor::Gnu, ArtifactKind::Executable) => match self.os {
        Some(Os::Windows) => format!("{}.exe", name),
        _ => name.to_string(),
      },
    }
  }

  /// Import library written next to a dynamic library, if the toolchain
  /// produces one.
  pub fn import_library_name(&self, name: &str) -> Option<String> {
    match self.flavor {
      ToolchainFlavor::Msvc => Some(format!("{}.lib", name)),
      ToolchainFlavor::Gnu => None,
    }
  }
}

/// Whether a source file is compiled as C++.
pub fn is_cxx_source(path: &Path) -> bool {
  matches!(
    path.extension().and_then(|e| e.to_str()),
    Some("cpp" | "cc" | "cxx" | "c++" | "C")
  )
}
