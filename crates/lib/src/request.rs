//! Build requests.
//!
//! A [`BuildRequest`] describes one invocation of the build driver: which
//! build type to produce and which incrementality shortcuts to bypass.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::target::MacroValue;

/// A named configuration profile with its own output directory and cached
/// toolchain environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildType {
  #[default]
  Debug,
  Release,
}

impl BuildType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Debug => "Debug",
      Self::Release => "Release",
    }
  }

  /// Macros every native target receives for this build type.
  pub fn default_macros(&self) -> BTreeMap<String, MacroValue> {
    let mut macros = BTreeMap::new();
    match self {
      Self::Debug => {
        macros.insert("KILN_BUILD_TYPE_DEBUG".to_string(), MacroValue::Int(1));
      }
      Self::Release => {
        macros.insert("KILN_BUILD_TYPE_RELEASE".to_string(), MacroValue::Int(1));
        macros.insert("NDEBUG".to_string(), MacroValue::Int(1));
      }
    }
    macros
  }
}

impl fmt::Display for BuildType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for BuildType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "debug" => Ok(Self::Debug),
      "release" => Ok(Self::Release),
      other => Err(format!("unknown build type '{}' (expected Debug or Release)", other)),
    }
  }
}

/// Optional instrumentation compiled into every native target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFeatures {
  /// Debug allocation tracking.
  pub track_allocations: bool,
  /// Performance instrumentation.
  pub instrumentation: bool,
  /// Route allocations through the C runtime allocator.
  pub crt_allocator: bool,
}

impl BuildFeatures {
  pub fn macros(&self) -> BTreeMap<String, MacroValue> {
    [
      (self.track_allocations, "KILN_TRACK_ALLOCATIONS"),
      (self.instrumentation, "KILN_INSTRUMENTATION"),
      (self.crt_allocator, "KILN_USE_CRT_ALLOCATIONS"),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .map(|(_, name)| (name.to_string(), MacroValue::Int(1)))
    .collect()
  }
}

/// One invocation of the build driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
  pub build_type: BuildType,
  /// Discard previous outputs before building.
  pub clean: bool,
  /// Re-run external configuration and re-derive the toolchain environment.
  pub reconfigure: bool,
  /// Delegate the whole project to the secondary build tool.
  pub use_alternate_tool: bool,
  /// Stop native targets after macro expansion.
  pub only_preprocessor: bool,
  pub features: BuildFeatures,
}

impl BuildRequest {
  pub fn new(build_type: BuildType) -> Self {
    Self {
      build_type,
      ..Self::default()
    }
  }

  /// Request-level macros: build type defaults plus enabled features.
  /// Target macros take precedence over these.
  pub fn macros(&self) -> BTreeMap<String, MacroValue> {
    let mut macros = self.build_type.default_macros();
    macros.extend(self.features.macros());
    macros
  }
}
