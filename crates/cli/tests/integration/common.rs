//! Shared helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Two C libraries and an executable, shaped like a small game project.
pub const GAME_PROJECT: &str = r#"
local noc = kiln.add_library{ name = "noc", sources = { "noc/noc.c" } }
kiln.target_includes(noc, "public", { "noc" })
kiln.target_macros(noc, { NOC_IMPL = 1 })

local hmm = kiln.add_library{ name = "hmm", sources = { "hmm/hmm.c" } }
kiln.target_links(hmm, { noc })

local garden = kiln.add_executable{ name = "garden", sources = { "code/garden.c" } }
kiln.target_links(garden, { hmm })
"#;

/// Isolated project directory.
pub struct TestProject {
  pub temp: TempDir,
  pub build_file: PathBuf,
}

impl TestProject {
  pub fn new(declaration: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let build_file = temp.path().join("build.lua");
    std::fs::write(&build_file, declaration).unwrap();
    let project = Self { temp, build_file };
    for source in ["noc/noc.c", "hmm/hmm.c", "code/garden.c"] {
      project.write_file(source, "int x;\n");
    }
    project
  }

  /// Write a file relative to the project directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn output_root(&self) -> PathBuf {
    self.temp.path().join("build")
  }

  /// A kiln command pointed at this project.
  ///
  /// The toolchain variables are cleared so the host environment cannot leak
  /// into a test.
  pub fn kiln_cmd(&self, subcommand: &str) -> Command {
    let mut cmd = cargo_bin_cmd!("kiln");
    cmd
      .arg(subcommand)
      .arg("--project")
      .arg(&self.build_file)
      .env_remove("KILN_VCVARS")
      .env_remove("RUST_LOG");
    cmd
  }

  /// A kiln command whose compiler, linker and archiver all succeed without
  /// doing anything.
  #[cfg(unix)]
  pub fn kiln_cmd_with_noop_toolchain(&self, subcommand: &str) -> Command {
    let mut cmd = self.kiln_cmd(subcommand);
    for var in ["KILN_CC", "KILN_CXX", "KILN_LINKER", "KILN_AR"] {
      cmd.env(var, "true");
    }
    cmd
  }
}
