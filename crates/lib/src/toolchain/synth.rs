//! Command synthesis.
//!
//! Pure translation of abstract compile and link requests into the literal
//! invocation of a toolchain. Nothing here touches the filesystem or runs a
//! process: identical inputs always yield identical commands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::request::BuildType;
use crate::target::MacroValue;

use super::command::Command;
use super::env::ToolchainEnvironment;
use super::{Toolchain, ToolchainFlavor, is_cxx_source};

/// Recognized compile options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
  pub build_type: BuildType,
  /// Stop after macro expansion and write the preprocessed source.
  pub only_preprocessor: bool,
  /// Define the wide-character API macros.
  pub unicode_support: bool,
  /// Emit position independent code (objects for dynamic libraries).
  pub position_independent: bool,
  /// Extra flags appended verbatim.
  pub flags: Vec<String>,
}

/// Compile one translation unit.
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
  pub source: &'a Path,
  /// Object file, or preprocessed output with `only_preprocessor`.
  pub output: &'a Path,
  pub includes: &'a [PathBuf],
  pub macros: &'a BTreeMap<String, MacroValue>,
  pub options: &'a CompileOptions,
  pub env: &'a ToolchainEnvironment,
}

/// Shape of a link step's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
  StaticLibrary,
  DynamicLibrary,
  Executable,
}

/// Link objects and libraries into one artifact.
#[derive(Debug, Clone)]
pub struct LinkRequest<'a> {
  pub objects: &'a [PathBuf],
  /// Library artifacts of dependencies, already in link order.
  pub libs: &'a [PathBuf],
  /// System libraries (`user32.lib`, `m`).
  pub system_libs: &'a [String],
  pub flags: &'a [String],
  pub output: &'a Path,
  /// Import library to produce alongside a dynamic library.
  pub import_library: Option<&'a Path>,
  pub kind: LinkKind,
  pub build_type: BuildType,
  /// Link with the C++ driver.
  pub cxx: bool,
  pub env: &'a ToolchainEnvironment,
}

const UNICODE_MACROS: [&str; 2] = ["UNICODE", "_UNICODE"];

fn define(flavor: ToolchainFlavor, name: &str, value: &MacroValue) -> String {
  let prefix = match flavor {
    ToolchainFlavor::Msvc => "/D",
    ToolchainFlavor::Gnu => "-D",
  };
  format!("{}{}={}", prefix, name, value)
}

/// Synthesize the command compiling a single source file.
pub fn synthesize_compile(toolchain: &Toolchain, request: &CompileRequest<'_>) -> Command {
  let options = request.options;
  let cxx = is_cxx_source(request.source);

  let mut macros = request.macros.clone();
  if options.unicode_support {
    for name in UNICODE_MACROS {
      macros.entry(name.to_string()).or_insert(MacroValue::Int(1));
    }
  }

  let program = if cxx { &toolchain.cxx } else { &toolchain.cc };
  let mut cmd = Command::new(program.as_str());

  match toolchain.flavor {
    ToolchainFlavor::Msvc => {
      cmd = cmd.arg("/nologo");
      if options.only_preprocessor {
        cmd = cmd.arg("/P").arg(format!("/Fi{}", request.output.display()));
      } else {
        cmd = cmd.arg("/c").arg(format!("/Fo{}", request.output.display()));
      }
      cmd = cmd.args(["/W4", "/GR-"]);
      if cxx {
        cmd = cmd.arg("/std:c++20");
      }
      cmd = match options.build_type {
        // /FS serializes PDB writes from parallel cl.exe processes.
        BuildType::Debug => cmd.args(["/MTd", "/Zi", "/FS", "/Od"]),
        BuildType::Release => cmd.args(["/MT", "/O2"]),
      };
      for inc in request.includes {
        cmd = cmd.arg(format!("/I{}", inc.display()));
      }
    }
    ToolchainFlavor::Gnu => {
      cmd = cmd.arg(if options.only_preprocessor { "-E" } else { "-c" });
      cmd = cmd.arg("-o").path_arg(request.output);
      cmd = cmd.args(["-Wall", "-Wextra"]);
      if cxx {
        cmd = cmd.arg("-std=c++20");
      }
      cmd = match options.build_type {
        BuildType::Debug => cmd.args(["-g", "-O0"]),
        BuildType::Release => cmd.arg("-O2"),
      };
      if options.position_independent {
        cmd = cmd.arg("-fPIC");
      }
      for inc in request.includes {
        cmd = cmd.arg(format!("-I{}", inc.display()));
      }
    }
  }

  for (name, value) in &macros {
    cmd = cmd.arg(define(toolchain.flavor, name, value));
  }
  cmd = cmd.args(options.flags.iter().cloned());
  cmd.path_arg(request.source).toolchain_env(request.env)
}

/// Synthesize the command producing a library or executable from objects.
pub fn synthesize_link(toolchain: &Toolchain, request: &LinkRequest<'_>) -> Command {
  let mut cmd = match (toolchain.flavor, request.kind) {
    (ToolchainFlavor::Msvc, LinkKind::StaticLibrary) => Command::new(toolchain.archiver.as_str())
      .arg("/nologo")
      .arg(format!("/OUT:{}", request.output.display())),
    (ToolchainFlavor::Msvc, kind) => {
      let mut cmd = Command::new(toolchain.linker.as_str())
        .arg("/nologo")
        .arg(format!("/OUT:{}", request.output.display()));
      if kind == LinkKind::DynamicLibrary {
        cmd = cmd.arg("/DLL");
        if let Some(implib) = request.import_library {
          cmd = cmd.arg(format!("/IMPLIB:{}", implib.display()));
        }
      }
      if request.build_type == BuildType::Debug {
        cmd = cmd.arg("/DEBUG:FULL");
      }
      cmd
    }
    (ToolchainFlavor::Gnu, LinkKind::StaticLibrary) => Command::new(toolchain.archiver.as_str())
      .arg("rcs")
      .path_arg(request.output),
    (ToolchainFlavor::Gnu, kind) => {
      let program = if request.cxx { &toolchain.linker } else { &toolchain.cc };
      let mut cmd = Command::new(program.as_str());
      if kind == LinkKind::DynamicLibrary {
        cmd = cmd.arg("-shared");
      }
      if request.build_type == BuildType::Debug {
        cmd = cmd.arg("-g");
      }
      cmd.arg("-o").path_arg(request.output)
    }
  };

  for obj in request.objects {
    cmd = cmd.path_arg(obj);
  }

  // Archives only bundle objects; dependencies are resolved at the final link.
  if request.kind != LinkKind::StaticLibrary {
    for lib in request.libs {
      cmd = cmd.path_arg(lib);
    }
    for lib in request.system_libs {
      cmd = cmd.arg(system_lib_arg(toolchain.flavor, lib));
    }
    cmd = cmd.args(request.flags.iter().cloned());
  }

  cmd.toolchain_env(request.env)
}

fn system_lib_arg(flavor: ToolchainFlavor, lib: &str) -> String {
  let is_file = lib.contains('/') || lib.contains('\\') || lib.ends_with(".lib") || lib.ends_with(".a");
  match flavor {
    ToolchainFlavor::Gnu if !is_file && !lib.starts_with('-') => format!("-l{}", lib),
    _ => lib.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn macros() -> BTreeMap<String, MacroValue> {
    let mut m = BTreeMap::new();
    m.insert("GARDEN_GAMEPLAY_DLL_NAME".to_string(), MacroValue::from("garden_gameplay.dll"));
    m.insert("GARDEN_GAMEPLAY_CODE".to_string(), MacroValue::Int(1));
    m
  }

  fn compile(toolchain: &Toolchain, options: &CompileOptions, source: &str) -> Command {
    let includes = vec![PathBuf::from("glad"), PathBuf::from("imgui")];
    let macros = macros();
    let env = ToolchainEnvironment::default();
    synthesize_compile(
      toolchain,
      &CompileRequest {
        source: Path::new(source),
        output: Path::new("build/Debug/obj/garden/garden.obj"),
        includes: &includes,
        macros: &macros,
        options,
        env: &env,
      },
    )
  }

  #[test]
  fn compile_is_deterministic() {
    let options = CompileOptions {
      unicode_support: true,
      ..CompileOptions::default()
    };
    let first = compile(&Toolchain::msvc(), &options, "code/garden.cpp");
    let second = compile(&Toolchain::msvc(), &options, "code/garden.cpp");
    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
  }

  #[test]
  fn msvc_compile_shape() {
    let cmd = compile(&Toolchain::msvc(), &CompileOptions::default(), "code/garden.cpp");
    assert_eq!(cmd.program, "cl.exe");
    assert!(cmd.args.contains(&"/c".to_string()));
    assert!(cmd.args.contains(&"/std:c++20".to_string()));
    assert!(cmd.args.contains(&"/MTd".to_string()));
    assert!(cmd.args.contains(&"/Iglad".to_string()));
    assert!(cmd.args.contains(&"/DGARDEN_GAMEPLAY_CODE=1".to_string()));
    assert!(cmd.args.contains(&"/DGARDEN_GAMEPLAY_DLL_NAME=garden_gameplay.dll".to_string()));
    assert_eq!(cmd.args.last().map(String::as_str), Some("code/garden.cpp"));
  }

  #[test]
  fn unicode_support_adds_wide_char_macros() {
    let plain = compile(&Toolchain::gnu(), &CompileOptions::default(), "main.c");
    assert!(!plain.args.iter().any(|a| a.starts_with("-DUNICODE")));

    let options = CompileOptions {
      unicode_support: true,
      ..CompileOptions::default()
    };
    let wide = compile(&Toolchain::gnu(), &options, "main.c");
    assert!(wide.args.contains(&"-DUNICODE=1".to_string()));
    assert!(wide.args.contains(&"-D_UNICODE=1".to_string()));
  }

  #[test]
  fn only_preprocessor_stops_after_expansion() {
    let options = CompileOptions {
      only_preprocessor: true,
      ..CompileOptions::default()
    };
    let gnu = compile(&Toolchain::gnu(), &options, "main.c");
    assert!(gnu.args.contains(&"-E".to_string()));
    assert!(!gnu.args.contains(&"-c".to_string()));

    let msvc = compile(&Toolchain::msvc(), &options, "main.c");
    assert!(msvc.args.contains(&"/P".to_string()));
    assert!(!msvc.args.contains(&"/c".to_string()));
  }

  #[test]
  fn c_sources_use_c_compiler() {
    let cmd = compile(&Toolchain::gnu(), &CompileOptions::default(), "glad/glad.c");
    assert_eq!(cmd.program, "cc");
    assert!(!cmd.args.contains(&"-std=c++20".to_string()));
  }

  #[test]
  fn toolchain_env_is_attached() {
    let mut env = ToolchainEnvironment::default();
    env.insert("INCLUDE", r"C:\VC\include");
    let includes = Vec::new();
    let macros = BTreeMap::new();
    let options = CompileOptions::default();
    let cmd = synthesize_compile(
      &Toolchain::msvc(),
      &CompileRequest {
        source: Path::new("a.c"),
        output: Path::new("a.obj"),
        includes: &includes,
        macros: &macros,
        options: &options,
        env: &env,
      },
    );
    assert_eq!(cmd.env.get("INCLUDE").map(String::as_str), Some(r"C:\VC\include"));
  }

  fn link(toolchain: &Toolchain, kind: LinkKind) -> Command {
    let objects = vec![PathBuf::from("obj/a.o"), PathBuf::from("obj/b.o")];
    let libs = vec![PathBuf::from("out/libimgui.a")];
    let system_libs = vec!["m".to_string(), "user32.lib".to_string()];
    let env = ToolchainEnvironment::default();
    synthesize_link(
      toolchain,
      &LinkRequest {
        objects: &objects,
        libs: &libs,
        system_libs: &system_libs,
        flags: &[],
        output: Path::new("out/garden"),
        import_library: Some(Path::new("out/garden.lib")),
        kind,
        build_type: BuildType::Debug,
        cxx: true,
        env: &env,
      },
    )
  }

  #[test]
  fn dynamic_library_adds_shared_flag() {
    let exe = link(&Toolchain::gnu(), LinkKind::Executable);
    assert!(!exe.args.contains(&"-shared".to_string()));

    let gnu = link(&Toolchain::gnu(), LinkKind::DynamicLibrary);
    assert!(gnu.args.contains(&"-shared".to_string()));

    let msvc = link(&Toolchain::msvc(), LinkKind::DynamicLibrary);
    assert!(msvc.args.contains(&"/DLL".to_string()));
    assert!(msvc.args.contains(&"/IMPLIB:out/garden.lib".to_string()));
  }

  #[test]
  fn gnu_executable_link_order() {
    let cmd = link(&Toolchain::gnu(), LinkKind::Executable);
    assert_eq!(cmd.program, "c++");
    assert_eq!(
      cmd.args,
      vec!["-g", "-o", "out/garden", "obj/a.o", "obj/b.o", "out/libimgui.a", "-lm", "user32.lib"]
    );
  }

  #[test]
  fn static_library_only_archives_objects() {
    let cmd = link(&Toolchain::gnu(), LinkKind::StaticLibrary);
    assert_eq!(cmd.program, "ar");
    assert_eq!(cmd.args, vec!["rcs", "out/garden", "obj/a.o", "obj/b.o"]);

    let msvc = link(&Toolchain::msvc(), LinkKind::StaticLibrary);
    assert_eq!(msvc.program, "lib.exe");
    assert!(!msvc.args.contains(&"out/libimgui.a".to_string()));
  }

  #[test]
  fn link_is_deterministic() {
    let first = link(&Toolchain::msvc(), LinkKind::Executable);
    let second = link(&Toolchain::msvc(), LinkKind::Executable);
    assert_eq!(first.to_string(), second.to_string());
    assert!(first.args.contains(&"/DEBUG:FULL".to_string()));
  }
}
