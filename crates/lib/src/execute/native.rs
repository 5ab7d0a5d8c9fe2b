//! Compile and link of a single native target.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::context::BuildContext;
use super::runner::{CommandOutput, CommandRunner};
use super::types::{ExecuteError, TargetOutcome};
use crate::artifact::{ArtifactKind, BuildArtifact};
use crate::guard::is_output_writable;
use crate::target::{TargetId, TargetKind};
use crate::toolchain::{
  Command, CompileOptions, CompileRequest, LinkKind, LinkRequest, ToolchainFlavor, is_cxx_source, synthesize_compile,
  synthesize_link,
};

/// Extension of preprocessed sources.
const PREPROCESSED_EXTENSION: &str = "i";

/// Object file paths for `sources`, one per source, inside `dir`.
///
/// Sources sharing a file stem get a numeric suffix so their objects do not
/// overwrite each other. Comparison ignores case.
pub fn object_paths(sources: &[PathBuf], dir: &Path, extension: &str) -> Vec<PathBuf> {
  let mut taken = HashSet::new();
  sources
    .iter()
    .map(|source| {
      let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());
      let mut file = format!("{}.{}", stem, extension);
      let mut n = 1;
      while !taken.insert(file.to_ascii_lowercase()) {
        file = format!("{}_{}.{}", stem, n, extension);
        n += 1;
      }
      dir.join(file)
    })
    .collect()
}

fn failure_message(cmd: &Command, output: &CommandOutput) -> String {
  let status = output.status.map_or("signal".to_string(), |c| c.to_string());
  // cl.exe reports diagnostics on stdout.
  let diagnostics = if output.stderr.trim().is_empty() {
    output.stdout.trim()
  } else {
    output.stderr.trim()
  };
  if diagnostics.is_empty() {
    format!("`{}` exited with {}", cmd, status)
  } else {
    format!("`{}` exited with {}:\n{}", cmd, status, diagnostics)
  }
}

fn artifact_kind(kind: TargetKind, only_preprocessor: bool) -> ArtifactKind {
  match kind {
    _ if only_preprocessor => ArtifactKind::ObjectSet,
    TargetKind::DynamicLibrary => ArtifactKind::DynamicLibrary,
    TargetKind::Executable => ArtifactKind::Executable,
    _ => ArtifactKind::StaticLibrary,
  }
}

/// The artifact a native target produces under the current request.
pub(super) fn expected_artifact(ctx: &BuildContext, id: TargetId) -> BuildArtifact {
  let target = ctx.graph.get(id);
  let kind = artifact_kind(target.kind, ctx.request.only_preprocessor);
  if kind == ArtifactKind::ObjectSet {
    return BuildArtifact::new(ctx.object_dir(&target.name), kind);
  }

  let mut artifact = BuildArtifact::new(
    ctx.build_dir().join(ctx.toolchain.artifact_file_name(&target.name, kind)),
    kind,
  );
  if kind == ArtifactKind::DynamicLibrary {
    artifact.import_library = ctx
      .toolchain
      .import_library_name(&target.name)
      .map(|name| ctx.build_dir().join(name));
  }
  artifact
}

/// Compile every source of `id`, then link (or archive) the objects.
///
/// `completed` holds the artifacts of targets built earlier in this
/// invocation; every dependency of `id` is in it.
pub(super) async fn build_native<R: CommandRunner>(
  ctx: &BuildContext,
  runner: &R,
  id: TargetId,
  completed: &HashMap<TargetId, BuildArtifact>,
) -> Result<TargetOutcome, ExecuteError> {
  let target = ctx.graph.get(id);
  let name = target.name.as_str();
  let artifact = expected_artifact(ctx, id);

  if artifact.kind != ArtifactKind::ObjectSet && !is_output_writable(&artifact.path) {
    warn!(
      target = %name,
      path = %artifact.path.display(),
      "output is in use, keeping the previous artifact"
    );
    return Ok(TargetOutcome::SkippedBusy(artifact));
  }

  let obj_dir = ctx.object_dir(name);
  tokio::fs::create_dir_all(&obj_dir).await?;

  let includes = ctx.graph.resolve_includes(id);
  let mut macros = ctx.request.macros();
  macros.extend(ctx.graph.resolve_macros(id));

  let options = CompileOptions {
    build_type: ctx.request.build_type,
    only_preprocessor: ctx.request.only_preprocessor,
    unicode_support: target.options.unicode_support,
    position_independent: target.kind == TargetKind::DynamicLibrary,
    flags: target.options.compile_flags.clone(),
  };

  let extension = if ctx.request.only_preprocessor {
    PREPROCESSED_EXTENSION
  } else {
    ctx.toolchain.object_extension()
  };
  let objects = object_paths(&target.sources, &obj_dir, extension);

  for (source, object) in target.sources.iter().zip(&objects) {
    let cmd = synthesize_compile(
      &ctx.toolchain,
      &CompileRequest {
        source,
        output: object,
        includes: &includes,
        macros: &macros,
        options: &options,
        env: &ctx.env,
      },
    );
    debug!(target = %name, command = %cmd, "compiling");
    let output = runner.run(&cmd).await.map_err(|e| ExecuteError::CompileFailed {
      target: name.to_string(),
      file: source.clone(),
      message: format!("could not run `{}`: {}", cmd.program, e),
    })?;
    if !output.success {
      return Err(ExecuteError::CompileFailed {
        target: name.to_string(),
        file: source.clone(),
        message: failure_message(&cmd, &output),
      });
    }
  }

  if artifact.kind == ArtifactKind::ObjectSet {
    info!(target = %name, dir = %obj_dir.display(), "preprocessed");
    return Ok(TargetOutcome::Built(artifact));
  }

  let closure = ctx.graph.link_closure(id);
  let libs: Vec<PathBuf> = closure
    .iter()
    .filter_map(|dep| completed.get(dep))
    .map(|a| a.link_input().to_path_buf())
    .collect();
  let cxx = std::iter::once(id)
    .chain(closure.iter().copied())
    .flat_map(|t| ctx.graph.get(t).sources.iter())
    .any(|s| is_cxx_source(s));

  let link_kind = match artifact.kind {
    ArtifactKind::DynamicLibrary => LinkKind::DynamicLibrary,
    ArtifactKind::Executable => LinkKind::Executable,
    _ => LinkKind::StaticLibrary,
  };

  let cmd = synthesize_link(
    &ctx.toolchain,
    &LinkRequest {
      objects: &objects,
      libs: &libs,
      system_libs: &target.options.libs,
      flags: &target.options.link_flags,
      output: &artifact.path,
      import_library: artifact.import_library.as_deref(),
      kind: link_kind,
      build_type: ctx.request.build_type,
      cxx,
      env: &ctx.env,
    },
  );

  // `ar rcs` appends to an existing archive.
  if link_kind == LinkKind::StaticLibrary && ctx.toolchain.flavor == ToolchainFlavor::Gnu {
    match tokio::fs::remove_file(&artifact.path).await {
      Err(err) if err.kind() != std::io::ErrorKind::NotFound => return Err(err.into()),
      _ => {}
    }
  }

  debug!(target = %name, command = %cmd, "linking");
  let output = runner.run(&cmd).await.map_err(|e| ExecuteError::LinkFailed {
    target: name.to_string(),
    message: format!("could not run `{}`: {}", cmd.program, e),
  })?;
  if !output.success {
    return Err(ExecuteError::LinkFailed {
      target: name.to_string(),
      message: failure_message(&cmd, &output),
    });
  }

  info!(target = %name, path = %artifact.path.display(), kind = %artifact.kind, "built");
  Ok(TargetOutcome::Built(artifact))
}
