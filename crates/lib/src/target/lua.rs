//! Lua bindings for declaring targets.
//!
//! This module registers on the `kiln` table:
//! - `kiln.add_library{}`, `kiln.add_executable{}`,
//!   `kiln.add_external_library{}`, `kiln.add_package{}`
//! - `kiln.target_includes()`, `kiln.target_macros()`, `kiln.target_links()`
//!
//! Constructors return a handle table marked with a metatable `__type` field.
//! Declaration tables are closed: unknown keys are rejected. Graph errors are
//! raised as external Lua errors so evaluation can recover them typed.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::prelude::*;

use super::{Access, ExternalSpec, ExternalToolKind, GraphError, MacroValue, TargetGraph, TargetId, TargetOptions};
use crate::consts::TARGET_REF_TYPE;

const LIBRARY_KEYS: &[&str] = &["name", "sources", "dynamic", "options"];
const EXECUTABLE_KEYS: &[&str] = &["name", "sources", "options"];
const EXTERNAL_KEYS: &[&str] = &["name", "location", "tool", "artifact", "options"];
const PACKAGE_KEYS: &[&str] = &["name", "targets"];

/// Macro names must be string keys that are valid C identifiers.
fn macro_name(key: &LuaValue, target: &str) -> LuaResult<String> {
  let LuaValue::String(key) = key else {
    return Err(invalid(target, "macros must be a table of NAME = value"));
  };
  let key = key.to_str()?.to_string();
  let mut chars = key.chars();
  let valid = chars.next().is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
    && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());
  if !valid {
    return Err(invalid(target, format!("'{}' is not a valid macro name", key)));
  }
  Ok(key)
}

fn invalid(target: &str, message: impl Into<String>) -> LuaError {
  LuaError::external(GraphError::InvalidDeclaration {
    target: target.to_string(),
    message: message.into(),
  })
}

/// Reject any key of `table` not in `allowed`.
fn check_keys(table: &LuaTable, allowed: &[&str], target: &str, what: &str) -> LuaResult<()> {
  for pair in table.pairs::<LuaValue, LuaValue>() {
    let (key, _) = pair?;
    let known = match &key {
      LuaValue::String(s) => {
        let s = s.to_str()?;
        allowed.contains(&&*s)
      }
      _ => false,
    };
    if !known {
      let key = match &key {
        LuaValue::String(s) => s.to_str()?.to_string(),
        other => format!("{:?}", other),
      };
      return Err(invalid(target, format!("unknown key '{}' in {}", key, what)));
    }
  }
  Ok(())
}

fn required_name(spec: &LuaTable, what: &str) -> LuaResult<String> {
  match spec.get::<LuaValue>("name")? {
    LuaValue::String(s) => Ok(s.to_str()?.to_string()),
    _ => Err(LuaError::external(format!("{} requires a string 'name' field", what))),
  }
}

/// A sequence of strings. A lone string counts as a one-element list.
fn string_list(value: LuaValue, target: &str, field: &str) -> LuaResult<Vec<String>> {
  match value {
    LuaValue::Nil => Ok(Vec::new()),
    LuaValue::String(s) => Ok(vec![s.to_str()?.to_string()]),
    LuaValue::Table(t) => t
      .sequence_values::<LuaValue>()
      .map(|v| match v? {
        LuaValue::String(s) => Ok(s.to_str()?.to_string()),
        other => Err(invalid(
          target,
          format!("'{}' entries must be strings, got {}", field, other.type_name()),
        )),
      })
      .collect(),
    other => Err(invalid(
      target,
      format!("'{}' must be a list of strings, got {}", field, other.type_name()),
    )),
  }
}

fn resolve_path(dir: &Path, path: &str) -> PathBuf {
  let path = Path::new(path);
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    dir.join(path)
  }
}

fn path_list(value: LuaValue, dir: &Path, target: &str, field: &str) -> LuaResult<Vec<PathBuf>> {
  Ok(
    string_list(value, target, field)?
      .iter()
      .map(|p| resolve_path(dir, p))
      .collect(),
  )
}

fn parse_options(value: LuaValue, target: &str) -> LuaResult<TargetOptions> {
  let table = match value {
    LuaValue::Nil => return Ok(TargetOptions::default()),
    LuaValue::Table(t) => t,
    other => return Err(invalid(target, format!("'options' must be a table, got {}", other.type_name()))),
  };
  check_keys(&table, TargetOptions::KEYS, target, "options")?;

  let unicode_support = match table.get::<LuaValue>("unicode_support")? {
    LuaValue::Nil => false,
    LuaValue::Boolean(b) => b,
    other => {
      return Err(invalid(
        target,
        format!("'unicode_support' must be a boolean, got {}", other.type_name()),
      ));
    }
  };

  Ok(TargetOptions {
    unicode_support,
    compile_flags: string_list(table.get("compile_flags")?, target, "compile_flags")?,
    link_flags: string_list(table.get("link_flags")?, target, "link_flags")?,
    libs: string_list(table.get("libs")?, target, "libs")?,
  })
}

fn macro_value(value: LuaValue, target: &str, name: &str) -> LuaResult<MacroValue> {
  match value {
    LuaValue::Integer(i) => Ok(MacroValue::Int(i)),
    LuaValue::Number(n) if n.fract() == 0.0 => Ok(MacroValue::Int(n as i64)),
    LuaValue::String(s) => Ok(MacroValue::Str(s.to_str()?.to_string())),
    other => Err(invalid(
      target,
      format!("macro '{}' must be a string or an integer, got {}", name, other.type_name()),
    )),
  }
}

/// Configure-step options of an external library, sorted by key.
fn external_options(value: LuaValue, target: &str) -> LuaResult<Vec<(String, String)>> {
  let table = match value {
    LuaValue::Nil => return Ok(Vec::new()),
    LuaValue::Table(t) => t,
    other => return Err(invalid(target, format!("'options' must be a table, got {}", other.type_name()))),
  };
  let mut options = BTreeMap::new();
  for pair in table.pairs::<String, LuaValue>() {
    let (key, value) = pair?;
    let value = match value {
      LuaValue::String(s) => s.to_str()?.to_string(),
      LuaValue::Integer(i) => i.to_string(),
      LuaValue::Number(n) => n.to_string(),
      LuaValue::Boolean(b) => if b { "ON" } else { "OFF" }.to_string(),
      other => {
        return Err(invalid(
          target,
          format!("option '{}' must be a string, number or boolean, got {}", key, other.type_name()),
        ));
      }
    };
    options.insert(key, value);
  }
  Ok(options.into_iter().collect())
}

/// Create the handle table returned to Lua for a registered target.
fn target_handle(lua: &Lua, graph: &TargetGraph, id: TargetId) -> LuaResult<LuaTable> {
  let target = graph.get(id);
  let handle = lua.create_table()?;
  handle.set("name", target.name.as_str())?;
  handle.set("kind", target.kind.as_str())?;

  let mt = lua.create_table()?;
  mt.set("__type", TARGET_REF_TYPE)?;
  handle.set_metatable(Some(mt))?;
  Ok(handle)
}

/// Resolve a handle table or a target name.
fn target_ref(graph: &TargetGraph, value: &LuaValue) -> LuaResult<TargetId> {
  let name = match value {
    LuaValue::String(s) => s.to_str()?.to_string(),
    LuaValue::Table(t)
      if t
        .metatable()
        .and_then(|mt| mt.get::<String>("__type").ok())
        .is_some_and(|ty| ty == TARGET_REF_TYPE) =>
    {
      t.get::<String>("name")?
    }
    other => {
      return Err(LuaError::external(format!(
        "expected a target handle or name, got {}",
        other.type_name()
      )));
    }
  };
  graph
    .id_of(&name)
    .ok_or_else(|| LuaError::external(GraphError::UnknownTarget(name)))
}

fn target_refs(graph: &TargetGraph, value: LuaValue, what: &str) -> LuaResult<Vec<TargetId>> {
  match value {
    LuaValue::Table(t) if t.metatable().is_none() => t
      .sequence_values::<LuaValue>()
      .map(|v| target_ref(graph, &v?))
      .collect(),
    LuaValue::Nil => Ok(Vec::new()),
    single => Ok(vec![target_ref(graph, &single).map_err(|e| {
      LuaError::external(format!("{} must be a list of target handles or names: {}", what, e))
    })?]),
  }
}

/// `(handle, [access], value)`: when only two arguments are given the access
/// level is private.
fn split_access(second: LuaValue, third: LuaValue) -> LuaResult<(Access, LuaValue)> {
  match third {
    LuaValue::Nil => Ok((Access::Private, second)),
    value => {
      let access = match second {
        LuaValue::String(s) => s.to_str()?.parse::<Access>().map_err(LuaError::external)?,
        other => {
          return Err(LuaError::external(format!(
            "access level must be 'public' or 'private', got {}",
            other.type_name()
          )));
        }
      };
      Ok((access, value))
    }
  }
}

/// Register the target declaration functions on the `kiln` table.
pub fn register_target_api(
  lua: &Lua,
  kiln: &LuaTable,
  graph: Rc<RefCell<TargetGraph>>,
  project_dir: &Path,
) -> LuaResult<()> {
  // kiln.add_library{ name, sources, dynamic, options }
  {
    let graph = graph.clone();
    let dir = project_dir.to_path_buf();
    kiln.set(
      "add_library",
      lua.create_function(move |lua, spec: LuaTable| {
        let name = required_name(&spec, "add_library")?;
        check_keys(&spec, LIBRARY_KEYS, &name, "add_library")?;
        let sources = path_list(spec.get("sources")?, &dir, &name, "sources")?;
        let dynamic = spec.get::<Option<bool>>("dynamic")?.unwrap_or(false);
        let options = parse_options(spec.get("options")?, &name)?;

        let mut graph = graph.borrow_mut();
        let id = graph.add_library(&name, sources, dynamic).map_err(LuaError::external)?;
        graph.set_options(id, options).map_err(LuaError::external)?;
        target_handle(lua, &graph, id)
      })?,
    )?;
  }

  // kiln.add_executable{ name, sources, options }
  {
    let graph = graph.clone();
    let dir = project_dir.to_path_buf();
    kiln.set(
      "add_executable",
      lua.create_function(move |lua, spec: LuaTable| {
        let name = required_name(&spec, "add_executable")?;
        check_keys(&spec, EXECUTABLE_KEYS, &name, "add_executable")?;
        let sources = path_list(spec.get("sources")?, &dir, &name, "sources")?;
        let options = parse_options(spec.get("options")?, &name)?;

        let mut graph = graph.borrow_mut();
        let id = graph.add_executable(&name, sources).map_err(LuaError::external)?;
        graph.set_options(id, options).map_err(LuaError::external)?;
        target_handle(lua, &graph, id)
      })?,
    )?;
  }

  // kiln.add_external_library{ name, location, tool, artifact, options }
  {
    let graph = graph.clone();
    let dir = project_dir.to_path_buf();
    kiln.set(
      "add_external_library",
      lua.create_function(move |lua, spec: LuaTable| {
        let name = required_name(&spec, "add_external_library")?;
        check_keys(&spec, EXTERNAL_KEYS, &name, "add_external_library")?;
        let location = spec
          .get::<Option<String>>("location")?
          .ok_or_else(|| invalid(&name, "an external library requires a 'location'"))?;
        let tool = match spec.get::<Option<String>>("tool")? {
          Some(tool) => tool.parse::<ExternalToolKind>().map_err(|e| invalid(&name, e))?,
          None => ExternalToolKind::default(),
        };
        let external = ExternalSpec {
          location: resolve_path(&dir, &location),
          tool,
          artifact: spec.get::<Option<String>>("artifact")?.map(PathBuf::from),
          options: external_options(spec.get("options")?, &name)?,
        };

        let mut graph = graph.borrow_mut();
        let id = graph.add_external_library(&name, external).map_err(LuaError::external)?;
        target_handle(lua, &graph, id)
      })?,
    )?;
  }

  // kiln.add_package{ name, targets }
  {
    let graph = graph.clone();
    kiln.set(
      "add_package",
      lua.create_function(move |lua, spec: LuaTable| {
        let name = required_name(&spec, "add_package")?;
        check_keys(&spec, PACKAGE_KEYS, &name, "add_package")?;

        let mut graph = graph.borrow_mut();
        let members = target_refs(&graph, spec.get("targets")?, "targets")?;
        let id = graph.add_package(&name, &members).map_err(LuaError::external)?;
        target_handle(lua, &graph, id)
      })?,
    )?;
  }

  // kiln.target_includes(handle, [access], { dirs })
  {
    let graph = graph.clone();
    let dir = project_dir.to_path_buf();
    kiln.set(
      "target_includes",
      lua.create_function(move |_, (handle, second, third): (LuaValue, LuaValue, LuaValue)| {
        let (access, dirs) = split_access(second, third)?;
        let mut graph = graph.borrow_mut();
        let id = target_ref(&graph, &handle)?;
        let name = graph.get(id).name.clone();
        let dirs = path_list(dirs, &dir, &name, "includes")?;
        graph.target_includes(id, access, dirs).map_err(LuaError::external)
      })?,
    )?;
  }

  // kiln.target_macros(handle, [access], { NAME = value })
  {
    let graph = graph.clone();
    kiln.set(
      "target_macros",
      lua.create_function(move |_, (handle, second, third): (LuaValue, LuaValue, LuaValue)| {
        let (access, macros) = split_access(second, third)?;
        let mut graph = graph.borrow_mut();
        let id = target_ref(&graph, &handle)?;
        let name = graph.get(id).name.clone();

        let LuaValue::Table(macros) = macros else {
          return Err(invalid(&name, "macros must be a table of NAME = value"));
        };
        let mut defs = BTreeMap::new();
        for pair in macros.pairs::<LuaValue, LuaValue>() {
          let (key, value) = pair?;
          let key = macro_name(&key, &name)?;
          let value = macro_value(value, &name, &key)?;
          defs.insert(key, value);
        }
        graph.target_macros(id, access, defs).map_err(LuaError::external)
      })?,
    )?;
  }

  // kiln.target_links(handle, { handle_or_name, ... })
  kiln.set(
    "target_links",
    lua.create_function(move |_, (handle, deps): (LuaValue, LuaValue)| {
      let mut graph = graph.borrow_mut();
      let id = target_ref(&graph, &handle)?;
      let deps = target_refs(&graph, deps, "links")?;
      graph.target_links(id, &deps).map_err(LuaError::external)
    })?,
  )?;

  Ok(())
}
