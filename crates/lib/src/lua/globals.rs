//! The `kiln` global table.
//!
//! - `kiln.build_type`, `kiln.os`, `kiln.arch`, `kiln.platform`, `kiln.dir`
//! - `kiln.path`: string path helpers
//! - `kiln.add_*{}` and `kiln.target_*()`: target declarations
//!
//! Scripts see a read-only proxy; assigning to any `kiln` field is an error.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;

use super::helpers;
use crate::platform::Platform;
use crate::request::BuildType;
use crate::target::TargetGraph;
use crate::target::lua::register_target_api;

/// Register the `kiln` global table.
pub fn register_globals(
  lua: &Lua,
  graph: Rc<RefCell<TargetGraph>>,
  project_dir: &Path,
  build_type: BuildType,
) -> LuaResult<()> {
  let kiln = lua.create_table()?;

  let platform = Platform::current().ok_or_else(|| LuaError::external("unsupported host platform"))?;
  kiln.set("platform", platform.triple())?;
  kiln.set("os", platform.os.as_str())?;
  kiln.set("arch", platform.arch.as_str())?;
  kiln.set("build_type", build_type.as_str())?;
  kiln.set("dir", project_dir.to_string_lossy().into_owned())?;

  kiln.set("path", helpers::path::create_path_helpers(lua)?)?;

  register_target_api(lua, &kiln, graph, project_dir)?;

  let proxy = lua.create_table()?;
  let mt = lua.create_table()?;
  mt.set("__index", kiln)?;
  mt.set(
    "__newindex",
    lua.create_function(|_, (_, key, _): (LuaValue, LuaValue, LuaValue)| -> LuaResult<()> {
      let key = match key {
        LuaValue::String(s) => s.to_string_lossy(),
        other => format!("{:?}", other),
      };
      Err(LuaError::external(format!("kiln.{} is read-only", key)))
    })?,
  )?;
  mt.set("__metatable", false)?;
  proxy.set_metatable(Some(mt))?;

  lua.globals().set("kiln", proxy)?;
  Ok(())
}
