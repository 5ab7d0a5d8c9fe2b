use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;

use crate::lua::globals;
use crate::request::BuildType;
use crate::target::TargetGraph;

/// Create a Lua VM with the `kiln` global registered.
///
/// `require` also searches `<project>/lua/?.lua` and `<project>/lua/?/init.lua`
/// so larger projects can split their declarations into modules.
pub fn create_runtime(graph: Rc<RefCell<TargetGraph>>, project_dir: &Path, build_type: BuildType) -> LuaResult<Lua> {
  let lua = Lua::new();

  let package = lua.globals().get::<LuaTable>("package")?;
  let search = project_dir.join("lua");
  let package_path = format!(
    "{};{};{}",
    search.join("?.lua").display(),
    search.join("?").join("init.lua").display(),
    package.get::<String>("path")?
  );
  package.set("path", package_path)?;

  globals::register_globals(&lua, graph, project_dir, build_type)?;
  Ok(lua)
}

/// Evaluate a declaration file. The chunk is named after the path so Lua
/// errors point at the right file and line.
pub fn load_file(lua: &Lua, path: &Path) -> LuaResult<()> {
  let source = std::fs::read_to_string(path)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", path.display(), e)))?;
  lua.load(&source).set_name(format!("@{}", path.display())).exec()
}
