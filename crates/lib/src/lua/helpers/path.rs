use std::path::{Path, PathBuf};

use mlua::prelude::*;

fn lossy(path: Option<&std::ffi::OsStr>) -> String {
  path.map(|p| p.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Create the `kiln.path` table.
///
/// Functions operate on strings only and never touch the filesystem.
pub fn create_path_helpers(lua: &Lua) -> LuaResult<LuaTable> {
  let path = lua.create_table()?;

  // join(a, b, ...): an absolute segment restarts the path
  path.set(
    "join",
    lua.create_function(|_, segments: LuaVariadic<String>| {
      let joined: PathBuf = segments.iter().collect();
      Ok(joined.to_string_lossy().into_owned())
    })?,
  )?;

  path.set(
    "dirname",
    lua.create_function(|_, p: String| Ok(lossy(Path::new(&p).parent().map(Path::as_os_str))))?,
  )?;

  path.set(
    "basename",
    lua.create_function(|_, p: String| Ok(lossy(Path::new(&p).file_name())))?,
  )?;

  // extname("a/b.cpp") == ".cpp"
  path.set(
    "extname",
    lua.create_function(|_, p: String| {
      Ok(
        Path::new(&p)
          .extension()
          .map(|ext| format!(".{}", ext.to_string_lossy()))
          .unwrap_or_default(),
      )
    })?,
  )?;

  Ok(path)
}
