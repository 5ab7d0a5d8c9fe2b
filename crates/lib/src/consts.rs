/// Default project declaration file name.
pub const DEFAULT_BUILD_FILE: &str = "build.lua";

/// Default output root, relative to the project directory.
pub const DEFAULT_OUTPUT_DIR: &str = "build";

/// Serialized toolchain environment inside a build type's output directory.
pub const TOOLCHAIN_ENV_FILE: &str = "toolchain.env";

/// Directory under a build type's output directory holding object files.
pub const OBJ_DIR: &str = "obj";

/// Metatable marker for target handles returned to Lua.
pub const TARGET_REF_TYPE: &str = "kiln.target";
