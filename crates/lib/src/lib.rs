//! kiln-lib: target graph and build engine for kiln
//!
//! This crate provides the pieces the `kiln` CLI drives:
//! - `target`: the declarative graph of libraries, executables, external
//!   libraries and packages, with public/private attribute propagation
//! - `eval`: evaluation of a Lua project declaration into a target graph
//! - `toolchain`: command synthesis and the cached toolchain environment
//! - `external`: configure/build of vendored trees through a secondary tool
//! - `execute`: the build driver (dependency waves, failure cascading)
//! - `guard`: the output safety guard for locked artifacts

pub mod artifact;
pub mod consts;
pub mod eval;
pub mod execute;
pub mod external;
pub mod guard;
pub mod lua;
pub mod output_lock;
pub mod platform;
pub mod request;
pub mod target;
pub mod toolchain;
pub mod util;
