//! Lua environment for project declarations.
//!
//! - [`runtime`] creates the VM and evaluates the declaration file
//! - [`globals`] registers the `kiln` table
//! - [`helpers`] holds helper tables such as `kiln.path`

pub mod globals;
pub mod helpers;
pub mod runtime;
