//! Output safety guard.
//!
//! A running executable (or a DLL mapped by one) cannot be overwritten on
//! Windows. Before rebuilding an artifact the driver asks whether it can be
//! opened for writing; if not, the rebuild of that artifact is skipped with a
//! warning and the previous artifact is reused. The check is advisory: a
//! process may grab the file right after it succeeds.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use tracing::debug;

/// Whether `path` may be overwritten. A path that does not exist yet is
/// writable; any failure to open an existing path for writing means busy.
pub fn is_output_writable(path: &Path) -> bool {
  match OpenOptions::new().write(true).open(path) {
    Ok(_) => true,
    Err(err) if err.kind() == io::ErrorKind::NotFound => true,
    Err(err) => {
      debug!(path = %path.display(), error = %err, "output is busy");
      false
    }
  }
}
