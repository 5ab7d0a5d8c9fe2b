//! Per-build-type output lock.
//!
//! `build` and `clean` for one build type write into the same output tree and
//! toolchain environment cache. An exclusive advisory lock on
//! `<output_root>/.<build_type>.lock` keeps two invocations from interleaving.
//! The lock file lives beside the build type directory so `clean` never
//! removes it while held.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::request::BuildType;

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub build_type: BuildType,
}

#[derive(Debug, Error)]
pub enum OutputLockError {
  #[error(
    "{build_type} outputs are locked by another process: {command} (PID {pid}, started at unix time {started_at_unix})\n\
     If you're sure no kiln process is running, remove the lock file:\n  {path}",
    path = .lock_path.display()
  )]
  Contention {
    build_type: BuildType,
    command: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "outputs are locked (could not read lock metadata)\n\
     If you're sure no kiln process is running, remove the lock file:\n  {path}",
    path = .lock_path.display()
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create output directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Held for the duration of a build or clean; released on drop.
#[derive(Debug)]
pub struct OutputLock {
  file: File,
  lock_path: PathBuf,
}

/// Lock file path for one build type.
pub fn lock_path(output_root: &Path, build_type: BuildType) -> PathBuf {
  output_root.join(format!(".{}.lock", build_type))
}

impl OutputLock {
  pub fn acquire(output_root: &Path, build_type: BuildType, command: &str) -> Result<Self, OutputLockError> {
    std::fs::create_dir_all(output_root).map_err(OutputLockError::CreateDir)?;
    let lock_path = lock_path(output_root, build_type);

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(OutputLockError::OpenFile)?;

    if let Err(err) = try_lock(&file) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(read_contention_error(&lock_path));
      }
      return Err(OutputLockError::LockFailed(err));
    }

    write_metadata(&file, command, build_type)?;
    debug!(path = %lock_path.display(), "acquired output lock");

    Ok(Self { file, lock_path })
  }

  /// Reads the metadata through the held handle; a second handle would be
  /// refused on Windows.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn write_metadata(file: &File, command: &str, build_type: BuildType) -> Result<(), OutputLockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    command: command.to_string(),
    build_type,
  };

  file.set_len(0).map_err(OutputLockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| OutputLockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(OutputLockError::WriteMetadata)?;
  Ok(())
}

fn read_contention_error(lock_path: &Path) -> OutputLockError {
  if let Ok(mut file) = File::open(lock_path) {
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_ok()
      && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
    {
      return OutputLockError::Contention {
        build_type: metadata.build_type,
        command: metadata.command,
        pid: metadata.pid,
        started_at_unix: metadata.started_at_unix,
        lock_path: lock_path.to_path_buf(),
      };
    }
  }

  OutputLockError::ContentionUnknown {
    lock_path: lock_path.to_path_buf(),
  }
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;

  // SAFETY: OVERLAPPED is plain data and valid when zeroed; the handle is
  // owned by `file` and open for the duration of the call.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(
      handle,
      LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
      0,
      1,
      0,
      &mut overlapped,
    )
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn lock_file_sits_beside_build_type_dir() {
    let path = lock_path(Path::new("out"), BuildType::Release);
    assert_eq!(path, Path::new("out").join(".Release.lock"));
  }

  #[test]
  fn metadata_is_written() {
    let temp = TempDir::new().unwrap();
    let lock = OutputLock::acquire(temp.path(), BuildType::Debug, "kiln build").unwrap();
    assert!(lock.lock_path().exists());

    let metadata = lock.read_metadata().unwrap();
    assert_eq!(metadata.version, 1);
    assert_eq!(metadata.command, "kiln build");
    assert_eq!(metadata.pid, std::process::id());
    assert_eq!(metadata.build_type, BuildType::Debug);
  }

  #[test]
  fn second_acquire_is_contended() {
    let temp = TempDir::new().unwrap();
    let _held = OutputLock::acquire(temp.path(), BuildType::Debug, "kiln build").unwrap();

    let err = OutputLock::acquire(temp.path(), BuildType::Debug, "kiln clean").unwrap_err();
    assert!(matches!(
      err,
      OutputLockError::Contention { .. } | OutputLockError::ContentionUnknown { .. }
    ));
  }

  #[test]
  fn build_types_lock_independently() {
    let temp = TempDir::new().unwrap();
    let _debug = OutputLock::acquire(temp.path(), BuildType::Debug, "kiln build").unwrap();
    let release = OutputLock::acquire(temp.path(), BuildType::Release, "kiln build");
    assert!(release.is_ok());
  }

  #[test]
  fn released_on_drop() {
    let temp = TempDir::new().unwrap();
    {
      let _lock = OutputLock::acquire(temp.path(), BuildType::Debug, "first").unwrap();
    }
    let lock = OutputLock::acquire(temp.path(), BuildType::Debug, "second").unwrap();
    assert_eq!(lock.read_metadata().unwrap().command, "second");
  }
}
