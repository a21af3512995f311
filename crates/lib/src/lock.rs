//! Cross-process locks under the data directory.
//!
//! Readers never lock. Two kinds of writer do:
//!
//! - [`RecordsLock`] (`records.lock`) is held for a single read-modify-write
//!   of the records file. Writers from every process queue on it.
//! - [`BuildLock`] (`locks/<id>.lock`) is held by the process running a
//!   build of that package until the build has committed its result. The
//!   operating system releases it when the process dies, so a package that
//!   is `Building` while its lock is free was abandoned.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::PackageId;

const RECORDS_LOCK_FILENAME: &str = "records.lock";

/// Written into a build lock by its holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOwner {
  pub package: PackageId,
  pub pid: u32,
  pub started_at_unix: u64,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error("package {package} is being built by process {pid} (started at unix time {started_at_unix})")]
  Held {
    package: PackageId,
    pid: u32,
    started_at_unix: u64,
  },

  #[error("package {0} is being built by another process")]
  HeldUnknown(PackageId),

  #[error("failed to open lock file {}: {source}", .path.display())]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to lock {}: {source}", .path.display())]
  Lock {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to record build owner: {0}")]
  WriteOwner(#[source] io::Error),
}

impl LockError {
  /// The package whose build lock is held elsewhere, if that is the failure.
  pub fn held_package(&self) -> Option<PackageId> {
    match self {
      LockError::Held { package, .. } | LockError::HeldUnknown(package) => Some(*package),
      _ => None,
    }
  }
}

/// Exclusive right to mutate the records of one data directory.
#[derive(Debug)]
pub struct RecordsLock {
  _file: File,
}

impl RecordsLock {
  /// Wait until no other writer holds the lock, then take it.
  pub fn acquire(data_dir: &Path) -> Result<Self, LockError> {
    let path = data_dir.join(RECORDS_LOCK_FILENAME);
    let file = open_lock_file(&path)?;
    lock_exclusive(&file, Wait::Block).map_err(|source| LockError::Lock { path, source })?;
    Ok(Self { _file: file })
  }
}

/// Ownership of the running build of one package.
#[derive(Debug)]
pub struct BuildLock {
  _file: File,
}

impl BuildLock {
  /// Take the build lock of `package` in `dir` without waiting.
  ///
  /// Fails with `Held` (or `HeldUnknown` when the owner cannot be read) if
  /// another holder has it.
  pub fn try_acquire(dir: &Path, package: PackageId) -> Result<Self, LockError> {
    fs::create_dir_all(dir).map_err(|source| LockError::Open {
      path: dir.to_path_buf(),
      source,
    })?;

    let path = dir.join(format!("{}.lock", package));
    let file = open_lock_file(&path)?;
    if let Err(err) = lock_exclusive(&file, Wait::Fail) {
      if is_contended(&err) {
        return Err(read_holder(&path, package));
      }
      return Err(LockError::Lock { path, source: err });
    }

    write_owner(&file, package)?;
    Ok(Self { _file: file })
  }
}

fn open_lock_file(path: &Path) -> Result<File, LockError> {
  OpenOptions::new()
    .read(true)
    .write(true)
    .create(true)
    .truncate(false)
    .open(path)
    .map_err(|source| LockError::Open {
      path: path.to_path_buf(),
      source,
    })
}

fn write_owner(mut file: &File, package: PackageId) -> Result<(), LockError> {
  let owner = BuildOwner {
    package,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
  };

  file.set_len(0).map_err(LockError::WriteOwner)?;
  file.seek(SeekFrom::Start(0)).map_err(LockError::WriteOwner)?;
  serde_json::to_writer(file, &owner).map_err(|e| LockError::WriteOwner(io::Error::other(e)))?;
  file.flush().map_err(LockError::WriteOwner)
}

/// On Windows the held range cannot be read, which yields `HeldUnknown`.
fn read_holder(path: &Path, package: PackageId) -> LockError {
  let owner = fs::read_to_string(path)
    .ok()
    .and_then(|content| serde_json::from_str::<BuildOwner>(&content).ok());

  match owner {
    Some(owner) => LockError::Held {
      package,
      pid: owner.pid,
      started_at_unix: owner.started_at_unix,
    },
    None => LockError::HeldUnknown(package),
  }
}

#[derive(Debug, Clone, Copy)]
enum Wait {
  Block,
  Fail,
}

#[cfg(unix)]
fn lock_exclusive(file: &File, wait: Wait) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use rustix::io::Errno;
  use std::os::unix::io::AsFd;

  let operation = match wait {
    Wait::Block => FlockOperation::LockExclusive,
    Wait::Fail => FlockOperation::NonBlockingLockExclusive,
  };

  loop {
    match flock(file.as_fd(), operation) {
      Err(Errno::INTR) => continue,
      result => return result.map_err(io::Error::from),
    }
  }
}

#[cfg(unix)]
fn is_contended(err: &io::Error) -> bool {
  err.kind() == io::ErrorKind::WouldBlock
}

#[cfg(windows)]
fn lock_exclusive(file: &File, wait: Wait) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let flags = match wait {
    Wait::Block => LOCKFILE_EXCLUSIVE_LOCK,
    Wait::Fail => LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
  };

  // SAFETY: the handle is owned by `file` and outlives the call; a zeroed
  // OVERLAPPED selects offset 0 for the locked range.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(file.as_raw_handle() as HANDLE, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}

#[cfg(windows)]
fn is_contended(err: &io::Error) -> bool {
  use windows_sys::Win32::Foundation::ERROR_LOCK_VIOLATION;

  err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32)
}
