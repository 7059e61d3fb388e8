//! Per-environment run lock.
//!
//! A deploy holds an exclusive lock on `<state_dir>/<environment>.lock` from
//! the moment it loads the state document until after it persists it, so two
//! runs against the same environment can never interleave their writes.
//! Read-only commands take a shared lock.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::StateError;
use super::storage::StateFiles;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub environment: String,
}

#[derive(Debug, Error)]
pub enum StateLockError {
  #[error(
    "environment '{environment}' is locked by another run: {command} (PID {pid}, started at Unix timestamp {started_at})\n\
             If you're sure no appfleet process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    environment: String,
    command: String,
    pid: u32,
    started_at: u64,
    lock_path: PathBuf,
  },

  #[error(
    "environment '{environment}' is locked (could not read lock metadata)\n\
             If you're sure no appfleet process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { environment: String, lock_path: PathBuf },

  #[error(transparent)]
  State(#[from] StateError),

  #[error("failed to create state directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// Held lock; released when dropped.
#[derive(Debug)]
pub struct StateLock {
  file: File,
  lock_path: PathBuf,
}

impl StateLock {
  /// Acquire the lock for `environment` without blocking.
  pub fn acquire(
    files: &StateFiles,
    environment: &str,
    mode: LockMode,
    command: &str,
  ) -> Result<Self, StateLockError> {
    let lock_path = files.lock_path(environment)?;

    std::fs::create_dir_all(files.base_path()).map_err(StateLockError::CreateDir)?;

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(StateLockError::OpenFile)?;

    if let Err(err) = try_lock(&file, mode) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(Self::read_contention_error(environment, &lock_path));
      }
      return Err(StateLockError::LockFailed(err));
    }

    if mode == LockMode::Exclusive {
      Self::write_metadata(&file, command, environment)?;
    }

    Ok(StateLock { file, lock_path })
  }

  /// Reads the lock metadata from the held file handle.
  ///
  /// Opening a second handle would fail on Windows while the lock is held.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  fn write_metadata(file: &File, command: &str, environment: &str) -> Result<(), StateLockError> {
    let metadata = LockMetadata {
      version: 1,
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      command: command.to_string(),
      environment: environment.to_string(),
    };

    file.set_len(0).map_err(StateLockError::WriteMetadata)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &metadata)
      .map_err(|e| StateLockError::WriteMetadata(io::Error::other(e)))?;
    writer.flush().map_err(StateLockError::WriteMetadata)?;

    Ok(())
  }

  fn read_contention_error(environment: &str, lock_path: &Path) -> StateLockError {
    if let Ok(mut file) = File::open(lock_path) {
      let mut contents = String::new();
      if file.read_to_string(&mut contents).is_ok()
        && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
      {
        return StateLockError::Contention {
          environment: environment.to_string(),
          command: metadata.command,
          pid: metadata.pid,
          started_at: metadata.started_at_unix,
          lock_path: lock_path.to_path_buf(),
        };
      }
    }

    StateLockError::ContentionUnknown {
      environment: environment.to_string(),
      lock_path: lock_path.to_path_buf(),
    }
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
  // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
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

  fn temp_files() -> (TempDir, StateFiles) {
    let temp_dir = TempDir::new().unwrap();
    let files = StateFiles::new(temp_dir.path().to_path_buf());
    (temp_dir, files)
  }

  #[test]
  fn acquire_exclusive_lock() {
    let (_temp, files) = temp_files();
    let lock = StateLock::acquire(&files, "production", LockMode::Exclusive, "deploy").unwrap();
    assert!(lock.lock_path().exists());
    assert!(lock.lock_path().ends_with("production.lock"));
  }

  #[test]
  fn multiple_shared_locks() {
    let (_temp, files) = temp_files();
    let lock1 = StateLock::acquire(&files, "production", LockMode::Shared, "status").unwrap();
    let lock2 = StateLock::acquire(&files, "production", LockMode::Shared, "history").unwrap();
    assert_eq!(lock1.lock_path(), lock2.lock_path());
  }

  #[test]
  fn lock_metadata_written() {
    let (_temp, files) = temp_files();
    let lock = StateLock::acquire(&files, "production", LockMode::Exclusive, "deploy").unwrap();

    let metadata = lock.read_metadata().unwrap();

    assert_eq!(metadata.version, 1);
    assert_eq!(metadata.command, "deploy");
    assert_eq!(metadata.environment, "production");
    assert_eq!(metadata.pid, std::process::id());
  }

  #[cfg(unix)]
  #[test]
  fn second_exclusive_lock_contends() {
    let (_temp, files) = temp_files();
    let _held = StateLock::acquire(&files, "production", LockMode::Exclusive, "deploy").unwrap();

    let err = StateLock::acquire(&files, "production", LockMode::Exclusive, "deploy").unwrap_err();
    assert!(matches!(err, StateLockError::Contention { ref command, .. } if command == "deploy"));
  }

  #[test]
  fn different_environments_do_not_contend() {
    let (_temp, files) = temp_files();
    let _prod = StateLock::acquire(&files, "production", LockMode::Exclusive, "deploy").unwrap();
    let staging = StateLock::acquire(&files, "staging", LockMode::Exclusive, "deploy");
    assert!(staging.is_ok());
  }

  #[test]
  fn lock_released_on_drop() {
    let (_temp, files) = temp_files();
    {
      let _lock = StateLock::acquire(&files, "production", LockMode::Exclusive, "deploy").unwrap();
    }

    let lock2 = StateLock::acquire(&files, "production", LockMode::Exclusive, "deploy").unwrap();
    assert!(lock2.lock_path().exists());
  }

  #[test]
  fn invalid_environment_rejected() {
    let (_temp, files) = temp_files();
    assert!(matches!(
      StateLock::acquire(&files, "../x", LockMode::Exclusive, "deploy"),
      Err(StateLockError::State(StateError::InvalidEnvironment(_)))
    ));
  }
}
