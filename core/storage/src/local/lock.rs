//! Advisory per-path file locking.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use stratus_common::{Error, Result};

/// Suffix appended to the guarded path to form the lock sidecar.
pub(crate) const LOCK_SUFFIX: &str = ".lock";

/// Poll interval while waiting for a contended lock.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Exclusive advisory lock on a single filesystem path.
///
/// The lock is backed by a sidecar file created with create-new semantics:
/// whichever caller creates `<path>.lock` first holds the lock. The sidecar
/// is removed when the guard drops, on every exit path.
///
/// This is advisory only. It serializes operations issued through this
/// driver implementation on one host; it does not restrain other hosts or
/// non-cooperating processes.
#[derive(Debug)]
pub(crate) struct PathLock {
    lock_path: PathBuf,
}

impl PathLock {
    /// Acquire an exclusive lock for `path`, waiting up to `timeout`.
    ///
    /// # Errors
    /// - `Error::Storage` ("Lock timeout") if the lock cannot be acquired
    ///   within `timeout`.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let lock_path = sidecar_path(path);
        let deadline = Instant::now() + timeout;

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(_) => return Ok(Self { lock_path }),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(Error::Storage(format!(
                            "Lock timeout: {}",
                            lock_path.display()
                        )));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_path);
    }
}

/// Lock sidecar path for `path` (`<path>.lock`).
fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

/// True if `name` is a lock sidecar file name.
pub(crate) fn is_lock_name(name: &str) -> bool {
    name.ends_with(LOCK_SUFFIX)
}
