//! Process-wide exclusive repository lock.
//!
//! At most one mutating session may hold the lock over a repository root
//! at a time. The lock is an advisory OS-level lock on `<root>/lock`;
//! the file itself persists across sessions, only the lock state
//! matters. The lock is released when the handle is dropped, including
//! on every error path during session construction.

use crate::{Error, Result};
use fs2::FileExt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exclusive advisory lock over a repository root.
pub struct RepoLock {
    // Kept open to hold the lock; closing the handle releases it.
    _file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Acquire the lock on `<root>/lock`.
    ///
    /// `timeout_secs` selects the acquisition mode:
    /// - `0`: fail immediately with [`Error::LockBusy`] if the lock is held,
    /// - negative: block until the lock is obtained,
    /// - positive: block up to that many seconds, then fail with
    ///   [`Error::LockTimeout`].
    ///
    /// The bounded wait polls with a deadline; no signal handler or timer
    /// state is touched.
    pub fn acquire(root: &Path, timeout_secs: i64) -> Result<Self> {
        let path = root.join("lock");
        let file = File::create(&path)?;

        if timeout_secs == 0 {
            match file.try_lock_exclusive() {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(Error::LockBusy),
                Err(e) => return Err(e.into()),
            }
        } else if timeout_secs < 0 {
            file.lock_exclusive()?;
        } else {
            let deadline = Instant::now() + Duration::from_secs(timeout_secs as u64);
            loop {
                match file.try_lock_exclusive() {
                    Ok(()) => break,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        if Instant::now() >= deadline {
                            return Err(Error::LockTimeout {
                                secs: timeout_secs as u64,
                            });
                        }
                        thread::sleep(POLL_INTERVAL);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        debug!("acquired repository lock at {}", path.display());
        Ok(Self { _file: file, path })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        // The OS releases the lock when the file handle closes.
        debug!("released repository lock at {}", self.path.display());
    }
}
