//! Advisory lock files.
//!
//! A soft lock is a plain file created with `create_new`; whoever manages to
//! create it owns the lock until the guard is dropped and the file removed.
//! Only cooperating processes are blocked, and a crashed owner leaves the file
//! behind, so stale locks are removed eagerly once per process and whenever a
//! holder gives up.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use thiserror::Error;
use tokio::time::sleep;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lock paths already swept for stale files by this process.
static SWEPT: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for lock {path:?}")]
    Timeout { path: PathBuf, waited: Duration },
    #[error("I/O error on lock {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Lock file bound to a path.
#[derive(Debug, Clone)]
pub struct SoftLock {
    path: PathBuf,
    timeout: Duration,
}

impl SoftLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Lock guarding `target`, stored next to it as `<target>.lock`.
    pub fn for_file(target: &Path, timeout: Duration) -> Self {
        let mut name = target.as_os_str().to_owned();
        name.push(".lock");
        Self::new(PathBuf::from(name), timeout)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove a leftover lock file the first time this path is seen in the
    /// process. Returns whether a sweep happened.
    pub fn sweep_stale_once(&self) -> bool {
        let mut swept = match SWEPT.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !swept.insert(self.path.clone()) {
            return false;
        }
        self.clear();
        true
    }

    /// Remove the lock file regardless of who holds it.
    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("removed lock file {}", self.path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => log::warn!("could not remove lock file {}: {err}", self.path.display()),
        }
    }

    pub fn is_held(&self) -> bool {
        self.path.exists()
    }

    /// Wait until the lock file can be created or the timeout elapses.
    pub async fn acquire(&self) -> Result<SoftLockGuard, LockError> {
        let started = Instant::now();
        loop {
            match self.try_acquire() {
                Ok(Some(guard)) => return Ok(guard),
                Ok(None) => {}
                Err(source) => {
                    return Err(LockError::Io {
                        path: self.path.clone(),
                        source,
                    });
                }
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(LockError::Timeout {
                    path: self.path.clone(),
                    waited,
                });
            }
            sleep(POLL_INTERVAL.min(self.timeout - waited)).await;
        }
    }

    fn try_acquire(&self) -> std::io::Result<Option<SoftLockGuard>> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path);

        match file {
            Ok(mut file) => {
                // Owner pid helps when inspecting a leftover lock by hand.
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Some(SoftLockGuard {
                    path: self.path.clone(),
                }))
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Held lock; the lock file is removed on drop.
#[derive(Debug)]
pub struct SoftLockGuard {
    path: PathBuf,
}

impl Drop for SoftLockGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path)
            && err.kind() != ErrorKind::NotFound
        {
            log::warn!("could not release lock {}: {err}", self.path.display());
        }
    }
}
