// src/lock.rs

//! Single-instance guard backed by a PID file.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

use crate::errors::{ProcdagError, Result};

/// At most one run per lock path on this host.
///
/// The lock file holds the decimal PID of the owner. A file whose PID is
/// unparsable or no longer alive is stale and gets replaced.
#[derive(Debug)]
pub struct SingletonLock {
    path: PathBuf,
    held: bool,
}

impl SingletonLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            held: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// PID recorded in the lock file, if it exists and parses.
    pub fn holder_pid(&self) -> Option<u32> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    /// `Ok(true)` if this instance now owns the lock, `Ok(false)` if a live
    /// process (possibly this one) already does.
    pub fn try_acquire(&mut self) -> Result<bool> {
        if self.held {
            return Ok(true);
        }

        match fs::read_to_string(&self.path) {
            Ok(contents) => match contents.trim().parse::<u32>() {
                Ok(pid) if process_alive(pid) => {
                    info!(pid, path = %self.path.display(), "lock held by a running process");
                    return Ok(false);
                }
                Ok(pid) => {
                    warn!(pid, path = %self.path.display(), "removing stale lock of dead process");
                    remove_if_present(&self.path)?;
                }
                Err(_) => {
                    warn!(
                        path = %self.path.display(),
                        contents = %contents.trim(),
                        "removing lock with invalid contents"
                    );
                    remove_if_present(&self.path)?;
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Only one of two racing instances can create the file.
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                info!(path = %self.path.display(), "lock taken concurrently");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        write!(file, "{}", std::process::id())?;
        file.sync_all()?;

        self.held = true;
        debug!(path = %self.path.display(), pid = std::process::id(), "lock acquired");
        Ok(true)
    }

    /// Acquire or fail with [`ProcdagError::LockContention`]. The returned
    /// guard releases the lock when dropped.
    pub fn acquire_guard(mut self) -> Result<LockGuard> {
        if self.try_acquire()? {
            Ok(LockGuard { lock: self })
        } else {
            Err(ProcdagError::LockContention {
                pid: self.holder_pid().unwrap_or_default(),
            })
        }
    }

    /// Remove the lock file if this instance owns it. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        remove_if_present(&self.path)?;
        self.held = false;
        debug!(path = %self.path.display(), "lock released");
        Ok(())
    }
}

/// Owns a held [`SingletonLock`] for the duration of a run.
#[derive(Debug)]
pub struct LockGuard {
    lock: SingletonLock,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        self.lock.path()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release() {
            warn!(path = %self.lock.path.display(), error = %e, "failed to release lock");
        }
    }
}

fn process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
