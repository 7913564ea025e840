// src/lock/instance.rs

//! Single-instance lock with "please run again" signalling.
//!
//! The active supervisor holds an [`ExclusiveLock`] whose content is its pid.
//! Any other invocation either nudges that pid with `SIGUSR1` (the holder
//! then performs one more update pass) or merely probes that it is alive.
//! A holder pid that no longer exists means the lock is stale and is
//! overtaken.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use crate::errors::{Result, SupervisorError};
use crate::lock::exclusive::ExclusiveLock;

/// Edge-triggered flag raised by `SIGUSR1`, cleared on read.
#[derive(Debug, Clone, Default)]
pub struct RerunSignal {
    flag: Arc<AtomicBool>,
}

impl RerunSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Read and clear in one atomic step.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

/// Outcome of [`InstanceLock::acquire`].
#[derive(Debug)]
pub enum Acquisition {
    /// We are now the only active instance.
    Acquired(InstanceGuard),
    /// Another instance is active and was asked to run once more.
    Notified { holder: i32 },
    /// Another instance is active; it was only probed for liveness.
    Probed { holder: i32 },
}

impl Acquisition {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Acquisition::Acquired(_))
    }
}

#[derive(Debug, Clone)]
pub struct InstanceLock {
    path: PathBuf,
    rerun: RerunSignal,
}

impl InstanceLock {
    /// Create the lock handle and install the `SIGUSR1` listener.
    ///
    /// Must be called from within a Tokio runtime. Create one handle per
    /// process.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let rerun = RerunSignal::new();
        listen_for_rerun(rerun.clone())?;
        Ok(Self {
            path: path.into(),
            rerun,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Become the active instance or notify the one that already is.
    ///
    /// `send_signal` selects between asking the holder for another pass and
    /// a plain liveness probe.
    pub fn acquire(&self, send_signal: bool) -> Result<Acquisition> {
        let content = std::process::id().to_string();
        let mut lock = ExclusiveLock::new(&self.path);
        let mut overtaken = false;

        loop {
            if lock.acquire(false, content.as_bytes())? {
                return Ok(self.acquired(lock));
            }

            let holder = match self.holder_pid()? {
                Some(pid) => pid,
                None => {
                    if overtaken {
                        return Err(SupervisorError::LockUnusable(self.path.clone()));
                    }
                    overtaken = true;
                    warn!(path = %self.path.display(), "lock holder can't be identified; overtaking");
                    if lock.acquire(true, content.as_bytes())? {
                        return Ok(self.acquired(lock));
                    }
                    continue;
                }
            };

            match deliver(holder, send_signal)? {
                Delivery::Delivered if send_signal => {
                    info!(holder, "another instance is active; asked it to run again");
                    return Ok(Acquisition::Notified { holder });
                }
                Delivery::Delivered => {
                    debug!(holder, "another instance is active");
                    return Ok(Acquisition::Probed { holder });
                }
                Delivery::NotAlive => {
                    if overtaken {
                        return Err(SupervisorError::LockUnusable(self.path.clone()));
                    }
                    overtaken = true;
                    warn!(holder, path = %self.path.display(), "lock holder is gone; overtaking stale lock");
                    if lock.acquire(true, content.as_bytes())? {
                        return Ok(self.acquired(lock));
                    }
                    // Somebody else overtook it first; notify that one.
                }
            }
        }
    }

    /// Pid stored in the lock file, if there is a readable one.
    pub fn holder_pid(&self) -> Result<Option<i32>> {
        let content = match ExclusiveLock::read_content(&self.path)? {
            Some(c) => c,
            None => return Ok(None),
        };
        Ok(content.trim().parse::<i32>().ok().filter(|pid| *pid > 0))
    }

    fn acquired(&self, lock: ExclusiveLock) -> Acquisition {
        // A nudge meant for a previous holder must not leak into our run.
        self.rerun.take();
        info!(path = %self.path.display(), "instance lock acquired");
        Acquisition::Acquired(InstanceGuard {
            lock,
            rerun: self.rerun.clone(),
        })
    }
}

/// Held instance lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct InstanceGuard {
    lock: ExclusiveLock,
    rerun: RerunSignal,
}

impl InstanceGuard {
    /// Keep probing instances out while an update pass is in progress.
    pub fn block_readers(&self) -> Result<()> {
        self.lock.upgrade()
    }

    /// Let other instances read our pid (and signal us).
    pub fn unblock_readers(&self) -> Result<()> {
        self.lock.downgrade()
    }

    /// Whether another instance asked for a rerun since the last call.
    pub fn rerun_requested(&self) -> bool {
        self.rerun.take()
    }

    pub fn path(&self) -> &Path {
        self.lock.path()
    }

    pub fn release(mut self) -> Result<()> {
        self.lock.release()
    }
}

enum Delivery {
    Delivered,
    NotAlive,
}

fn deliver(pid: i32, send_signal: bool) -> Result<Delivery> {
    let sig = if send_signal {
        Some(Signal::SIGUSR1)
    } else {
        None
    };
    match kill(Pid::from_raw(pid), sig) {
        Ok(()) => Ok(Delivery::Delivered),
        Err(Errno::ESRCH) => Ok(Delivery::NotAlive),
        // The process exists but belongs to someone else.
        Err(Errno::EPERM) => Ok(Delivery::Delivered),
        Err(e) => Err(e.into()),
    }
}

fn listen_for_rerun(rerun: RerunSignal) -> Result<()> {
    let mut stream = signal(SignalKind::user_defined1())?;
    tokio::spawn(async move {
        while stream.recv().await.is_some() {
            debug!("rerun requested by another instance");
            rerun.raise();
        }
    });
    Ok(())
}
