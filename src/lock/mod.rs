// src/lock/mod.rs

//! Cross-process locking.
//!
//! - [`identity`] is the open-verify-retry primitive (lock a file and make
//!   sure it is still the one linked at its path).
//! - [`exclusive`] builds the lock-file mutex on top of it.
//! - [`instance`] adds pid bookkeeping and rerun signalling.

pub mod exclusive;
pub mod identity;
pub mod instance;

pub use exclusive::ExclusiveLock;
pub use identity::{LockMode, Verified, open_locked};
pub use instance::{Acquisition, InstanceGuard, InstanceLock, RerunSignal};

use crate::errors::{Result, SupervisorError};

/// Run a lock operation that may wait on `flock` on the blocking pool, so
/// the waiting never ties up an async worker.
pub async fn off_runtime<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op).await.map_err(|e| {
        SupervisorError::Other(anyhow::Error::new(e).context("lock operation did not finish"))
    })?
}
