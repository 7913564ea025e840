// src/lock/exclusive.rs

//! File based mutual exclusion.
//!
//! "An instance is active" is represented by a file that exists *and* has an
//! exclusive `flock` held on its current inode. The holder writes its
//! identification (pid) into the file after locking.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::errors::{Result, SupervisorError};
use crate::lock::identity::{is_contended, open_locked, LockMode, Verified};

/// Exclusive lock on a well-known path.
#[derive(Debug)]
pub struct ExclusiveLock {
    path: PathBuf,
    file: Option<File>,
}

impl ExclusiveLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Whether some other open file description holds an exclusive lock on
    /// `path`.
    ///
    /// A missing file means nobody holds it. Note that a process which only
    /// reads the content under a shared lock is reported as a holder too.
    pub fn query_held(path: &Path) -> Result<bool> {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                FileExt::unlock(&file)?;
                Ok(false)
            }
            Err(e) if is_contended(&e) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Try to take the lock without blocking and store `content` in it.
    ///
    /// Without `overtake` the file must not exist yet. With `overtake` an
    /// existing file is reused; that is how a file left behind by a dead
    /// holder is replaced. Returns `false` when somebody else holds it.
    pub fn acquire(&mut self, overtake: bool, content: &[u8]) -> Result<bool> {
        if self.file.is_some() {
            return Err(SupervisorError::Usage(format!(
                "lock {:?} is already held by this handle",
                self.path
            )));
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if overtake {
            options.create(true);
        } else {
            options.create_new(true);
        }

        let mut file = match open_locked(&self.path, &options, LockMode::TryExclusive)? {
            Verified::Locked(file) => file,
            Verified::Contended => {
                debug!(path = %self.path.display(), overtake, "lock is held by someone else");
                return Ok(false);
            }
            Verified::Missing => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("lock file {:?} vanished while being created", self.path),
                )
                .into());
            }
        };

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(content)?;
        file.sync_all()?;

        self.file = Some(file);
        Ok(true)
    }

    /// Read the content of the lock file under a shared lock.
    ///
    /// Returns `None` when there is no lock file.
    pub fn read_content(path: &Path) -> Result<Option<String>> {
        let mut options = OpenOptions::new();
        options.read(true);

        match open_locked(path, &options, LockMode::Shared)? {
            Verified::Locked(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)?;
                Ok(Some(content))
            }
            Verified::Missing | Verified::Contended => Ok(None),
        }
    }

    /// Switch the held lock to shared mode so readers can get in.
    pub fn downgrade(&self) -> Result<()> {
        let file = self.held_file("unblock")?;
        FileExt::lock_shared(file)?;
        Ok(())
    }

    /// Switch the held lock back to exclusive mode, waiting for readers.
    pub fn upgrade(&self) -> Result<()> {
        let file = self.held_file("block")?;
        FileExt::lock_exclusive(file)?;
        Ok(())
    }

    /// Remove the lock file and drop the lock.
    ///
    /// Takes a blocking exclusive lock first so no reader is cut off
    /// mid-read.
    pub fn release(&mut self) -> Result<()> {
        let file = self.file.take().ok_or_else(|| {
            SupervisorError::Usage(format!("can't release lock {:?} that is not held", self.path))
        })?;

        FileExt::lock_exclusive(&file)?;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "lock file already removed");
            }
            Err(e) => return Err(e.into()),
        }
        drop(file);

        debug!(path = %self.path.display(), "lock released");
        Ok(())
    }

    fn held_file(&self, action: &str) -> Result<&File> {
        self.file.as_ref().ok_or_else(|| {
            SupervisorError::Usage(format!("can't {action} lock {:?} that is not held", self.path))
        })
    }
}

impl Drop for ExclusiveLock {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.release() {
                warn!(path = %self.path.display(), error = %e, "failed to release lock on drop");
            }
        }
    }
}
