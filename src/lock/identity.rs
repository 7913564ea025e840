// src/lock/identity.rs

//! Open-then-verify primitive shared by the instance lock and the hook
//! queue.
//!
//! A file can be unlinked (and possibly recreated) by another process
//! between our `open` and our `flock`. A lock taken on an unlinked inode
//! protects nothing, so after locking we compare the descriptor's identity
//! with the current directory entry and start over when they differ.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use fs2::FileExt;
use tracing::debug;

/// How the freshly opened file should be locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Blocking exclusive lock.
    Exclusive,
    /// Non-blocking exclusive lock; contention is reported, not waited on.
    TryExclusive,
    /// Blocking shared lock (readers).
    Shared,
}

/// Result of [`open_locked`].
#[derive(Debug)]
pub enum Verified {
    /// Locked descriptor that refers to the current directory entry.
    Locked(File),
    /// Someone else holds the lock, or `create_new` found an existing file.
    Contended,
    /// The path does not exist (and the options did not create it).
    Missing,
}

/// Open `path` with `options`, lock it according to `mode` and make sure the
/// locked descriptor still refers to the file at `path`. Replaced files are
/// retried transparently.
pub fn open_locked(path: &Path, options: &OpenOptions, mode: LockMode) -> io::Result<Verified> {
    loop {
        let file = match options.open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Verified::Missing),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Ok(Verified::Contended);
            }
            Err(e) => return Err(e),
        };

        match mode {
            LockMode::Exclusive => FileExt::lock_exclusive(&file)?,
            LockMode::Shared => FileExt::lock_shared(&file)?,
            LockMode::TryExclusive => {
                if let Err(e) = FileExt::try_lock_exclusive(&file) {
                    if is_contended(&e) {
                        return Ok(Verified::Contended);
                    }
                    return Err(e);
                }
            }
        }

        if refers_to_current_entry(&file, path)? {
            return Ok(Verified::Locked(file));
        }

        debug!(path = %path.display(), "file replaced before it was locked; retrying");
    }
}

/// Whether a failed non-blocking lock attempt means "held by someone else".
pub fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Whether `file` is the inode currently linked at `path`.
pub fn refers_to_current_entry(file: &File, path: &Path) -> io::Result<bool> {
    let opened = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(opened.ino() == current.ino() && opened.dev() == current.dev()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_without_create_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent");
        let mut options = OpenOptions::new();
        options.read(true);

        let res = open_locked(&path, &options, LockMode::Shared).unwrap();
        assert!(matches!(res, Verified::Missing));
    }

    #[test]
    fn create_new_on_existing_file_is_contention() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("present");
        fs::write(&path, "1").unwrap();
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);

        let res = open_locked(&path, &options, LockMode::TryExclusive).unwrap();
        assert!(matches!(res, Verified::Contended));
    }

    #[test]
    fn second_try_lock_is_contended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);

        let first = open_locked(&path, &options, LockMode::TryExclusive).unwrap();
        assert!(matches!(first, Verified::Locked(_)));
        let second = open_locked(&path, &options, LockMode::TryExclusive).unwrap();
        assert!(matches!(second, Verified::Contended));
    }

    #[test]
    fn unlinked_descriptor_is_not_current() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");
        fs::write(&path, "old").unwrap();
        let file = File::open(&path).unwrap();
        assert!(refers_to_current_entry(&file, &path).unwrap());

        fs::remove_file(&path).unwrap();
        assert!(!refers_to_current_entry(&file, &path).unwrap());

        fs::write(&path, "new").unwrap();
        assert!(!refers_to_current_entry(&file, &path).unwrap());
    }
}
