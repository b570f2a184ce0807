//! Advisory file locks keyed by name.
//!
//! Mirror updates take one of these per mirror so that two processes never
//! fetch or download into the same mirror record at the same time.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use nix::{
    errno::Errno,
    fcntl::{Flock, FlockArg},
};

use crate::{
    error::{LockError, LockResult},
    fs::ensure_dir_exists,
};

/// An exclusive `flock` held on `<dir>/<name>.lock`.
///
/// The lock is released when the value is dropped.
pub struct FileLock {
    _file: Flock<File>,
    path: PathBuf,
}

impl FileLock {
    fn lock_path(dir: &Path, name: &str) -> LockResult<PathBuf> {
        ensure_dir_exists(dir).map_err(|err| {
            LockError::AcquireFailed {
                path: dir.to_path_buf(),
                reason: err.to_string(),
            }
        })?;

        let sanitized: String = name
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        Ok(dir.join(format!("{sanitized}.lock")))
    }

    fn open(path: &Path) -> LockResult<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|err| {
                LockError::Io {
                    path: path.to_path_buf(),
                    source: err,
                }
            })
    }

    /// Acquires the lock for `name` inside `dir`, blocking until it is free.
    pub fn acquire(dir: &Path, name: &str) -> LockResult<Self> {
        let path = Self::lock_path(dir, name)?;
        let file = Self::open(&path)?;

        let file = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, err)| {
            LockError::AcquireFailed {
                path: path.clone(),
                reason: err.to_string(),
            }
        })?;

        Ok(FileLock { _file: file, path })
    }

    /// Tries to acquire the lock without blocking.
    ///
    /// Returns `None` if another holder has it.
    pub fn try_acquire(dir: &Path, name: &str) -> LockResult<Option<Self>> {
        let path = Self::lock_path(dir, name)?;
        let file = Self::open(&path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(file) => Ok(Some(FileLock { _file: file, path })),
            Err((_, err)) if err == Errno::EWOULDBLOCK => Ok(None),
            Err((_, err)) => {
                Err(LockError::AcquireFailed {
                    path,
                    reason: err.to_string(),
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_lock_path_sanitization() {
        let dir = tempdir().unwrap();
        let path = FileLock::lock_path(dir.path(), "debian/wheezy main").unwrap();
        assert_eq!(path, dir.path().join("debian_wheezy_main.lock"));
    }

    #[test]
    fn test_lock_dir_is_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let lock = FileLock::acquire(&nested, "m").unwrap();
        assert!(nested.is_dir());
        assert!(lock.path().exists());
    }

    #[test]
    fn test_exclusive_lock() {
        let dir = tempdir().unwrap();
        let lock1 = FileLock::acquire(dir.path(), "wheezy-main").unwrap();

        let lock2 = FileLock::try_acquire(dir.path(), "wheezy-main").unwrap();
        assert!(lock2.is_none());

        drop(lock1);

        let lock3 = FileLock::try_acquire(dir.path(), "wheezy-main").unwrap();
        assert!(lock3.is_some());
    }

    #[test]
    fn test_different_names_do_not_conflict() {
        let dir = tempdir().unwrap();
        let a = FileLock::acquire(dir.path(), "a").unwrap();
        let b = FileLock::try_acquire(dir.path(), "b").unwrap();
        assert!(b.is_some());
        assert_ne!(a.path(), b.unwrap().path());
    }

    #[test]
    fn test_lock_blocks_until_released() {
        let dir = tempdir().unwrap();
        let dir_path = dir.path().to_path_buf();
        let lock1 = FileLock::acquire(&dir_path, "block").unwrap();

        let handle = thread::spawn(move || {
            let lock2 = FileLock::acquire(&dir_path, "block").unwrap();
            lock2.path().to_path_buf()
        });

        thread::sleep(Duration::from_millis(100));
        let expected = lock1.path().to_path_buf();
        drop(lock1);

        assert_eq!(handle.join().unwrap(), expected);
    }
}
