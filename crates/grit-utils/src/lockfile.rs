use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{LockError, UtilError};
use crate::Result;

/// RAII lock file guard implementing the `.git` writer protocol:
///
/// - Create `<path>.lock` with O_CREAT|O_EXCL; fail fast if it exists
/// - Write the new contents into the lock file
/// - `commit()` atomically renames the lock over the target
/// - `rollback()` (or Drop without commit) removes the lock, leaving the
///   target untouched
///
/// Readers never take the lock and observe either the old or the new file,
/// never a partial write.
pub struct LockFile {
    /// The target file path (without .lock suffix).
    path: PathBuf,
    /// The lock file path (with .lock suffix).
    lock_path: PathBuf,
    /// The open file handle for writing.
    file: Option<File>,
    /// Whether commit() or rollback() already ran.
    finished: bool,
}

const LOCK_SUFFIX: &str = ".lock";

impl LockFile {
    /// Acquire the lock for `path`, creating `<path>.lock` exclusively.
    ///
    /// Returns `LockError::Denied` if another process holds the lock and
    /// `LockError::MissingParent` if the target's directory does not exist
    /// (callers that create refs on demand mkdir and retry).
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lock_path = PathBuf::from(format!("{}{}", path.display(), LOCK_SUFFIX));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => UtilError::Lock(LockError::Denied {
                    path: lock_path.clone(),
                }),
                io::ErrorKind::NotFound => UtilError::Lock(LockError::MissingParent {
                    path: path.clone(),
                }),
                _ => UtilError::Lock(LockError::Create {
                    path: lock_path.clone(),
                    source: e,
                }),
            })?;

        Ok(Self {
            path,
            lock_path,
            file: Some(file),
            finished: false,
        })
    }

    /// The path of the target file (without .lock).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The path of the lock file itself.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Append bytes to the lock file.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .as_mut()
            .expect("lock file already closed")
            .write_all(data)?;
        Ok(())
    }

    /// Commit: flush, fsync, and atomically rename the lock over the target.
    pub fn commit(mut self) -> Result<()> {
        if let Some(ref mut file) = self.file {
            file.flush().and_then(|_| file.sync_all()).map_err(|e| {
                UtilError::Lock(LockError::Commit {
                    path: self.lock_path.clone(),
                    source: e,
                })
            })?;
        }
        self.file.take();

        fs::rename(&self.lock_path, &self.path).map_err(|e| {
            UtilError::Lock(LockError::Commit {
                path: self.lock_path.clone(),
                source: e,
            })
        })?;

        self.finished = true;
        Ok(())
    }

    /// Rollback: drop the lock without touching the target.
    pub fn rollback(mut self) -> Result<()> {
        self.file.take();
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path)?;
        }
        self.finished = true;
        Ok(())
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already closed"))?
            .flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.finished {
            self.file.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        fs::write(&target, b"old content").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        assert!(lock.lock_path().exists());
        lock.write_all(b"new content").unwrap();
        lock.commit().unwrap();

        assert!(!dir.path().join("index.lock").exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "new content");
    }

    #[test]
    fn rollback_leaves_target_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        fs::write(&target, b"original").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        lock.write_all(b"should not persist").unwrap();
        lock.rollback().unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
        assert!(!dir.path().join("index.lock").exists());
    }

    #[test]
    fn drop_without_commit_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        fs::write(&target, b"original").unwrap();

        {
            let mut lock = LockFile::acquire(&target).unwrap();
            lock.write_all(b"dropped content").unwrap();
        }

        assert!(!dir.path().join("index.lock").exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "original");
    }

    #[test]
    fn second_acquire_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        fs::write(&target, b"content").unwrap();

        let _held = LockFile::acquire(&target).unwrap();

        match LockFile::acquire(&target) {
            Err(UtilError::Lock(LockError::Denied { .. })) => {}
            other => panic!("expected Denied, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn missing_parent_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("refs/heads/topic/deep");

        match LockFile::acquire(&target) {
            Err(UtilError::Lock(LockError::MissingParent { .. })) => {}
            other => panic!("expected MissingParent, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn lock_creates_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ORIG_HEAD");

        let mut lock = LockFile::acquire(&target).unwrap();
        lock.write_all(b"created via lock").unwrap();
        lock.commit().unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "created via lock");
    }
}
