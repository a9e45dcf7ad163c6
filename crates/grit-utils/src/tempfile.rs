use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Result;

/// A temp file created inside its final directory so the closing rename is
/// atomic (same filesystem). Used for loose objects and pack/idx assembly.
pub struct TempFile {
    dir: PathBuf,
    temp_path: PathBuf,
    file: Option<File>,
}

impl TempFile {
    /// Create a temp file named `<prefix>_<nanos>` inside `dir`, creating the
    /// directory if needed.
    pub fn new(dir: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let pid = std::process::id();
        let temp_path = dir.join(format!("{}_{}_{}", prefix, pid, nanos));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;

        Ok(Self {
            dir,
            temp_path,
            file: Some(file),
        })
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .as_mut()
            .expect("temp file already persisted")
            .write_all(data)?;
        Ok(())
    }

    /// Flush, fsync, and rename to `name` within the same directory.
    pub fn persist(mut self, name: &str) -> Result<PathBuf> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        let final_path = self.dir.join(name);
        fs::rename(&self.temp_path, &final_path)?;
        Ok(final_path)
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(|| std::io::Error::other("temp file already persisted"))?
            .write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file
            .as_mut()
            .ok_or_else(|| std::io::Error::other("temp file already persisted"))?
            .flush()
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut tmp = TempFile::new(dir.path(), "tmp_obj").unwrap();
        tmp.write_all(b"payload").unwrap();
        let path = tmp.persist("final").unwrap();

        assert_eq!(path, dir.path().join("final"));
        assert_eq!(fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn drop_removes_unpersisted_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut tmp = TempFile::new(dir.path(), "tmp_obj").unwrap();
            tmp.write_all(b"gone").unwrap();
        }
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("objects/pack");
        let tmp = TempFile::new(&nested, "tmp_pack").unwrap();
        drop(tmp);
        assert!(nested.is_dir());
    }
}
