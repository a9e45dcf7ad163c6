//! Working-tree I/O.
//!
//! All paths crossing this boundary are repo-relative byte strings; the
//! workspace translates them to filesystem paths against its root.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bstr::{BStr, BString};
use grit_utils::path as repo_path;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("pathspec '{0}' did not match any files")]
    MissingFile(String),

    #[error("open('{0}'): Permission denied")]
    NoPermission(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Entries never reported by workspace scans.
const IGNORE: &[&str] = &[".git"];

pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &BStr) -> PathBuf {
        repo_path::to_os_path(&self.root, path)
    }

    /// Every file under `start` (an absolute path inside the workspace),
    /// as repo paths. A missing pathspec is an error.
    pub fn list_files(&self, start: &Path) -> Result<Vec<BString>, WorkspaceError> {
        let mut out = Vec::new();
        self.collect_files(start, &mut out)?;
        Ok(out)
    }

    fn collect_files(&self, path: &Path, out: &mut Vec<BString>) -> Result<(), WorkspaceError> {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(path)?
                .flatten()
                .map(|e| e.path())
                .filter(|p| !is_ignored(p))
                .collect();
            entries.sort();
            for entry in entries {
                self.collect_files(&entry, out)?;
            }
        } else if path.exists() {
            if let Some(rel) = repo_path::from_os_path(&self.root, path) {
                out.push(rel);
            }
        } else {
            let display = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .display()
                .to_string();
            return Err(WorkspaceError::MissingFile(display));
        }
        Ok(())
    }

    /// One directory level: repo path → metadata, skipping ignored names.
    pub fn list_dir(&self, dirname: &BStr) -> Result<BTreeMap<BString, fs::Metadata>, WorkspaceError> {
        let path = self.full_path(dirname);
        let mut stats = BTreeMap::new();

        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };

        for entry in entries.flatten() {
            let child = entry.path();
            if is_ignored(&child) {
                continue;
            }
            if let Some(rel) = repo_path::from_os_path(&self.root, &child) {
                stats.insert(rel, entry.metadata()?);
            }
        }
        Ok(stats)
    }

    pub fn read_file(&self, path: &BStr) -> Result<Vec<u8>, WorkspaceError> {
        fs::read(self.full_path(path)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                WorkspaceError::NoPermission(String::from_utf8_lossy(path).into())
            } else {
                WorkspaceError::Io(e)
            }
        })
    }

    pub fn stat_file(&self, path: &BStr) -> Option<fs::Metadata> {
        fs::metadata(self.full_path(path)).ok()
    }

    /// Write file content, optionally applying a git mode and creating
    /// parent directories.
    pub fn write_file(
        &self,
        path: &BStr,
        data: &[u8],
        mode: Option<u32>,
        mkdir: bool,
    ) -> Result<(), WorkspaceError> {
        let full = self.full_path(path);
        if mkdir {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&full, data)?;
        if let Some(mode) = mode {
            set_file_mode(&full, mode)?;
        }
        Ok(())
    }

    /// Delete a path (file or directory tree) and prune newly empty parent
    /// directories. Missing paths are fine.
    pub fn remove(&self, path: &BStr) -> Result<(), WorkspaceError> {
        self.rm_rf(path);
        for dir in repo_path::parent_directories(path).into_iter().rev() {
            self.remove_directory(dir.as_ref());
        }
        Ok(())
    }

    pub fn rm_rf(&self, path: &BStr) {
        let full = self.full_path(path);
        if full.is_dir() {
            let _ = fs::remove_dir_all(&full);
        } else {
            let _ = fs::remove_file(&full);
        }
    }

    /// Remove a directory if it is empty; quietly keep it otherwise.
    pub fn remove_directory(&self, dirname: &BStr) {
        let _ = fs::remove_dir(self.full_path(dirname));
    }

    /// Ensure a directory exists, replacing any regular file in its place.
    pub fn make_directory(&self, dirname: &BStr) -> Result<(), WorkspaceError> {
        let full = self.full_path(dirname);
        if full.is_file() {
            fs::remove_file(&full)?;
        }
        fs::create_dir_all(&full)?;
        Ok(())
    }

    /// Remove any regular file occupying an ancestor directory slot of
    /// `path` (a file checkout replacing a former file with a directory).
    pub fn unlink_file_ancestors(&self, path: &BStr) -> Result<(), WorkspaceError> {
        for dir in repo_path::parent_directories(path) {
            let full = self.full_path(dir.as_ref());
            if full.is_file() {
                fs::remove_file(&full)?;
            }
        }
        Ok(())
    }
}

fn is_ignored(path: &Path) -> bool {
    path.file_name()
        .map(|name| IGNORE.iter().any(|ig| name == *ig))
        .unwrap_or(false)
}

#[cfg(unix)]
fn set_file_mode(path: &Path, git_mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if git_mode == 0o100755 { 0o755 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path, _git_mode: u32) -> std::io::Result<()> {
    Ok(())
}
