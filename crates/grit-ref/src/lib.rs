//! The reference namespace.
//!
//! `HEAD` and ad-hoc refs (`ORIG_HEAD`, `MERGE_HEAD`, …) live at the top of
//! `.git`; branches under `refs/heads`, remote-tracking refs under
//! `refs/remotes`. A ref file holds either a 40-char hex OID or a
//! `ref: <path>` pointer. Every write goes through a lock file, and
//! compare-and-swap re-reads under the lock before replacing.

pub mod name;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use grit_hash::ObjectId;
use grit_utils::{LockError, LockFile, UtilError};

pub const HEAD: &str = "HEAD";
pub const ORIG_HEAD: &str = "ORIG_HEAD";

const REFS_DIR: &str = "refs";
const HEADS_DIR: &str = "refs/heads";
const REMOTES_DIR: &str = "refs/remotes";

#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("Unable to lock ref: {0}")]
    LockDenied(LockError),

    #[error("value of {name} changed since last read")]
    StaleValue { name: String },

    #[error("{0}")]
    InvalidBranch(String),

    #[error("corrupt ref {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<UtilError> for RefError {
    fn from(e: UtilError) -> Self {
        match e {
            UtilError::Lock(lock) => Self::LockDenied(lock),
            UtilError::Io(io) => Self::Io(io),
            other => Self::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// What a single ref file contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Direct(ObjectId),
    Symbolic(String),
}

/// A named ref, resolved on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymRef {
    /// Path relative to `.git`, e.g. `refs/heads/master`.
    pub path: String,
}

impl SymRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn is_head(&self) -> bool {
        self.path == HEAD
    }

    pub fn read_oid(&self, refs: &Refs) -> Result<Option<ObjectId>, RefError> {
        refs.read_ref(&self.path)
    }

    pub fn short_name(&self, refs: &Refs) -> String {
        refs.short_name(&self.path)
    }
}

pub struct Refs {
    /// The `.git` directory.
    path: PathBuf,
}

impl Refs {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            path: git_dir.as_ref().to_path_buf(),
        }
    }

    pub fn heads_path(&self) -> PathBuf {
        self.path.join(HEADS_DIR)
    }

    pub fn remotes_path(&self) -> PathBuf {
        self.path.join(REMOTES_DIR)
    }

    // ------------------------------------------------------------------
    // Reading

    /// Resolve `name` to an OID, following symbolic links. Searches the
    /// repository root, `refs/`, `refs/heads/`, and `refs/remotes/`.
    pub fn read_ref(&self, name: &str) -> Result<Option<ObjectId>, RefError> {
        match self.path_for_name(name) {
            Some(path) => self.read_symref(&path),
            None => Ok(None),
        }
    }

    pub fn read_head(&self) -> Result<Option<ObjectId>, RefError> {
        self.read_symref(&self.path.join(HEAD))
    }

    /// The deepest symbolic ref `source` leads to: the checked-out branch,
    /// or HEAD itself when detached.
    pub fn current_ref(&self) -> Result<SymRef, RefError> {
        self.current_ref_from(HEAD)
    }

    pub fn current_ref_from(&self, source: &str) -> Result<SymRef, RefError> {
        match self.read_oid_or_symref(&self.path.join(source))? {
            Some(Reference::Symbolic(target)) => self.current_ref_from(&target),
            _ => Ok(SymRef::new(source)),
        }
    }

    fn path_for_name(&self, name: &str) -> Option<PathBuf> {
        for prefix in [
            self.path.clone(),
            self.path.join(REFS_DIR),
            self.heads_path(),
            self.remotes_path(),
        ] {
            let candidate = prefix.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    fn read_oid_or_symref(&self, path: &Path) -> Result<Option<Reference>, RefError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let data = data.trim();

        if let Some(target) = data.strip_prefix("ref: ") {
            return Ok(Some(Reference::Symbolic(target.trim().to_string())));
        }

        let oid = ObjectId::from_hex(data).map_err(|e| RefError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(Reference::Direct(oid)))
    }

    fn read_symref(&self, path: &Path) -> Result<Option<ObjectId>, RefError> {
        match self.read_oid_or_symref(path)? {
            None => Ok(None),
            Some(Reference::Direct(oid)) => Ok(Some(oid)),
            Some(Reference::Symbolic(target)) => self.read_symref(&self.path.join(target)),
        }
    }

    // ------------------------------------------------------------------
    // Listing

    pub fn list_all_refs(&self) -> Result<Vec<SymRef>, RefError> {
        let mut refs = vec![SymRef::new(HEAD)];
        refs.extend(self.list_refs(&self.path.join(REFS_DIR))?);
        Ok(refs)
    }

    pub fn list_branches(&self) -> Result<Vec<SymRef>, RefError> {
        self.list_refs(&self.heads_path())
    }

    pub fn list_remotes(&self) -> Result<Vec<SymRef>, RefError> {
        self.list_refs(&self.remotes_path())
    }

    fn list_refs(&self, dirname: &Path) -> Result<Vec<SymRef>, RefError> {
        let entries = match fs::read_dir(dirname) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut refs = Vec::new();
        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();

        for path in paths {
            if path.is_dir() {
                refs.extend(self.list_refs(&path)?);
            } else if let Ok(rel) = path.strip_prefix(&self.path) {
                refs.push(SymRef::new(rel.to_string_lossy().into_owned()));
            }
        }
        Ok(refs)
    }

    /// Map from OID to every ref pointing at it.
    pub fn reverse_refs(&self) -> Result<HashMap<ObjectId, Vec<SymRef>>, RefError> {
        let mut table: HashMap<ObjectId, Vec<SymRef>> = HashMap::new();
        for symref in self.list_all_refs()? {
            if let Some(oid) = symref.read_oid(self)? {
                table.entry(oid).or_default().push(symref);
            }
        }
        Ok(table)
    }

    /// Strip the longest known prefix for display: `refs/remotes/` first,
    /// then `refs/heads/`, then the repository root.
    pub fn short_name(&self, path: &str) -> String {
        for prefix in [
            format!("{REMOTES_DIR}/"),
            format!("{HEADS_DIR}/"),
            String::new(),
        ] {
            if let Some(rest) = path.strip_prefix(&prefix) {
                if !rest.is_empty() {
                    return rest.to_string();
                }
            }
        }
        path.to_string()
    }

    // ------------------------------------------------------------------
    // Updating

    /// Point HEAD at a branch (symbolically) when `revision` names one,
    /// otherwise detach to the bare OID.
    pub fn set_head(&self, revision: &str, oid: &ObjectId) -> Result<(), RefError> {
        let head = self.path.join(HEAD);
        let branch = self.heads_path().join(revision);

        if branch.is_file() {
            let target = format!("ref: {HEADS_DIR}/{revision}");
            self.update_ref_file(&head, Some(&target), None)
        } else {
            self.update_ref_file(&head, Some(&oid.to_hex()), None)
        }
    }

    /// Write through HEAD, following one symbolic hop per level. Returns
    /// the previous OID at the final target.
    pub fn update_head(&self, oid: &ObjectId) -> Result<Option<ObjectId>, RefError> {
        self.update_symref(&self.path.join(HEAD), oid)
    }

    /// Write an OID to an arbitrary ref name (relative to `.git`).
    pub fn update_ref(&self, name: &str, oid: &ObjectId) -> Result<(), RefError> {
        self.update_ref_file(&self.path.join(name), Some(&oid.to_hex()), None)
    }

    /// Delete an ad-hoc ref; missing files are fine.
    pub fn delete_ref(&self, name: &str) -> Result<(), RefError> {
        self.update_ref_file(&self.path.join(name), None, None)
    }

    fn update_symref(&self, path: &Path, oid: &ObjectId) -> Result<Option<ObjectId>, RefError> {
        let lock = LockFile::acquire(path).map_err(RefError::from)?;

        match self.read_oid_or_symref(path)? {
            Some(Reference::Symbolic(target)) => {
                let result = self.update_symref(&self.path.join(target), oid);
                lock.rollback()?;
                result
            }
            current => {
                write_oid_line(lock, &oid.to_hex())?;
                Ok(match current {
                    Some(Reference::Direct(old)) => Some(old),
                    _ => None,
                })
            }
        }
    }

    /// Replace `name` only if it still holds `expected`. `None` for `new`
    /// deletes the ref.
    pub fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<ObjectId>,
        new: Option<ObjectId>,
    ) -> Result<(), RefError> {
        let path = self.path.join(name);
        let new_text = new.map(|oid| oid.to_hex());

        self.update_ref_file(
            &path,
            new_text.as_deref(),
            Some(&mut |refs: &Refs| {
                let current = refs.read_symref(&path)?;
                if current != expected {
                    return Err(RefError::StaleValue {
                        name: name.to_string(),
                    });
                }
                Ok(())
            }),
        )
    }

    pub fn create_branch(&self, branch_name: &str, start: &ObjectId) -> Result<(), RefError> {
        if !name::is_valid(branch_name) {
            return Err(RefError::InvalidBranch(format!(
                "'{branch_name}' is not a valid branch name."
            )));
        }

        let path = self.heads_path().join(branch_name);
        if path.is_file() {
            return Err(RefError::InvalidBranch(format!(
                "A branch named '{branch_name}' already exists."
            )));
        }

        self.update_ref_file(&path, Some(&start.to_hex()), None)
    }

    /// Delete a branch ref and prune empty parent directories. Returns the
    /// OID the branch pointed at.
    pub fn delete_branch(&self, branch_name: &str) -> Result<ObjectId, RefError> {
        let path = self.heads_path().join(branch_name);
        let lock = LockFile::acquire(&path).map_err(RefError::from)?;

        let result = (|| {
            let oid = self.read_symref(&path)?.ok_or_else(|| {
                RefError::InvalidBranch(format!("branch '{branch_name}' not found."))
            })?;
            fs::remove_file(&path)?;
            self.delete_parent_directories(&path);
            Ok(oid)
        })();

        lock.rollback()?;
        result
    }

    fn delete_parent_directories(&self, path: &Path) {
        let heads = self.heads_path();
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == heads {
                break;
            }
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }

    /// The shared write path: lock, run the caller's guard, write or
    /// delete, commit. A missing parent directory is created and the
    /// operation retried once.
    fn update_ref_file(
        &self,
        path: &Path,
        value: Option<&str>,
        guard: Option<&mut dyn FnMut(&Refs) -> Result<(), RefError>>,
    ) -> Result<(), RefError> {
        let lock = match LockFile::acquire(path) {
            Ok(lock) => lock,
            Err(UtilError::Lock(LockError::MissingParent { .. })) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                LockFile::acquire(path).map_err(RefError::from)?
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(guard) = guard {
            if let Err(e) = guard(self) {
                lock.rollback()?;
                return Err(e);
            }
        }

        match value {
            Some(text) => write_oid_line(lock, text)?,
            None => {
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        lock.rollback()?;
                        return Err(e.into());
                    }
                }
                lock.rollback()?;
            }
        }
        Ok(())
    }
}

fn write_oid_line(mut lock: LockFile, text: &str) -> Result<(), RefError> {
    lock.write_all(text.as_bytes())
        .and_then(|_| lock.write_all(b"\n"))
        .map_err(RefError::from)?;
    lock.commit().map_err(RefError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_raw([n; 20])
    }

    fn setup() -> (tempfile::TempDir, Refs) {
        let dir = tempfile::tempdir().unwrap();
        let refs = Refs::new(dir.path());
        (dir, refs)
    }

    #[test]
    fn head_chain_resolution() {
        let (dir, refs) = setup();

        fs::write(dir.path().join(HEAD), "ref: refs/heads/master\n").unwrap();
        refs.update_ref("refs/heads/master", &oid(1)).unwrap();

        assert_eq!(refs.read_head().unwrap(), Some(oid(1)));
        assert_eq!(refs.read_ref("master").unwrap(), Some(oid(1)));
        assert_eq!(
            refs.current_ref().unwrap(),
            SymRef::new("refs/heads/master")
        );
    }

    #[test]
    fn update_head_follows_symref() {
        let (dir, refs) = setup();
        fs::write(dir.path().join(HEAD), "ref: refs/heads/master\n").unwrap();
        refs.update_ref("refs/heads/master", &oid(1)).unwrap();

        let previous = refs.update_head(&oid(2)).unwrap();
        assert_eq!(previous, Some(oid(1)));

        // HEAD itself is still symbolic; the branch moved.
        let head_text = fs::read_to_string(dir.path().join(HEAD)).unwrap();
        assert_eq!(head_text, "ref: refs/heads/master\n");
        assert_eq!(refs.read_ref("master").unwrap(), Some(oid(2)));
    }

    #[test]
    fn detached_head() {
        let (dir, refs) = setup();
        fs::write(dir.path().join(HEAD), format!("{}\n", oid(5).to_hex())).unwrap();

        assert_eq!(refs.read_head().unwrap(), Some(oid(5)));
        assert!(refs.current_ref().unwrap().is_head());
    }

    #[test]
    fn set_head_attaches_to_existing_branch() {
        let (dir, refs) = setup();
        refs.update_ref("refs/heads/topic", &oid(3)).unwrap();

        refs.set_head("topic", &oid(3)).unwrap();
        let head_text = fs::read_to_string(dir.path().join(HEAD)).unwrap();
        assert_eq!(head_text, "ref: refs/heads/topic\n");

        refs.set_head("deadbeef", &oid(4)).unwrap();
        let head_text = fs::read_to_string(dir.path().join(HEAD)).unwrap();
        assert_eq!(head_text, format!("{}\n", oid(4).to_hex()));
    }

    #[test]
    fn compare_and_swap_detects_stale_value() {
        let (_dir, refs) = setup();
        refs.update_ref("refs/heads/master", &oid(1)).unwrap();

        refs.compare_and_swap("refs/heads/master", Some(oid(1)), Some(oid(2)))
            .unwrap();
        assert_eq!(refs.read_ref("master").unwrap(), Some(oid(2)));

        let err = refs
            .compare_and_swap("refs/heads/master", Some(oid(1)), Some(oid(3)))
            .unwrap_err();
        assert!(matches!(err, RefError::StaleValue { .. }));
        assert_eq!(refs.read_ref("master").unwrap(), Some(oid(2)));
    }

    #[test]
    fn compare_and_swap_deletes_with_none() {
        let (dir, refs) = setup();
        refs.update_ref("refs/heads/gone", &oid(1)).unwrap();

        refs.compare_and_swap("refs/heads/gone", Some(oid(1)), None)
            .unwrap();
        assert!(!dir.path().join("refs/heads/gone").exists());
        assert_eq!(refs.read_ref("gone").unwrap(), None);
    }

    #[test]
    fn create_branch_validates_name() {
        let (_dir, refs) = setup();
        assert!(matches!(
            refs.create_branch("bad..name", &oid(1)),
            Err(RefError::InvalidBranch(_))
        ));

        refs.create_branch("good", &oid(1)).unwrap();
        assert!(matches!(
            refs.create_branch("good", &oid(2)),
            Err(RefError::InvalidBranch(_))
        ));
    }

    #[test]
    fn delete_branch_prunes_empty_directories() {
        let (dir, refs) = setup();
        refs.update_ref("refs/heads/feature/deep/topic", &oid(1))
            .unwrap();

        let deleted = refs.delete_branch("feature/deep/topic").unwrap();
        assert_eq!(deleted, oid(1));
        assert!(!dir.path().join("refs/heads/feature").exists());
        assert!(dir.path().join("refs/heads").exists());
    }

    #[test]
    fn missing_parent_directories_are_created() {
        let (dir, refs) = setup();
        refs.update_ref("refs/remotes/origin/master", &oid(7)).unwrap();
        assert!(dir.path().join("refs/remotes/origin/master").is_file());
        assert_eq!(refs.read_ref("origin/master").unwrap(), Some(oid(7)));
    }

    #[test]
    fn locked_ref_denies_update() {
        let (dir, refs) = setup();
        refs.update_ref("refs/heads/master", &oid(1)).unwrap();
        fs::write(dir.path().join("refs/heads/master.lock"), b"").unwrap();

        assert!(matches!(
            refs.update_ref("refs/heads/master", &oid(2)),
            Err(RefError::LockDenied(_))
        ));
    }

    #[test]
    fn list_and_reverse_refs() {
        let (dir, refs) = setup();
        fs::write(dir.path().join(HEAD), "ref: refs/heads/master\n").unwrap();
        refs.update_ref("refs/heads/master", &oid(1)).unwrap();
        refs.update_ref("refs/heads/topic", &oid(1)).unwrap();
        refs.update_ref("refs/remotes/origin/master", &oid(2)).unwrap();

        let all = refs.list_all_refs().unwrap();
        assert_eq!(all.len(), 4); // HEAD + three refs

        let branches = refs.list_branches().unwrap();
        assert_eq!(branches.len(), 2);

        let reverse = refs.reverse_refs().unwrap();
        // HEAD and both branches resolve to oid(1).
        assert_eq!(reverse.get(&oid(1)).unwrap().len(), 3);
        assert_eq!(reverse.get(&oid(2)).unwrap().len(), 1);

        assert_eq!(refs.short_name("refs/heads/master"), "master");
        assert_eq!(refs.short_name("refs/remotes/origin/master"), "origin/master");
        assert_eq!(refs.short_name("HEAD"), "HEAD");
    }
}
