//! The pending-commit marker.
//!
//! Merge, cherry-pick, and revert leave a head file (`MERGE_HEAD`,
//! `CHERRY_PICK_HEAD`, `REVERT_HEAD`) plus `MERGE_MSG` while conflicts are
//! outstanding; `--continue` and `--abort` consult them.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use grit_hash::ObjectId;

use crate::RepoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingType {
    Merge,
    CherryPick,
    Revert,
}

impl PendingType {
    pub fn head_file(&self) -> &'static str {
        match self {
            Self::Merge => "MERGE_HEAD",
            Self::CherryPick => "CHERRY_PICK_HEAD",
            Self::Revert => "REVERT_HEAD",
        }
    }

    /// The operation name used in user-facing messages.
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::CherryPick => "cherry-pick",
            Self::Revert => "revert",
        }
    }
}

pub struct PendingCommit {
    path: PathBuf,
    pub message_path: PathBuf,
}

impl PendingCommit {
    pub fn new(git_path: &Path) -> Self {
        Self {
            path: git_path.to_path_buf(),
            message_path: git_path.join("MERGE_MSG"),
        }
    }

    /// Record that an operation is merging `oid`. Starting a second
    /// operation while one is pending is an error surfaced by the exclusive
    /// create.
    pub fn start(&self, oid: &ObjectId, ty: PendingType) -> Result<(), RepoError> {
        let head = self.path.join(ty.head_file());
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&head)
            .map_err(|_| {
                RepoError::PendingCommit(format!(
                    "A {} is already in progress ({} exists).",
                    ty.op_name(),
                    ty.head_file()
                ))
            })?;
        file.write_all(oid.to_hex().as_bytes())?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// The commit being merged, for a pending operation of type `ty`.
    pub fn merge_oid(&self, ty: PendingType) -> Result<ObjectId, RepoError> {
        let head = self.path.join(ty.head_file());
        let data = fs::read_to_string(&head).map_err(|_| {
            RepoError::PendingCommit(format!(
                "There is no merge in progress ({} missing).",
                ty.head_file()
            ))
        })?;
        ObjectId::from_hex(data.trim()).map_err(|e| RepoError::PendingCommit(e.to_string()))
    }

    pub fn merge_message(&self) -> Result<Vec<u8>, RepoError> {
        Ok(fs::read(&self.message_path)?)
    }

    pub fn set_merge_message(&self, message: &[u8]) -> Result<(), RepoError> {
        fs::write(&self.message_path, message)?;
        Ok(())
    }

    /// Remove the marker files; complaining if the operation is not in
    /// progress.
    pub fn clear(&self, ty: PendingType) -> Result<(), RepoError> {
        let head = self.path.join(ty.head_file());
        fs::remove_file(&head).map_err(|_| {
            RepoError::PendingCommit(format!(
                "There is no merge to abort ({} missing).",
                ty.head_file()
            ))
        })?;
        let _ = fs::remove_file(&self.message_path);
        Ok(())
    }

    pub fn in_progress(&self) -> bool {
        self.merge_type().is_some()
    }

    pub fn merge_type(&self) -> Option<PendingType> {
        [PendingType::Merge, PendingType::CherryPick, PendingType::Revert]
            .into_iter()
            .find(|ty| self.path.join(ty.head_file()).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_raw([n; 20])
    }

    #[test]
    fn start_records_type_and_oid() {
        let dir = tempfile::tempdir().unwrap();
        let pending = PendingCommit::new(dir.path());

        assert!(!pending.in_progress());
        pending.start(&oid(1), PendingType::CherryPick).unwrap();

        assert!(pending.in_progress());
        assert_eq!(pending.merge_type(), Some(PendingType::CherryPick));
        assert_eq!(pending.merge_oid(PendingType::CherryPick).unwrap(), oid(1));
    }

    #[test]
    fn double_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pending = PendingCommit::new(dir.path());
        pending.start(&oid(1), PendingType::Merge).unwrap();

        assert!(matches!(
            pending.start(&oid(2), PendingType::Merge),
            Err(RepoError::PendingCommit(_))
        ));
    }

    #[test]
    fn clear_without_pending_operation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pending = PendingCommit::new(dir.path());

        assert!(matches!(
            pending.clear(PendingType::Revert),
            Err(RepoError::PendingCommit(_))
        ));
    }

    #[test]
    fn clear_removes_marker_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let pending = PendingCommit::new(dir.path());
        pending.start(&oid(1), PendingType::Merge).unwrap();
        pending.set_merge_message(b"merge topic\n").unwrap();

        pending.clear(PendingType::Merge).unwrap();
        assert!(!pending.in_progress());
        assert!(!dir.path().join("MERGE_MSG").exists());
    }
}
