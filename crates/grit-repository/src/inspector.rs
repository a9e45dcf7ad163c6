//! Shared change detection between tree, index, and workspace.

use std::fs;

use bstr::BStr;
use grit_index::IndexEntry;
use grit_object::{hash_payload, ObjectType, TreeEntry};

use crate::{RepoError, Repository};

/// How a path differs between two of the three states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeType {
    Added,
    Deleted,
    Modified,
    Untracked,
}

pub struct Inspector<'a> {
    repo: &'a Repository,
}

impl<'a> Inspector<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    /// Unstaged difference for an index entry against the file on disk.
    /// When the stat cache is inconclusive the file is re-hashed.
    pub fn compare_index_to_workspace(
        &self,
        entry: Option<&IndexEntry>,
        meta: Option<&fs::Metadata>,
    ) -> Result<Option<ChangeType>, RepoError> {
        let Some(entry) = entry else {
            return Ok(Some(ChangeType::Untracked));
        };
        let Some(meta) = meta else {
            return Ok(Some(ChangeType::Deleted));
        };

        if !entry.stat_match(meta) {
            return Ok(Some(ChangeType::Modified));
        }
        if entry.times_match(meta) {
            return Ok(None);
        }

        let data = self.repo.workspace.read_file(entry.path.as_ref())?;
        let oid = hash_payload(ObjectType::Blob, &data);
        if entry.oid != oid {
            return Ok(Some(ChangeType::Modified));
        }
        Ok(None)
    }

    /// Staged difference between a tree entry and an index entry.
    pub fn compare_tree_to_index(
        &self,
        item: Option<&TreeEntry>,
        entry: Option<&IndexEntry>,
    ) -> Option<ChangeType> {
        match (item, entry) {
            (None, None) => None,
            (None, Some(_)) => Some(ChangeType::Added),
            (Some(_), None) => Some(ChangeType::Deleted),
            (Some(item), Some(entry)) => {
                if entry.mode != item.mode.raw() || entry.oid != item.oid {
                    Some(ChangeType::Modified)
                } else {
                    None
                }
            }
        }
    }

    /// Would this path show up as untracked? A directory is trackable if it
    /// transitively contains any untracked file.
    pub fn is_trackable_file(
        &self,
        path: &BStr,
        meta: &fs::Metadata,
    ) -> Result<bool, RepoError> {
        if meta.is_file() {
            return Ok(!self.repo.index.is_tracked_file(path));
        }
        if !meta.is_dir() {
            return Ok(false);
        }

        let items = self.repo.workspace.list_dir(path)?;

        // Files first, then directories, so shallow answers come cheap.
        for want_file in [true, false] {
            for (child, child_meta) in &items {
                if child_meta.is_file() != want_file {
                    continue;
                }
                if self.is_trackable_file(child.as_ref(), child_meta)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
