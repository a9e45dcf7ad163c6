//! Repository status: staged, unstaged, untracked, and conflicted paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;

use bstr::{BStr, BString, ByteVec};
use grit_hash::ObjectId;
use grit_index::IndexEntry;
use grit_object::TreeEntry;

use crate::inspector::{ChangeType, Inspector};
use crate::{RepoError, Repository};

#[derive(Debug, Default)]
pub struct Status {
    /// HEAD → index differences (changes to be committed).
    pub index_changes: BTreeMap<BString, ChangeType>,
    /// index → workspace differences (changes not staged).
    pub workspace_changes: BTreeMap<BString, ChangeType>,
    /// Untracked files, with directories collapsed to `dir/`.
    pub untracked: BTreeSet<BString>,
    /// Conflicted path → stages present.
    pub conflicts: BTreeMap<BString, Vec<u8>>,
    /// Every path that differs anywhere.
    pub changed: BTreeSet<BString>,
    /// Flattened tree of the compared commit.
    pub head_tree: HashMap<BString, TreeEntry>,
}

impl Status {
    /// Gather status against `commit_oid` (HEAD when `None`). Clean files
    /// whose timestamps drifted get their stat cache refreshed in the
    /// index as a side effect.
    pub fn gather(
        repo: &mut Repository,
        commit_oid: Option<ObjectId>,
    ) -> Result<Self, RepoError> {
        let commit_oid = match commit_oid {
            Some(oid) => Some(oid),
            None => repo.refs.read_head()?,
        };

        let mut status = Self {
            head_tree: repo.load_tree_list(commit_oid)?,
            ..Self::default()
        };

        let mut stats: HashMap<BString, fs::Metadata> = HashMap::new();
        status.scan_workspace(repo, BStr::new(b""), &mut stats)?;
        status.check_index_entries(repo, &stats)?;
        status.collect_deleted_head_files(repo);

        Ok(status)
    }

    fn scan_workspace(
        &mut self,
        repo: &Repository,
        prefix: &BStr,
        stats: &mut HashMap<BString, fs::Metadata>,
    ) -> Result<(), RepoError> {
        for (path, meta) in repo.workspace.list_dir(prefix)? {
            if repo.index.is_tracked(path.as_ref()) {
                if meta.is_dir() {
                    self.scan_workspace(repo, path.as_ref(), stats)?;
                } else if meta.is_file() {
                    stats.insert(path, meta);
                }
            } else {
                let inspector = Inspector::new(repo);
                if inspector.is_trackable_file(path.as_ref(), &meta)? {
                    let mut name = path;
                    if meta.is_dir() {
                        name.push_byte(b'/');
                    }
                    self.untracked.insert(name);
                }
            }
        }
        Ok(())
    }

    fn check_index_entries(
        &mut self,
        repo: &mut Repository,
        stats: &HashMap<BString, fs::Metadata>,
    ) -> Result<(), RepoError> {
        let entries: Vec<IndexEntry> = repo.index.entries().cloned().collect();

        for entry in entries {
            if entry.stage() == 0 {
                self.check_index_against_workspace(repo, &entry, stats)?;
                self.check_index_against_head_tree(repo, &entry);
            } else {
                self.changed.insert(entry.path.clone());
                self.conflicts
                    .entry(entry.path.clone())
                    .or_default()
                    .push(entry.stage());
            }
        }
        Ok(())
    }

    fn check_index_against_workspace(
        &mut self,
        repo: &mut Repository,
        entry: &IndexEntry,
        stats: &HashMap<BString, fs::Metadata>,
    ) -> Result<(), RepoError> {
        let meta = stats.get(&entry.path);
        let inspector = Inspector::new(repo);

        match inspector.compare_index_to_workspace(Some(entry), meta)? {
            Some(change) => self.record_change(&entry.path, change, true),
            None => {
                // Clean but possibly with drifted timestamps.
                if let Some(meta) = meta {
                    repo.index.update_entry_stat(entry.path.as_ref(), meta);
                }
            }
        }
        Ok(())
    }

    fn check_index_against_head_tree(&mut self, repo: &Repository, entry: &IndexEntry) {
        let item = self.head_tree.get(&entry.path).copied();
        let inspector = Inspector::new(repo);
        if let Some(change) = inspector.compare_tree_to_index(item.as_ref(), Some(entry)) {
            self.record_change(&entry.path, change, false);
        }
    }

    fn collect_deleted_head_files(&mut self, repo: &Repository) {
        let paths: Vec<BString> = self.head_tree.keys().cloned().collect();
        for path in paths {
            if !repo.index.is_tracked_file(path.as_ref()) {
                self.record_change(&path, ChangeType::Deleted, false);
            }
        }
    }

    fn record_change(&mut self, path: &BString, change: ChangeType, workspace_side: bool) {
        self.changed.insert(path.clone());
        let target = if workspace_side {
            &mut self.workspace_changes
        } else {
            &mut self.index_changes
        };
        target.insert(path.clone(), change);
    }

    /// The two-letter porcelain code for a changed path.
    pub fn porcelain_code(&self, path: &BStr) -> String {
        if let Some(stages) = self.conflicts.get(&BString::from(path)) {
            return conflict_code(stages).to_string();
        }

        let left = short_status(self.index_changes.get(&BString::from(path)));
        let right = short_status(self.workspace_changes.get(&BString::from(path)));
        format!("{left}{right}")
    }
}

fn short_status(change: Option<&ChangeType>) -> char {
    match change {
        Some(ChangeType::Added) => 'A',
        Some(ChangeType::Modified) => 'M',
        Some(ChangeType::Deleted) => 'D',
        _ => ' ',
    }
}

fn conflict_code(stages: &[u8]) -> &'static str {
    let mut sorted = stages.to_vec();
    sorted.sort_unstable();
    match sorted.as_slice() {
        [1, 2, 3] => "UU",
        [1, 2] => "UD",
        [1, 3] => "DU",
        [2, 3] => "AA",
        [2] => "AU",
        [3] => "UA",
        _ => "UU",
    }
}

/// The long-format label for a conflict's stage set.
pub fn conflict_label(stages: &[u8]) -> &'static str {
    let mut sorted = stages.to_vec();
    sorted.sort_unstable();
    match sorted.as_slice() {
        [1, 2, 3] => "both modified:",
        [1, 2] => "deleted by them:",
        [1, 3] => "deleted by us:",
        [2, 3] => "both added:",
        [2] => "added by us:",
        [3] => "added by them:",
        _ => "both modified:",
    }
}

/// The long-format label for an ordinary change.
pub fn change_label(change: ChangeType) -> &'static str {
    match change {
        ChangeType::Added => "new file:",
        ChangeType::Deleted => "deleted:",
        ChangeType::Modified => "modified:",
        ChangeType::Untracked => "",
    }
}
