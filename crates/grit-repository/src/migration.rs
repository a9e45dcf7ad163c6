//! Tree migration: plan and apply the workspace changes that turn one tree
//! state into another.
//!
//! Planning inspects every changed path for conflicts with local state;
//! if any are found the migration aborts with a grouped report before
//! touching the workspace. Application orders deletes, directory removals,
//! directory creations, and writes so intermediate states stay valid, then
//! re-points the index.

use std::collections::{BTreeMap, BTreeSet};

use bstr::{BStr, BString};
use grit_diff::tree::TreeDiffChanges;
use grit_object::{Object, TreeEntry};
use grit_utils::path as repo_path;

use crate::inspector::Inspector;
use crate::{RepoError, Repository};

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("{}", errors.join("\n"))]
    Conflict { errors: Vec<String> },

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Variant order is the report order: blocks sort by the conflict's name,
/// so `StaleDirectory` prints before `StaleFile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ConflictKind {
    StaleDirectory,
    StaleFile,
    UntrackedOverwritten,
    UntrackedRemoved,
}

impl ConflictKind {
    fn messages(&self) -> (&'static str, &'static str) {
        match self {
            Self::StaleDirectory => (
                "Updating the following directories would lose untracked files in them:",
                "",
            ),
            Self::StaleFile => (
                "Your local changes to the following files would be overwritten by checkout:",
                "Please commit your changes or stash them before you switch branches.",
            ),
            Self::UntrackedOverwritten => (
                "The following untracked working tree files would be overwritten by checkout:",
                "Please move or remove them before you switch branches.",
            ),
            Self::UntrackedRemoved => (
                "The following untracked working tree files would be removed by checkout:",
                "Please move or remove them before you switch branches.",
            ),
        }
    }
}

pub struct Migration<'a> {
    repo: &'a mut Repository,
    diff: TreeDiffChanges,
    creates: Vec<(BString, TreeEntry)>,
    updates: Vec<(BString, TreeEntry)>,
    deletes: Vec<BString>,
    mkdirs: BTreeSet<BString>,
    rmdirs: BTreeSet<BString>,
    conflicts: BTreeMap<ConflictKind, BTreeSet<BString>>,
}

impl<'a> Migration<'a> {
    pub fn new(repo: &'a mut Repository, diff: TreeDiffChanges) -> Self {
        Self {
            repo,
            diff,
            creates: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
            mkdirs: BTreeSet::new(),
            rmdirs: BTreeSet::new(),
            conflicts: BTreeMap::new(),
        }
    }

    pub fn apply_changes(&mut self) -> Result<(), MigrationError> {
        self.plan_changes()?;
        self.update_workspace()?;
        self.update_index()?;
        Ok(())
    }

    /// The grouped conflict report, one block per conflict kind.
    pub fn error_blocks(&self) -> Vec<String> {
        let mut blocks = Vec::new();
        for (kind, paths) in &self.conflicts {
            if paths.is_empty() {
                continue;
            }
            let (header, footer) = kind.messages();
            let mut block = String::from(header);
            for path in paths {
                block.push_str(&format!("\n\t{}", path));
            }
            // The footer joins unconditionally; an empty one still ends the
            // block with a blank line.
            block.push('\n');
            block.push_str(footer);
            blocks.push(block);
        }
        blocks
    }

    fn plan_changes(&mut self) -> Result<(), MigrationError> {
        let diff = self.diff.clone();
        for (path, (old_item, new_item)) in &diff {
            self.check_for_conflict(path.as_ref(), old_item.as_ref(), new_item.as_ref())?;
            self.record_change(path.as_ref(), old_item.as_ref(), new_item.as_ref());
        }

        let errors = self.error_blocks();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(MigrationError::Conflict { errors })
        }
    }

    fn record_change(
        &mut self,
        path: &BStr,
        old_item: Option<&TreeEntry>,
        new_item: Option<&TreeEntry>,
    ) {
        let dirs = repo_path::parent_directories(path);

        match (old_item, new_item) {
            (None, Some(new)) => {
                self.mkdirs.extend(dirs);
                self.creates.push((BString::from(path), *new));
            }
            (Some(_), None) => {
                self.rmdirs.extend(dirs);
                self.deletes.push(BString::from(path));
            }
            (Some(_), Some(new)) => {
                self.mkdirs.extend(dirs);
                self.updates.push((BString::from(path), *new));
            }
            (None, None) => {}
        }
    }

    fn check_for_conflict(
        &mut self,
        path: &BStr,
        old_item: Option<&TreeEntry>,
        new_item: Option<&TreeEntry>,
    ) -> Result<(), MigrationError> {
        let entry = self.repo.index.entry_for_path(path).cloned();

        if self.index_differs_from_trees(entry.as_ref(), old_item, new_item) {
            self.conflicts
                .entry(ConflictKind::StaleFile)
                .or_default()
                .insert(BString::from(path));
            return Ok(());
        }

        let stat = self.repo.workspace.stat_file(path);
        let kind = self.conflict_kind(stat.as_ref(), entry.as_ref(), new_item);

        match stat {
            None => {
                if let Some(parent) = self.untracked_parent(path)? {
                    let reported = if entry.is_some() {
                        BString::from(path)
                    } else {
                        parent
                    };
                    self.conflicts.entry(kind).or_default().insert(reported);
                }
            }
            Some(meta) if meta.is_file() => {
                let inspector = Inspector::new(self.repo);
                let changed =
                    inspector.compare_index_to_workspace(entry.as_ref(), Some(&meta))?;
                if changed.is_some() {
                    self.conflicts
                        .entry(kind)
                        .or_default()
                        .insert(BString::from(path));
                }
            }
            Some(meta) if meta.is_dir() => {
                let inspector = Inspector::new(self.repo);
                if inspector.is_trackable_file(path, &meta)? {
                    self.conflicts
                        .entry(kind)
                        .or_default()
                        .insert(BString::from(path));
                }
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn conflict_kind(
        &self,
        stat: Option<&std::fs::Metadata>,
        entry: Option<&grit_index::IndexEntry>,
        item: Option<&TreeEntry>,
    ) -> ConflictKind {
        if entry.is_some() {
            ConflictKind::StaleFile
        } else if stat.map(|m| m.is_dir()).unwrap_or(false) {
            ConflictKind::StaleDirectory
        } else if item.is_some() {
            ConflictKind::UntrackedOverwritten
        } else {
            ConflictKind::UntrackedRemoved
        }
    }

    /// The index disagrees with both endpoints of the migration.
    fn index_differs_from_trees(
        &self,
        entry: Option<&grit_index::IndexEntry>,
        old_item: Option<&TreeEntry>,
        new_item: Option<&TreeEntry>,
    ) -> bool {
        let inspector = Inspector::new(self.repo);
        inspector.compare_tree_to_index(old_item, entry).is_some()
            && inspector.compare_tree_to_index(new_item, entry).is_some()
    }

    /// An untracked file sitting where one of `path`'s ancestor directories
    /// should be.
    fn untracked_parent(&self, path: &BStr) -> Result<Option<BString>, MigrationError> {
        for parent in repo_path::parent_directories(path) {
            let Some(meta) = self.repo.workspace.stat_file(parent.as_ref()) else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let inspector = Inspector::new(self.repo);
            if inspector.is_trackable_file(parent.as_ref(), &meta)? {
                return Ok(Some(parent));
            }
        }
        Ok(None)
    }

    fn update_workspace(&mut self) -> Result<(), MigrationError> {
        for path in &self.deletes {
            self.repo.workspace.rm_rf(path.as_ref());
        }

        for dir in self.rmdirs.iter().rev() {
            self.repo.workspace.remove_directory(dir.as_ref());
        }

        for dir in &self.mkdirs {
            self.repo.workspace.make_directory(dir.as_ref()).map_err(RepoError::from)?;
        }

        let writes: Vec<(BString, TreeEntry)> = self
            .updates
            .iter()
            .chain(self.creates.iter())
            .cloned()
            .collect();
        for (path, entry) in writes {
            self.repo.workspace.rm_rf(path.as_ref());
            self.repo
                .workspace
                .unlink_file_ancestors(path.as_ref())
                .map_err(RepoError::from)?;

            let data = self.blob_data(&entry)?;
            self.repo
                .workspace
                .write_file(path.as_ref(), &data, Some(entry.mode.raw()), true)
                .map_err(RepoError::from)?;
        }
        Ok(())
    }

    fn blob_data(&self, entry: &TreeEntry) -> Result<Vec<u8>, MigrationError> {
        match self.repo.database.load(&entry.oid).map_err(RepoError::from)? {
            Object::Blob(blob) => Ok(blob.data.to_vec()),
            other => Err(RepoError::Io(std::io::Error::other(format!(
                "expected blob, found {}",
                other.object_type()
            )))
            .into()),
        }
    }

    fn update_index(&mut self) -> Result<(), MigrationError> {
        for path in &self.deletes {
            self.repo.index.remove(path.as_ref());
        }

        for (path, entry) in self.updates.iter().chain(self.creates.iter()) {
            if let Some(meta) = self.repo.workspace.stat_file(path.as_ref()) {
                self.repo.index.add(path.as_ref(), entry.oid, &meta);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::ByteSlice;
    use grit_diff::tree::PathFilter;
    use grit_hash::ObjectId;
    use grit_object::Blob;

    fn commit_tree(repo: &mut Repository, files: &[(&str, &str)]) -> ObjectId {
        for (path, content) in files {
            let oid = repo
                .database
                .store(&Object::Blob(Blob::new(*content)))
                .unwrap();
            repo.workspace
                .write_file(path.as_bytes().as_bstr(), content.as_bytes(), None, true)
                .unwrap();
            let meta = repo.workspace.stat_file(path.as_bytes().as_bstr()).unwrap();
            repo.index.add(path.as_bytes().as_bstr(), oid, &meta);
        }
        repo.write_index_tree().unwrap()
    }

    fn setup() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let git = dir.path().join(".git");
        std::fs::create_dir_all(git.join("objects")).unwrap();
        let repo = Repository::new(&git);
        (dir, repo)
    }

    #[test]
    fn migrates_between_two_trees() {
        let (dir, mut repo) = setup();

        let old_tree = commit_tree(
            &mut repo,
            &[("a.txt", "1"), ("out/b.txt", "2"), ("out/in/c.txt", "3")],
        );
        let new_tree = commit_tree(
            &mut repo,
            &[("a.txt", "1"), ("out/b.txt", "4"), ("out/in/c.txt", "3")],
        );

        // Go back from new to old.
        let diff = repo
            .tree_diff(Some(new_tree), Some(old_tree), &PathFilter::any())
            .unwrap();
        repo.migration(diff).apply_changes().unwrap();

        let restored = std::fs::read_to_string(dir.path().join("out/b.txt")).unwrap();
        assert_eq!(restored, "2");
    }

    #[test]
    fn deletion_prunes_empty_directories() {
        let (dir, mut repo) = setup();

        let with_deep = commit_tree(&mut repo, &[("keep.txt", "k"), ("deep/nest/f.txt", "x")]);
        let without = {
            repo.index.remove(b"deep/nest/f.txt".as_bstr());
            repo.workspace.remove(b"deep/nest/f.txt".as_bstr()).unwrap();
            repo.write_index_tree().unwrap()
        };

        // Re-create the deep state, then migrate away from it.
        let diff = repo
            .tree_diff(Some(without), Some(with_deep), &PathFilter::any())
            .unwrap();
        repo.migration(diff).apply_changes().unwrap();
        assert!(dir.path().join("deep/nest/f.txt").exists());

        let diff = repo
            .tree_diff(Some(with_deep), Some(without), &PathFilter::any())
            .unwrap();
        repo.migration(diff).apply_changes().unwrap();
        assert!(!dir.path().join("deep").exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[test]
    fn local_modification_blocks_migration() {
        let (dir, mut repo) = setup();

        let old_tree = commit_tree(&mut repo, &[("f.txt", "old")]);
        let new_tree = commit_tree(&mut repo, &[("f.txt", "new")]);

        // Dirty the workspace relative to the index.
        std::fs::write(dir.path().join("f.txt"), "dirty local edit").unwrap();

        let diff = repo
            .tree_diff(Some(new_tree), Some(old_tree), &PathFilter::any())
            .unwrap();
        let mut migration = repo.migration(diff);
        let err = migration.apply_changes().unwrap_err();

        let MigrationError::Conflict { errors } = err else {
            panic!("expected conflict");
        };
        assert!(errors[0].contains("would be overwritten by checkout"));
        assert!(errors[0].contains("f.txt"));

        // Workspace untouched.
        let content = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert_eq!(content, "dirty local edit");
    }

    #[test]
    fn untracked_file_blocks_overwrite() {
        let (dir, mut repo) = setup();

        let base = commit_tree(&mut repo, &[("a.txt", "1")]);

        // A tree that adds g.txt, while an untracked g.txt sits on disk.
        let target = commit_tree(&mut repo, &[("a.txt", "1"), ("g.txt", "from tree")]);
        repo.index.remove(b"g.txt".as_bstr());
        std::fs::write(dir.path().join("g.txt"), "untracked local").unwrap();

        let diff = repo
            .tree_diff(Some(base), Some(target), &PathFilter::any())
            .unwrap();
        let mut migration = repo.migration(diff);
        let err = migration.apply_changes().unwrap_err();

        let MigrationError::Conflict { errors } = err else {
            panic!("expected conflict");
        };
        assert!(errors
            .iter()
            .any(|block| block.contains("untracked working tree files would be overwritten")));
    }
}
