//! Three-way tree resolution.
//!
//! Both sides are diffed against the common base; paths touched by only
//! one side apply cleanly, paths touched by both get a content merge, and
//! irreconcilable combinations (content collisions, modify/delete,
//! file/directory shape changes) are recorded as conflict stage sets. When
//! several common ancestors exist they are first merged among themselves
//! into a virtual base commit.

use std::collections::BTreeMap;

use bstr::{BStr, BString};
use grit_diff::tree::TreeDiffChanges;
use grit_diff::Diff3;
use grit_hash::ObjectId;
use grit_object::{Blob, Commit, FileMode, Object, TreeEntry};
use grit_repository::Repository;
use grit_revwalk::Bases;
use grit_utils::date::{GitDate, Signature};
use grit_utils::path as repo_path;

use crate::{MergeInputs, MergeError};

pub struct Resolve<'a> {
    repo: &'a mut Repository,
    inputs: &'a MergeInputs,
    /// Progress lines in the order a user would see them.
    pub log: Vec<String>,
}

impl<'a> Resolve<'a> {
    pub fn new(repo: &'a mut Repository, inputs: &'a MergeInputs) -> Self {
        Self {
            repo,
            inputs,
            log: Vec::new(),
        }
    }

    /// Apply the merge to the workspace and index. Conflicted paths are
    /// left at stages 1-3; renamed survivors of shape conflicts land in
    /// the workspace untracked.
    pub fn execute(&mut self) -> Result<(), MergeError> {
        let base_oid = self.resolve_base()?;
        let mut evaluation = Evaluation::prepare(self.repo, self.inputs, base_oid)?;
        self.log.append(&mut evaluation.log);

        self.repo
            .migration(evaluation.clean_diff)
            .apply_changes()?;

        for (path, items) in &evaluation.conflicts {
            self.repo.index.add_conflict_set(path.as_ref(), *items);
        }

        for (path, entry) in &evaluation.untracked {
            let Object::Blob(blob) = self.repo.database.load(&entry.oid)? else {
                continue;
            };
            self.repo
                .workspace
                .write_file(path.as_ref(), &blob.data, Some(entry.mode.raw()), true)
                .map_err(grit_repository::RepoError::from)?;
        }
        Ok(())
    }

    /// Collapse the base set to one commit, merging multiple ancestors into
    /// a synthetic one.
    fn resolve_base(&mut self) -> Result<Option<ObjectId>, MergeError> {
        match self.inputs.base_oids.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(*single)),
            multiple => Ok(Some(virtual_base(self.repo, &multiple.to_vec())?)),
        }
    }
}

/// Merge a set of common ancestors into one synthetic commit, recursively.
fn virtual_base(repo: &Repository, oids: &[ObjectId]) -> Result<ObjectId, MergeError> {
    let mut current = oids[0];
    for &next in &oids[1..] {
        current = merge_commits_in_db(repo, current, next)?;
    }
    Ok(current)
}

/// Merge two commits entirely inside the object database, producing a
/// commit whose tree carries conflict markers where the bases disagreed.
fn merge_commits_in_db(
    repo: &Repository,
    left: ObjectId,
    right: ObjectId,
) -> Result<ObjectId, MergeError> {
    let base_oids = Bases::new(&repo.database, left, right)?.find()?;
    let base = match base_oids.as_slice() {
        [] => None,
        [single] => Some(*single),
        multiple => Some(virtual_base(repo, &multiple.to_vec())?),
    };

    let inputs = MergeInputs::pick(
        left.to_hex(),
        right.to_hex(),
        left,
        right,
        base.into_iter().collect(),
    );
    let evaluation = Evaluation::prepare(repo, &inputs, base)?;

    // The left tree with every resolved change applied.
    let mut entries = repo.load_tree_list(Some(left))?;
    for (path, (_, new_entry)) in evaluation.clean_diff {
        match new_entry {
            Some(entry) => entries.insert(path, entry),
            None => entries.remove(&path),
        };
    }

    let mut builder = grit_object::tree::TreeBuilder::new();
    for (path, entry) in &entries {
        builder.insert(path.as_ref(), *entry);
    }
    let database = &repo.database;
    let tree = builder.write(&mut |tree| database.store(&Object::Tree(tree.clone())))?;

    let sig = Signature::new("grit merge", "merge@grit.invalid", GitDate::new(0, 0));
    let commit = Commit::new(
        vec![left, right],
        tree,
        sig.clone(),
        sig,
        "merged common ancestors\n",
    );
    Ok(repo.database.store(&Object::Commit(commit))?)
}

/// The computed outcome of a three-way tree merge, before it touches any
/// repository state.
struct Evaluation {
    clean_diff: TreeDiffChanges,
    /// path → [base, ours, theirs] stage entries.
    conflicts: BTreeMap<BString, [Option<TreeEntry>; 3]>,
    /// Renamed survivors of file/directory conflicts.
    untracked: BTreeMap<BString, TreeEntry>,
    log: Vec<String>,
}

impl Evaluation {
    fn prepare(
        repo: &Repository,
        inputs: &MergeInputs,
        base_oid: Option<ObjectId>,
    ) -> Result<Self, MergeError> {
        let filter = grit_diff::tree::PathFilter::any();
        let left_diff = repo.tree_diff(base_oid, Some(inputs.left_oid), &filter)?;
        let right_diff = repo.tree_diff(base_oid, Some(inputs.right_oid), &filter)?;

        let mut evaluation = Self {
            clean_diff: TreeDiffChanges::new(),
            conflicts: BTreeMap::new(),
            untracked: BTreeMap::new(),
            log: Vec::new(),
        };

        for (path, (old_item, new_item)) in &right_diff {
            if new_item.is_some() {
                evaluation.file_dir_conflict(
                    inputs,
                    path.as_ref(),
                    &left_diff,
                    &inputs.left_name,
                )?;
            }
            evaluation.same_path_conflict(
                repo,
                inputs,
                path.as_ref(),
                &left_diff,
                *old_item,
                *new_item,
            )?;
        }

        for (path, (_, new_item)) in &left_diff {
            if new_item.is_some() {
                evaluation.file_dir_conflict(
                    inputs,
                    path.as_ref(),
                    &right_diff,
                    &inputs.right_name,
                )?;
            }
        }

        Ok(evaluation)
    }

    /// A path added on one side whose ancestor directory is a file on the
    /// other: the file keeps its stages and the directory side's entry is
    /// renamed `<path>~<side>` into the workspace.
    fn file_dir_conflict(
        &mut self,
        inputs: &MergeInputs,
        path: &BStr,
        diff: &TreeDiffChanges,
        name: &str,
    ) -> Result<(), MergeError> {
        for parent in repo_path::parent_directories(path) {
            let Some((old_item, Some(new_item))) = diff.get(&parent).copied() else {
                continue;
            };

            let items = if name == inputs.left_name {
                [old_item, Some(new_item), None]
            } else {
                [old_item, None, Some(new_item)]
            };
            self.conflicts.insert(parent.clone(), items);
            self.clean_diff.remove(&parent);

            let rename = BString::from(format!("{}~{}", parent, name));
            self.untracked.insert(rename.clone(), new_item);

            if !diff.contains_key(&BString::from(path)) {
                self.log.push(format!("Adding {path}"));
            }
            self.log_conflict(&parent, inputs, Some(rename));
        }
        Ok(())
    }

    fn same_path_conflict(
        &mut self,
        repo: &Repository,
        inputs: &MergeInputs,
        path: &BStr,
        left_diff: &TreeDiffChanges,
        base: Option<TreeEntry>,
        right: Option<TreeEntry>,
    ) -> Result<(), MergeError> {
        let key = BString::from(path);
        if self.conflicts.contains_key(&key) {
            return Ok(());
        }

        let Some((_, left)) = left_diff.get(&key).copied() else {
            // Only the right side touched it: clean apply.
            self.clean_diff.insert(key, (base, right));
            return Ok(());
        };

        if left == right {
            return Ok(());
        }

        if left.is_some() && right.is_some() {
            self.log.push(format!("Auto-merging {path}"));
        }

        let (oid_ok, oid) = self.merge_blobs(
            repo,
            inputs,
            base.map(|e| e.oid),
            left.map(|e| e.oid),
            right.map(|e| e.oid),
        )?;
        let (mode_ok, mode) = merge_modes(
            base.map(|e| e.mode),
            left.map(|e| e.mode),
            right.map(|e| e.mode),
        );

        self.clean_diff
            .insert(key.clone(), (left, Some(TreeEntry::new(mode, oid))));

        if oid_ok && mode_ok {
            return Ok(());
        }

        self.conflicts.insert(key.clone(), [base, left, right]);
        self.log_conflict(&key, inputs, None);
        Ok(())
    }

    fn merge_blobs(
        &mut self,
        repo: &Repository,
        inputs: &MergeInputs,
        base: Option<ObjectId>,
        left: Option<ObjectId>,
        right: Option<ObjectId>,
    ) -> Result<(bool, ObjectId), MergeError> {
        if let Some(result) = merge3(base, left, right) {
            return Ok((result.0, result.1.expect("merge3 oid")));
        }

        let blob_data = |oid: Option<ObjectId>| -> Result<Vec<u8>, MergeError> {
            match oid {
                None => Ok(Vec::new()),
                Some(oid) => match repo.database.load(&oid)? {
                    Object::Blob(blob) => Ok(blob.data.to_vec()),
                    _ => Ok(Vec::new()),
                },
            }
        };

        let base_data = blob_data(base)?;
        let left_data = blob_data(left)?;
        let right_data = blob_data(right)?;

        let merged = Diff3::merge(
            base_data.as_slice().into(),
            left_data.as_slice().into(),
            right_data.as_slice().into(),
        );
        let data = merged.to_bytes(&inputs.left_name, &inputs.right_name);
        let oid = repo.database.store(&Object::Blob(Blob::new(data)))?;

        Ok((merged.is_clean(), oid))
    }

    fn log_conflict(&mut self, path: &BString, inputs: &MergeInputs, rename: Option<BString>) {
        let [base, left, right] = &self.conflicts[path];

        if left.is_some() && right.is_some() {
            let ty = if base.is_some() { "content" } else { "add/add" };
            self.log
                .push(format!("CONFLICT ({ty}): Merge conflict in {path}"));
        } else if base.is_some() && (left.is_some() || right.is_some()) {
            let (deleted, modified) = if left.is_some() {
                (&inputs.right_name, &inputs.left_name)
            } else {
                (&inputs.left_name, &inputs.right_name)
            };
            let rename_note = rename
                .map(|r| format!(" at {r}"))
                .unwrap_or_default();
            self.log.push(format!(
                "CONFLICT (modify/delete): {path} deleted in {deleted} and modified in {modified}. Version {modified} of {path} left in tree{rename_note}."
            ));
        } else {
            let ty = if left.is_some() {
                "file/directory"
            } else {
                "directory/file"
            };
            let branch = if left.is_some() {
                &inputs.right_name
            } else {
                &inputs.left_name
            };
            let rename = rename.map(|r| r.to_string()).unwrap_or_default();
            self.log.push(format!(
                "CONFLICT ({ty}): There is a directory with name {path} in {branch}. Adding {path} as {rename}"
            ));
        }
    }
}

/// The trivial three-way resolutions that need no content merge. `None`
/// means a real merge is required.
fn merge3<T: PartialEq + Copy>(
    base: Option<T>,
    left: Option<T>,
    right: Option<T>,
) -> Option<(bool, Option<T>)> {
    if left.is_none() {
        return Some((false, right));
    }
    if right.is_none() {
        return Some((false, left));
    }

    if left == base || left == right {
        return Some((true, right));
    }
    if right == base {
        return Some((true, left));
    }
    None
}

fn merge_modes(
    base: Option<FileMode>,
    left: Option<FileMode>,
    right: Option<FileMode>,
) -> (bool, FileMode) {
    match merge3(base, left, right) {
        Some((ok, mode)) => (ok, mode.unwrap_or(FileMode::Regular)),
        None => (false, left.unwrap_or(FileMode::Regular)),
    }
}
