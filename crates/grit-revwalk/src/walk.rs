//! The reachability walker.
//!
//! Commits come off a date-ordered queue, newest first, with per-OID flags
//! tracking visitation. Excluded revisions paint their ancestry
//! uninteresting; with a prune list, commits whose filtered tree diff
//! against their parent is empty are skipped as `TREESAME`. After commit
//! traversal, object enumeration walks each interesting commit's tree,
//! skipping anything reachable from an uninteresting edge.

use std::collections::HashMap;
use std::sync::OnceLock;

use bitflags::bitflags;
use bstr::BString;
use grit_diff::tree::{PathFilter, TreeDiffChanges};
use grit_hash::ObjectId;
use grit_object::{Commit, Object, TreeEntry};
use grit_repository::Repository;
use grit_utils::path as repo_path;
use regex::Regex;

use crate::revision::{Revision, RevisionError};
use crate::RevWalkError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct WalkFlags: u8 {
        const SEEN          = 1 << 0;
        const ADDED         = 1 << 1;
        const UNINTERESTING = 1 << 2;
        const TREESAME      = 1 << 3;
    }
}

fn range_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.*)\.\.(.*)$").unwrap())
}

fn exclude_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\^(.+)$").unwrap())
}

#[derive(Debug, Clone, Default)]
pub struct RevListOptions {
    /// Follow parents (off for "just these commits" callers).
    pub walk: bool,
    /// Enumerate trees and blobs after commits (pack generation).
    pub objects: bool,
    /// Ignore unresolvable start points (fetch/push have-lists).
    pub missing: bool,
    /// Start from every ref.
    pub all: bool,
}

impl RevListOptions {
    pub fn walking() -> Self {
        Self {
            walk: true,
            ..Self::default()
        }
    }
}

/// One item produced by the walk.
#[derive(Debug, Clone)]
pub struct WalkItem {
    pub oid: ObjectId,
    /// Path the object was reached by; `None` for commits and root trees.
    pub path: Option<BString>,
}

enum Phase {
    Commits,
    Objects,
    Done,
}

pub struct RevList<'a> {
    repo: &'a Repository,
    commits: HashMap<ObjectId, Commit>,
    flags: HashMap<ObjectId, WalkFlags>,
    /// Newest-first pending commits (stable among equal dates).
    queue: Vec<ObjectId>,
    limited: bool,
    walk: bool,
    objects: bool,
    missing: bool,
    prune: Vec<BString>,
    filter: PathFilter,
    diffs: HashMap<(Option<ObjectId>, ObjectId), TreeDiffChanges>,
    /// Root trees of emitted commits, for object enumeration.
    pending: Vec<ObjectId>,
    /// Object enumeration stack: (entry, path).
    object_stack: Vec<(TreeEntry, BString)>,
    phase: Phase,
    prepared: bool,
}

impl<'a> RevList<'a> {
    pub fn new(
        repo: &'a Repository,
        revs: &[String],
        options: RevListOptions,
    ) -> Result<Self, RevWalkError> {
        let mut list = Self {
            repo,
            commits: HashMap::new(),
            flags: HashMap::new(),
            queue: Vec::new(),
            limited: false,
            walk: options.walk,
            objects: options.objects,
            missing: options.missing,
            prune: Vec::new(),
            filter: PathFilter::any(),
            diffs: HashMap::new(),
            pending: Vec::new(),
            object_stack: Vec::new(),
            phase: Phase::Commits,
            prepared: false,
        };

        if options.all {
            list.include_all_refs()?;
        }

        for rev in revs {
            list.handle_revision(rev)?;
        }
        if list.queue.is_empty() && !options.all {
            list.handle_revision("HEAD")?;
        }

        list.filter = PathFilter::build(&list.prune);
        Ok(list)
    }

    /// A previously loaded commit (everything this walk has yielded).
    pub fn commit(&self, oid: &ObjectId) -> Option<&Commit> {
        self.commits.get(oid)
    }

    /// Pull the next item: commits first (newest first), then enumerated
    /// trees and blobs when object listing was requested.
    pub fn next_item(&mut self) -> Result<Option<WalkItem>, RevWalkError> {
        if !self.prepared {
            self.prepare()?;
        }

        loop {
            match self.phase {
                Phase::Commits => {
                    if let Some(item) = self.next_commit()? {
                        return Ok(Some(item));
                    }
                    if self.objects {
                        self.seed_object_stack();
                        self.phase = Phase::Objects;
                    } else {
                        self.phase = Phase::Done;
                    }
                }
                Phase::Objects => {
                    if let Some(item) = self.next_object()? {
                        return Ok(Some(item));
                    }
                    self.phase = Phase::Done;
                }
                Phase::Done => return Ok(None),
            }
        }
    }

    /// Drain the whole walk into a list.
    pub fn collect_items(&mut self) -> Result<Vec<WalkItem>, RevWalkError> {
        let mut out = Vec::new();
        while let Some(item) = self.next_item()? {
            out.push(item);
        }
        Ok(out)
    }

    /// Drain only the commit portion.
    pub fn collect_commits(&mut self) -> Result<Vec<Commit>, RevWalkError> {
        let mut out = Vec::new();
        while let Some(item) = self.next_item()? {
            if let Some(commit) = self.commits.get(&item.oid) {
                out.push(commit.clone());
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Setup

    fn include_all_refs(&mut self) -> Result<(), RevWalkError> {
        let refs = self.repo.refs.list_all_refs().map_err(|e| {
            RevWalkError::Repo(grit_repository::RepoError::Ref(e))
        })?;
        for symref in refs {
            if let Ok(Some(oid)) = symref.read_oid(&self.repo.refs) {
                self.handle_revision(&oid.to_hex())?;
            }
        }
        Ok(())
    }

    fn handle_revision(&mut self, rev: &str) -> Result<(), RevWalkError> {
        let as_path = BString::from(rev);
        if self.repo.workspace.stat_file(as_path.as_ref()).is_some() {
            self.prune.push(as_path);
        } else if let Some(caps) = range_pattern().captures(rev) {
            self.set_start_point(caps.get(1).unwrap().as_str(), false)?;
            self.set_start_point(caps.get(2).unwrap().as_str(), true)?;
            self.walk = true;
        } else if let Some(caps) = exclude_pattern().captures(rev) {
            self.set_start_point(caps.get(1).unwrap().as_str(), false)?;
            self.walk = true;
        } else {
            self.set_start_point(rev, true)?;
        }
        Ok(())
    }

    fn set_start_point(&mut self, rev: &str, interesting: bool) -> Result<(), RevWalkError> {
        let rev = if rev.is_empty() { "HEAD" } else { rev };

        let oid = match Revision::new(self.repo, rev).resolve_commit() {
            Ok(oid) => oid,
            Err(RevisionError::InvalidObject(_)) if self.missing => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let commit = self.load_commit(oid)?;
        self.enqueue_commit(oid, &commit);

        if !interesting {
            self.limited = true;
            self.mark(oid, WalkFlags::UNINTERESTING);
            self.mark_parents_uninteresting(&commit);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commit traversal

    fn prepare(&mut self) -> Result<(), RevWalkError> {
        self.prepared = true;
        if self.limited {
            self.limit_list()?;
        }
        if self.objects {
            self.mark_edges_uninteresting()?;
        }
        Ok(())
    }

    fn next_commit(&mut self) -> Result<Option<WalkItem>, RevWalkError> {
        while !self.queue.is_empty() {
            let oid = self.queue.remove(0);
            if !self.limited {
                self.add_parents(oid)?;
            }
            if self.is_marked(oid, WalkFlags::UNINTERESTING)
                || self.is_marked(oid, WalkFlags::TREESAME)
            {
                continue;
            }

            let tree = self.commits[&oid].tree;
            self.pending.push(tree);
            return Ok(Some(WalkItem { oid, path: None }));
        }
        Ok(None)
    }

    /// Run the queue to completion, retaining interesting commits in output
    /// order. The walk stops once everything queued is uninteresting and
    /// no queued commit is newer than the oldest output.
    fn limit_list(&mut self) -> Result<(), RevWalkError> {
        let mut output: Vec<ObjectId> = Vec::new();

        while self.still_interesting(&output) {
            let oid = self.queue.remove(0);
            self.add_parents(oid)?;

            if !self.is_marked(oid, WalkFlags::UNINTERESTING) {
                output.push(oid);
            }
        }

        self.queue = output;
        Ok(())
    }

    fn still_interesting(&self, output: &[ObjectId]) -> bool {
        let Some(newest_in) = self.queue.first() else {
            return false;
        };

        if let Some(oldest_out) = output.last() {
            if self.date(*oldest_out) <= self.date(*newest_in) {
                return true;
            }
        }

        self.queue
            .iter()
            .any(|oid| !self.is_marked(*oid, WalkFlags::UNINTERESTING))
    }

    fn add_parents(&mut self, oid: ObjectId) -> Result<(), RevWalkError> {
        if !(self.walk && self.mark(oid, WalkFlags::ADDED)) {
            return Ok(());
        }

        let commit = self.commits[&oid].clone();
        let parents: Vec<ObjectId> = if self.is_marked(oid, WalkFlags::UNINTERESTING) {
            for parent in &commit.parents {
                let parent_commit = self.load_commit(*parent)?;
                self.mark(*parent, WalkFlags::UNINTERESTING);
                self.mark_parents_uninteresting(&parent_commit);
            }
            commit.parents.clone()
        } else {
            self.simplify_commit(oid, &commit)?
        };

        for parent in parents {
            let parent_commit = self.load_commit(parent)?;
            self.enqueue_commit(parent, &parent_commit);
        }
        Ok(())
    }

    /// With a prune list, a commit that is tree-same to one of its parents
    /// reports only that parent, dropping itself from output.
    fn simplify_commit(
        &mut self,
        oid: ObjectId,
        commit: &Commit,
    ) -> Result<Vec<ObjectId>, RevWalkError> {
        if self.prune.is_empty() {
            return Ok(commit.parents.clone());
        }

        let parents: Vec<Option<ObjectId>> = if commit.parents.is_empty() {
            vec![None]
        } else {
            commit.parents.iter().copied().map(Some).collect()
        };

        for parent in parents {
            if !self.tree_diff(parent, oid)?.is_empty() {
                continue;
            }
            self.mark(oid, WalkFlags::TREESAME);
            return Ok(parent.into_iter().collect());
        }

        Ok(commit.parents.clone())
    }

    fn mark_parents_uninteresting(&mut self, commit: &Commit) {
        let mut queue: Vec<ObjectId> = commit.parents.clone();

        while let Some(oid) = queue.pop() {
            if !self.mark(oid, WalkFlags::UNINTERESTING) {
                continue;
            }
            // Only parents already loaded can propagate further; the rest
            // are painted when they are loaded.
            if let Some(parent) = self.commits.get(&oid) {
                queue.extend(parent.parents.iter().copied());
            }
        }
    }

    fn enqueue_commit(&mut self, oid: ObjectId, commit: &Commit) {
        if !self.mark(oid, WalkFlags::SEEN) {
            return;
        }

        if self.walk {
            let date = commit.date();
            let pos = self
                .queue
                .iter()
                .position(|queued| self.date(*queued) < date)
                .unwrap_or(self.queue.len());
            self.queue.insert(pos, oid);
        } else {
            self.queue.push(oid);
        }
    }

    // ------------------------------------------------------------------
    // Object enumeration

    /// Paint the trees reachable from uninteresting edges, so the object
    /// phase can skip everything the other side already has.
    fn mark_edges_uninteresting(&mut self) -> Result<(), RevWalkError> {
        let queue = self.queue.clone();
        for oid in queue {
            let commit = self.commits[&oid].clone();
            if self.is_marked(oid, WalkFlags::UNINTERESTING) {
                self.mark_tree_uninteresting(commit.tree)?;
            }

            for parent in &commit.parents {
                if !self.is_marked(*parent, WalkFlags::UNINTERESTING) {
                    continue;
                }
                let parent_commit = self.load_commit(*parent)?;
                self.mark_tree_uninteresting(parent_commit.tree)?;
            }
        }
        Ok(())
    }

    fn mark_tree_uninteresting(&mut self, tree_oid: ObjectId) -> Result<(), RevWalkError> {
        let mut stack = vec![TreeEntry::tree(tree_oid)];
        while let Some(entry) = stack.pop() {
            self.mark(entry.oid, WalkFlags::UNINTERESTING);
            if entry.is_tree() {
                let tree = self.repo.database.load_tree(&entry.oid)?;
                stack.extend(tree.entries.values().copied());
            }
        }
        Ok(())
    }

    fn seed_object_stack(&mut self) {
        // Emitted commits' root trees, in emission order.
        let pending = std::mem::take(&mut self.pending);
        for tree in pending.into_iter().rev() {
            self.object_stack
                .push((TreeEntry::tree(tree), BString::from("")));
        }
    }

    fn next_object(&mut self) -> Result<Option<WalkItem>, RevWalkError> {
        while let Some((entry, path)) = self.object_stack.pop() {
            if self.is_marked(entry.oid, WalkFlags::UNINTERESTING) {
                continue;
            }
            if !self.mark(entry.oid, WalkFlags::SEEN) {
                continue;
            }

            if entry.is_tree() {
                let tree = self.repo.database.load_tree(&entry.oid)?;
                for (name, item) in tree.entries.iter().rev() {
                    let child_path = repo_path::join(path.as_ref(), name.as_ref());
                    self.object_stack.push((*item, child_path));
                }
            }

            let path = (!path.is_empty()).then_some(path);
            return Ok(Some(WalkItem {
                oid: entry.oid,
                path,
            }));
        }
        Ok(None)
    }

    // ------------------------------------------------------------------

    fn tree_diff(
        &mut self,
        old: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<&TreeDiffChanges, RevWalkError> {
        let key = (old, new);
        if !self.diffs.contains_key(&key) {
            let diff = self.repo.tree_diff(old, Some(new), &self.filter)?;
            self.diffs.insert(key, diff);
        }
        Ok(&self.diffs[&key])
    }

    fn load_commit(&mut self, oid: ObjectId) -> Result<Commit, RevWalkError> {
        if let Some(commit) = self.commits.get(&oid) {
            return Ok(commit.clone());
        }
        let object = self.repo.database.load(&oid)?;
        let Object::Commit(commit) = object else {
            return Err(RevisionError::InvalidObject(oid.to_hex()).into());
        };
        self.commits.insert(oid, commit.clone());
        Ok(commit)
    }

    fn date(&self, oid: ObjectId) -> i64 {
        self.commits.get(&oid).map(|c| c.date()).unwrap_or(0)
    }

    fn mark(&mut self, oid: ObjectId, flag: WalkFlags) -> bool {
        let flags = self.flags.entry(oid).or_default();
        if flags.contains(flag) {
            false
        } else {
            flags.insert(flag);
            true
        }
    }

    fn is_marked(&self, oid: ObjectId, flag: WalkFlags) -> bool {
        self.flags
            .get(&oid)
            .map(|flags| flags.contains(flag))
            .unwrap_or(false)
    }

}
