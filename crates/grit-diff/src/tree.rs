//! Recursive tree diffing with path pruning.

use std::collections::{BTreeMap, HashMap};

use bstr::{BStr, BString};
use grit_hash::ObjectId;
use grit_object::{Object, Tree, TreeEntry};
use grit_odb::{Database, OdbError};
use grit_utils::path as repo_path;

/// path → (old entry, new entry); one side is `None` for pure additions
/// and deletions.
pub type TreeDiffChanges = BTreeMap<BString, (Option<TreeEntry>, Option<TreeEntry>)>;

/// Restricts a tree walk to a set of requested paths. Built as a trie so
/// each level of the walk only descends where a route exists; an empty
/// path set matches everything.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    matched: bool,
    children: HashMap<BString, PathFilter>,
    prefix: BString,
}

impl PathFilter {
    /// A filter matching every path.
    pub fn any() -> Self {
        Self {
            matched: true,
            children: HashMap::new(),
            prefix: BString::from(""),
        }
    }

    pub fn build(paths: &[BString]) -> Self {
        if paths.is_empty() {
            return Self::any();
        }

        let mut root = Self::default();
        for path in paths {
            let mut node = &mut root;
            for part in repo_path::components(path.as_ref()) {
                node = node.children.entry(BString::from(part)).or_default();
            }
            node.matched = true;
        }
        root
    }

    /// The full path this filter has descended to.
    pub fn prefix(&self) -> &BStr {
        self.prefix.as_ref()
    }

    /// Does this level admit `name`?
    pub fn admits(&self, name: &BStr) -> bool {
        self.matched || self.children.contains_key(&BString::from(name))
    }

    /// Descend into `name`, carrying the wildcard state down.
    pub fn join(&self, name: &BStr) -> Self {
        let next = if self.matched {
            Self {
                matched: true,
                children: HashMap::new(),
                prefix: BString::from(""),
            }
        } else {
            self.children
                .get(&BString::from(name))
                .cloned()
                .unwrap_or_default()
        };

        Self {
            prefix: repo_path::join(self.prefix.as_ref(), name),
            ..next
        }
    }
}

/// Computes the per-path changes between two trees (or commits).
pub struct TreeDiff<'a> {
    db: &'a Database,
    pub changes: TreeDiffChanges,
}

impl<'a> TreeDiff<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            changes: BTreeMap::new(),
        }
    }

    /// Diff two root OIDs; either may be `None` (empty tree) and either may
    /// name a commit, in which case its tree is diffed.
    pub fn compare_oids(
        &mut self,
        a: Option<ObjectId>,
        b: Option<ObjectId>,
        filter: &PathFilter,
    ) -> Result<(), OdbError> {
        if a == b {
            return Ok(());
        }

        let a_entries = self.oid_to_tree(a)?.map(|t| t.entries).unwrap_or_default();
        let b_entries = self.oid_to_tree(b)?.map(|t| t.entries).unwrap_or_default();

        self.detect_deletions(&a_entries, &b_entries, filter)?;
        self.detect_additions(&a_entries, &b_entries, filter)?;
        Ok(())
    }

    fn oid_to_tree(&self, oid: Option<ObjectId>) -> Result<Option<Tree>, OdbError> {
        let Some(oid) = oid else { return Ok(None) };

        match self.db.load(&oid)? {
            Object::Commit(commit) => Ok(Some(self.db.load_tree(&commit.tree)?)),
            Object::Tree(tree) => Ok(Some(tree)),
            Object::Blob(_) => Ok(None),
        }
    }

    /// Entries changed or removed on the `a` side.
    fn detect_deletions(
        &mut self,
        a: &BTreeMap<BString, TreeEntry>,
        b: &BTreeMap<BString, TreeEntry>,
        filter: &PathFilter,
    ) -> Result<(), OdbError> {
        for (name, entry) in a {
            if !filter.admits(name.as_ref()) {
                continue;
            }
            let other = b.get(name);
            if other == Some(entry) {
                continue;
            }

            let sub_filter = filter.join(name.as_ref());

            let tree_a = entry.is_tree().then_some(entry.oid);
            let tree_b = other.filter(|e| e.is_tree()).map(|e| e.oid);
            self.compare_oids(tree_a, tree_b, &sub_filter)?;

            let blob_a = (!entry.is_tree()).then_some(*entry);
            let blob_b = other.filter(|e| !e.is_tree()).copied();
            if blob_a.is_some() || blob_b.is_some() {
                self.changes
                    .insert(BString::from(sub_filter.prefix()), (blob_a, blob_b));
            }
        }
        Ok(())
    }

    /// Entries present only on the `b` side.
    fn detect_additions(
        &mut self,
        a: &BTreeMap<BString, TreeEntry>,
        b: &BTreeMap<BString, TreeEntry>,
        filter: &PathFilter,
    ) -> Result<(), OdbError> {
        for (name, entry) in b {
            if !filter.admits(name.as_ref()) {
                continue;
            }
            if a.contains_key(name) {
                continue;
            }

            let sub_filter = filter.join(name.as_ref());

            if entry.is_tree() {
                self.compare_oids(None, Some(entry.oid), &sub_filter)?;
            } else {
                self.changes
                    .insert(BString::from(sub_filter.prefix()), (None, Some(*entry)));
            }
        }
        Ok(())
    }
}

/// One-call convenience over [`TreeDiff`].
pub fn tree_diff(
    db: &Database,
    a: Option<ObjectId>,
    b: Option<ObjectId>,
    filter: &PathFilter,
) -> Result<TreeDiffChanges, OdbError> {
    let mut diff = TreeDiff::new(db);
    diff.compare_oids(a, b, filter)?;
    Ok(diff.changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_object::{Blob, FileMode};

    fn store_blob(db: &Database, content: &str) -> TreeEntry {
        let oid = db.store(&Object::Blob(Blob::new(content))).unwrap();
        TreeEntry::new(FileMode::Regular, oid)
    }

    fn store_tree(db: &Database, entries: &[(&str, TreeEntry)]) -> TreeEntry {
        let mut tree = Tree::new();
        for (name, entry) in entries {
            tree.entries.insert(BString::from(*name), *entry);
        }
        let oid = db.store(&Object::Tree(tree)).unwrap();
        TreeEntry::tree(oid)
    }

    fn setup() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("objects"));
        (dir, db)
    }

    #[test]
    fn detects_adds_updates_and_deletes() {
        let (_dir, db) = setup();

        let one = store_blob(&db, "1");
        let two = store_blob(&db, "2");
        let four = store_blob(&db, "4");

        let old_root = store_tree(
            &db,
            &[
                ("a.txt", one),
                ("out", store_tree(&db, &[("b.txt", two)])),
            ],
        );
        let new_root = store_tree(
            &db,
            &[
                ("out", store_tree(&db, &[("b.txt", four), ("c.txt", one)])),
            ],
        );

        let changes = tree_diff(
            &db,
            Some(old_root.oid),
            Some(new_root.oid),
            &PathFilter::any(),
        )
        .unwrap();

        assert_eq!(changes.len(), 3);
        assert_eq!(changes[&BString::from("a.txt")], (Some(one), None));
        assert_eq!(changes[&BString::from("out/b.txt")], (Some(two), Some(four)));
        assert_eq!(changes[&BString::from("out/c.txt")], (None, Some(one)));
    }

    #[test]
    fn identical_trees_produce_no_changes() {
        let (_dir, db) = setup();
        let blob = store_blob(&db, "same");
        let root = store_tree(&db, &[("f", blob)]);

        let changes =
            tree_diff(&db, Some(root.oid), Some(root.oid), &PathFilter::any()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn none_side_is_empty_tree() {
        let (_dir, db) = setup();
        let blob = store_blob(&db, "data");
        let root = store_tree(&db, &[("f", blob)]);

        let changes = tree_diff(&db, None, Some(root.oid), &PathFilter::any()).unwrap();
        assert_eq!(changes[&BString::from("f")], (None, Some(blob)));

        let changes = tree_diff(&db, Some(root.oid), None, &PathFilter::any()).unwrap();
        assert_eq!(changes[&BString::from("f")], (Some(blob), None));
    }

    #[test]
    fn file_becoming_directory_reports_both_shapes() {
        let (_dir, db) = setup();
        let file = store_blob(&db, "plain");
        let nested = store_blob(&db, "nested");

        let old_root = store_tree(&db, &[("x", file)]);
        let new_root = store_tree(&db, &[("x", store_tree(&db, &[("inner", nested)]))]);

        let changes = tree_diff(
            &db,
            Some(old_root.oid),
            Some(new_root.oid),
            &PathFilter::any(),
        )
        .unwrap();

        assert_eq!(changes[&BString::from("x")], (Some(file), None));
        assert_eq!(changes[&BString::from("x/inner")], (None, Some(nested)));
    }

    #[test]
    fn path_filter_prunes_unrelated_changes() {
        let (_dir, db) = setup();
        let one = store_blob(&db, "1");
        let two = store_blob(&db, "2");

        let old_root = store_tree(
            &db,
            &[
                ("keep.txt", one),
                ("out", store_tree(&db, &[("b.txt", one)])),
            ],
        );
        let new_root = store_tree(
            &db,
            &[
                ("keep.txt", two),
                ("out", store_tree(&db, &[("b.txt", two)])),
            ],
        );

        let filter = PathFilter::build(&[BString::from("out/b.txt")]);
        let changes =
            tree_diff(&db, Some(old_root.oid), Some(new_root.oid), &filter).unwrap();

        assert_eq!(changes.len(), 1);
        assert!(changes.contains_key(&BString::from("out/b.txt")));
    }
}
