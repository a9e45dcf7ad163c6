//! Walk ordering, range exclusion, path pruning, and object enumeration.

use bstr::{BStr, BString};
use grit_hash::ObjectId;
use grit_object::{Blob, Commit, Object, Tree, TreeEntry, FileMode};
use grit_repository::Repository;
use grit_revwalk::{RevList, RevListOptions, Revision};
use grit_utils::date::{GitDate, Signature};

struct Fixture {
    _dir: tempfile::TempDir,
    repo: Repository,
    tick: i64,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let git = dir.path().join(".git");
        std::fs::create_dir_all(git.join("objects")).unwrap();
        std::fs::create_dir_all(git.join("refs/heads")).unwrap();
        std::fs::write(git.join("HEAD"), "ref: refs/heads/master\n").unwrap();
        Self {
            repo: Repository::new(git),
            _dir: dir,
            tick: 1_000_000,
        }
    }

    fn blob(&self, content: &str) -> TreeEntry {
        let oid = self
            .repo
            .database
            .store(&Object::Blob(Blob::new(content)))
            .unwrap();
        TreeEntry::new(FileMode::Regular, oid)
    }

    fn tree(&self, entries: &[(&str, TreeEntry)]) -> ObjectId {
        let mut tree = Tree::new();
        for (name, entry) in entries {
            tree.entries.insert(BString::from(*name), *entry);
        }
        self.repo.database.store(&Object::Tree(tree)).unwrap()
    }

    fn commit(&mut self, parents: &[ObjectId], tree: ObjectId, message: &str) -> ObjectId {
        self.tick += 10;
        let sig = Signature::new("A", "a@b.com", GitDate::new(self.tick, 0));
        let commit = Commit::new(
            parents.to_vec(),
            tree,
            sig.clone(),
            sig,
            format!("{message}\n"),
        );
        let oid = self.repo.database.store(&Object::Commit(commit)).unwrap();
        self.repo.refs.update_ref("refs/heads/master", &oid).unwrap();
        oid
    }

    fn messages(&self, revs: &[String], options: RevListOptions) -> Vec<String> {
        let mut list = RevList::new(&self.repo, revs, options).unwrap();
        let items = list.collect_items().unwrap();
        items
            .iter()
            .filter_map(|item| list.commit(&item.oid))
            .map(|c| c.title_line().to_string())
            .collect()
    }
}

#[test]
fn walk_yields_commits_newest_first() {
    let mut fx = Fixture::new();
    let tree = fx.tree(&[("f.txt", fx.blob("x"))]);
    let a = fx.commit(&[], tree, "a");
    let b = fx.commit(&[a], tree, "b");
    let _c = fx.commit(&[b], tree, "c");

    let messages = fx.messages(&["HEAD".into()], RevListOptions::walking());
    assert_eq!(messages, vec!["c", "b", "a"]);
}

#[test]
fn range_excludes_ancestors_of_the_left_side() {
    let mut fx = Fixture::new();
    let tree = fx.tree(&[("f.txt", fx.blob("x"))]);
    let a = fx.commit(&[], tree, "a");
    let b = fx.commit(&[a], tree, "b");
    let c = fx.commit(&[b], tree, "c");
    let _d = fx.commit(&[c], tree, "d");

    let range = format!("{}..{}", b.to_hex(), "HEAD");
    let messages = fx.messages(&[range], RevListOptions::walking());
    assert_eq!(messages, vec!["d", "c"]);
}

#[test]
fn caret_prefix_excludes_like_a_range() {
    let mut fx = Fixture::new();
    let tree = fx.tree(&[("f.txt", fx.blob("x"))]);
    let a = fx.commit(&[], tree, "a");
    let b = fx.commit(&[a], tree, "b");
    let _c = fx.commit(&[b], tree, "c");

    let messages = fx.messages(
        &[format!("^{}", a.to_hex()), "HEAD".to_string()],
        RevListOptions::walking(),
    );
    assert_eq!(messages, vec!["c", "b"]);
}

#[test]
fn path_pruning_skips_treesame_commits() {
    let mut fx = Fixture::new();
    let one = fx.blob("1");
    let two = fx.blob("2");
    let other = fx.blob("other");

    let tree_a = fx.tree(&[("target.txt", one), ("noise.txt", other)]);
    let a = fx.commit(&[], tree_a, "touches target");

    // Only noise changes here.
    let noise2 = fx.blob("more noise");
    let tree_b = fx.tree(&[("target.txt", one), ("noise.txt", noise2)]);
    let b = fx.commit(&[a], tree_b, "noise only");

    let tree_c = fx.tree(&[("target.txt", two), ("noise.txt", noise2)]);
    let _c = fx.commit(&[b], tree_c, "touches target again");

    // A pruned walk must mention only commits affecting target.txt. The
    // path must exist in the workspace to be taken as a prune path.
    std::fs::write(fx.repo.workspace.root().join("target.txt"), "2").unwrap();

    let messages = fx.messages(
        &["target.txt".to_string(), "HEAD".to_string()],
        RevListOptions::walking(),
    );
    assert_eq!(messages, vec!["touches target again", "touches target"]);
}

#[test]
fn object_enumeration_covers_trees_and_blobs_once() {
    let mut fx = Fixture::new();
    let shared = fx.blob("shared");
    let tree_a = fx.tree(&[("f.txt", shared)]);
    let a = fx.commit(&[], tree_a, "a");
    let tree_b = fx.tree(&[("f.txt", shared), ("g.txt", fx.blob("new"))]);
    let b = fx.commit(&[a], tree_b, "b");

    let options = RevListOptions {
        walk: true,
        objects: true,
        missing: false,
        all: false,
    };
    let mut list = RevList::new(&fx.repo, &["HEAD".to_string()], options).unwrap();
    let items = list.collect_items().unwrap();

    let oids: Vec<ObjectId> = items.iter().map(|i| i.oid).collect();
    let mut deduped = oids.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(oids.len(), deduped.len(), "no object listed twice");

    // 2 commits + 2 trees + 2 blobs.
    assert_eq!(oids.len(), 6);
    assert!(oids.contains(&a));
    assert!(oids.contains(&b));
    assert!(oids.contains(&shared.oid));

    // Blobs carry the path they were reached by.
    let shared_item = items.iter().find(|i| i.oid == shared.oid).unwrap();
    assert_eq!(
        shared_item.path.as_deref().map(BStr::new),
        Some(BStr::new("f.txt"))
    );
}

#[test]
fn exclusion_marks_shared_objects_uninteresting() {
    let mut fx = Fixture::new();
    let shared = fx.blob("shared");
    let tree_a = fx.tree(&[("f.txt", shared)]);
    let a = fx.commit(&[], tree_a, "a");
    let fresh = fx.blob("fresh");
    let tree_b = fx.tree(&[("f.txt", shared), ("g.txt", fresh)]);
    let b = fx.commit(&[a], tree_b, "b");

    let options = RevListOptions {
        walk: true,
        objects: true,
        missing: false,
        all: false,
    };
    let revs = vec![format!("{}..{}", a.to_hex(), b.to_hex())];
    let mut list = RevList::new(&fx.repo, &revs, options).unwrap();
    let oids: Vec<ObjectId> = list
        .collect_items()
        .unwrap()
        .into_iter()
        .map(|i| i.oid)
        .collect();

    // Only what the receiver lacks: commit b, its root tree, and the new
    // blob. The shared blob and commit a stay out.
    assert!(oids.contains(&b));
    assert!(oids.contains(&fresh.oid));
    assert!(!oids.contains(&a));
    assert!(!oids.contains(&shared.oid));
    assert_eq!(oids.len(), 3);
}

#[test]
fn revision_suffixes_resolve_against_the_graph() {
    let mut fx = Fixture::new();
    let tree = fx.tree(&[("f.txt", fx.blob("x"))]);
    let a = fx.commit(&[], tree, "a");
    let b = fx.commit(&[a], tree, "b");
    let c = fx.commit(&[b], tree, "c");

    let resolve = |expr: &str| Revision::new(&fx.repo, expr).resolve_commit().unwrap();

    assert_eq!(resolve("HEAD"), c);
    assert_eq!(resolve("@"), c);
    assert_eq!(resolve("HEAD^"), b);
    assert_eq!(resolve("HEAD~2"), a);
    assert_eq!(resolve("master^^"), a);
    assert_eq!(resolve(&c.to_hex()[..8]), c);
}

#[test]
fn ambiguous_prefix_is_an_error_with_candidates() {
    let fx = Fixture::new();

    // Manufacture blobs until two share a 2-char prefix.
    let mut by_prefix: std::collections::HashMap<String, Vec<ObjectId>> =
        std::collections::HashMap::new();
    let mut ambiguous = None;
    for i in 0..200u32 {
        let oid = fx
            .repo
            .database
            .store(&Object::Blob(Blob::new(format!("filler {i}"))))
            .unwrap();
        let bucket = by_prefix.entry(oid.to_hex()[..2].to_string()).or_default();
        bucket.push(oid);
        if bucket.len() > 1 {
            ambiguous = Some(oid.to_hex()[..2].to_string());
            break;
        }
    }

    let prefix = ambiguous.expect("a shared prefix within 200 blobs");
    let mut revision = Revision::new(&fx.repo, &prefix);
    assert!(revision.resolve().is_err());
    assert!(revision
        .errors
        .iter()
        .any(|e| e.message.contains("is ambiguous")));
}
