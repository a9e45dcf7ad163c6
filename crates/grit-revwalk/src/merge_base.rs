//! Common-ancestor discovery and the fast-forward test.
//!
//! A two-flag search: the source commit is painted `PARENT1`, the targets
//! `PARENT2`. Wherever both paints meet, that commit is a candidate base
//! and everything above it goes stale. A second pass removes candidates
//! that are ancestors of other candidates.

use std::collections::HashMap;

use bitflags::bitflags;
use grit_hash::ObjectId;
use grit_odb::{Database, OdbError};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BaseFlags: u8 {
        const PARENT1 = 1 << 0;
        const PARENT2 = 1 << 1;
        const STALE   = 1 << 2;
        const RESULT  = 1 << 3;
    }
}

const BOTH_PARENTS: BaseFlags = BaseFlags::PARENT1.union(BaseFlags::PARENT2);

pub struct CommonAncestors<'a> {
    db: &'a Database,
    flags: HashMap<ObjectId, BaseFlags>,
    /// Newest-first queue, stable among equal dates.
    queue: Vec<ObjectId>,
    results: Vec<ObjectId>,
    dates: HashMap<ObjectId, i64>,
}

impl<'a> CommonAncestors<'a> {
    pub fn new(db: &'a Database, one: ObjectId, twos: &[ObjectId]) -> Result<Self, OdbError> {
        let mut this = Self {
            db,
            flags: HashMap::new(),
            queue: Vec::new(),
            results: Vec::new(),
            dates: HashMap::new(),
        };

        this.insert_by_date(one)?;
        this.flags.entry(one).or_default().insert(BaseFlags::PARENT1);

        for &two in twos {
            this.insert_by_date(two)?;
            this.flags.entry(two).or_default().insert(BaseFlags::PARENT2);
        }

        Ok(this)
    }

    pub fn find(&mut self) -> Result<Vec<ObjectId>, OdbError> {
        while !self.all_stale() {
            self.process_queue()?;
        }

        Ok(self
            .results
            .iter()
            .filter(|oid| !self.is_marked(**oid, BaseFlags::STALE))
            .copied()
            .collect())
    }

    pub fn is_marked(&self, oid: ObjectId, flag: BaseFlags) -> bool {
        self.flags
            .get(&oid)
            .map(|flags| flags.contains(flag))
            .unwrap_or(false)
    }

    fn all_stale(&self) -> bool {
        self.queue
            .iter()
            .all(|oid| self.is_marked(*oid, BaseFlags::STALE))
    }

    fn process_queue(&mut self) -> Result<(), OdbError> {
        let oid = self.queue.remove(0);
        let flags = self.flags.get(&oid).copied().unwrap_or_default();

        if flags == BOTH_PARENTS {
            self.flags.entry(oid).or_default().insert(BaseFlags::RESULT);
            self.insert_result_by_date(oid);
            self.add_parents(oid, flags | BaseFlags::STALE)?;
        } else {
            self.add_parents(oid, flags)?;
        }
        Ok(())
    }

    fn add_parents(&mut self, oid: ObjectId, flags: BaseFlags) -> Result<(), OdbError> {
        let commit = self.db.load_commit(&oid)?;

        for parent in commit.parents {
            let current = self.flags.entry(parent).or_default();
            if current.contains(flags) {
                continue;
            }
            current.insert(flags);
            self.insert_by_date(parent)?;
        }
        Ok(())
    }

    fn date(&mut self, oid: ObjectId) -> Result<i64, OdbError> {
        if let Some(date) = self.dates.get(&oid) {
            return Ok(*date);
        }
        let date = self.db.load_commit(&oid)?.date();
        self.dates.insert(oid, date);
        Ok(date)
    }

    fn insert_by_date(&mut self, oid: ObjectId) -> Result<(), OdbError> {
        let date = self.date(oid)?;
        let pos = {
            let mut found = self.queue.len();
            for (i, queued) in self.queue.iter().enumerate() {
                if self.dates[queued] < date {
                    found = i;
                    break;
                }
            }
            found
        };
        self.queue.insert(pos, oid);
        Ok(())
    }

    fn insert_result_by_date(&mut self, oid: ObjectId) {
        let date = self.dates.get(&oid).copied().unwrap_or(0);
        let pos = self
            .results
            .iter()
            .position(|queued| self.dates.get(queued).copied().unwrap_or(0) < date)
            .unwrap_or(self.results.len());
        self.results.insert(pos, oid);
    }
}

/// Best common ancestors: the `CommonAncestors` result with redundant bases
/// (ancestors of other bases) filtered out.
pub struct Bases<'a> {
    db: &'a Database,
    commits: Vec<ObjectId>,
}

impl<'a> Bases<'a> {
    pub fn new(db: &'a Database, one: ObjectId, two: ObjectId) -> Result<Self, OdbError> {
        let commits = CommonAncestors::new(db, one, &[two])?.find()?;
        Ok(Self { db, commits })
    }

    pub fn find(&mut self) -> Result<Vec<ObjectId>, OdbError> {
        if self.commits.len() <= 1 {
            return Ok(self.commits.clone());
        }

        let mut redundant: Vec<ObjectId> = Vec::new();

        for commit in self.commits.clone() {
            self.filter_commit(commit, &mut redundant)?;
        }

        Ok(self
            .commits
            .iter()
            .filter(|oid| !redundant.contains(oid))
            .copied()
            .collect())
    }

    fn filter_commit(
        &mut self,
        commit: ObjectId,
        redundant: &mut Vec<ObjectId>,
    ) -> Result<(), OdbError> {
        if redundant.contains(&commit) {
            return Ok(());
        }

        let others: Vec<ObjectId> = self
            .commits
            .iter()
            .filter(|oid| **oid != commit && !redundant.contains(oid))
            .copied()
            .collect();

        let mut common = CommonAncestors::new(self.db, commit, &others)?;
        common.find()?;

        if common.is_marked(commit, BaseFlags::PARENT2) {
            redundant.push(commit);
        }
        for other in others {
            if common.is_marked(other, BaseFlags::PARENT1) {
                redundant.push(other);
            }
        }
        Ok(())
    }
}

/// Why a non-forced ref update from `old` to `new` must be rejected, if at
/// all: the receiver does not know `old`, or `new` does not descend from it.
pub fn fast_forward_error(
    db: &Database,
    old: Option<ObjectId>,
    new: Option<ObjectId>,
) -> Result<Option<&'static str>, OdbError> {
    let (Some(old), Some(new)) = (old, new) else {
        return Ok(None);
    };

    if !db.has(&old) {
        return Ok(Some("fetch first"));
    }
    if !is_fast_forward(db, old, new)? {
        return Ok(Some("non-fast-forward"));
    }
    Ok(None)
}

/// `new` is a fast-forward of `old` iff `old` is an ancestor of `new`.
pub fn is_fast_forward(db: &Database, old: ObjectId, new: ObjectId) -> Result<bool, OdbError> {
    let mut common = CommonAncestors::new(db, old, &[new])?;
    common.find()?;
    Ok(common.is_marked(old, BaseFlags::PARENT2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use grit_object::{Commit, Object, Tree};
    use grit_utils::date::{GitDate, Signature};
    use std::collections::HashMap as Map;

    /// Build a commit graph from (name, parents) pairs; dates increase in
    /// listing order.
    fn build_graph(db: &Database, spec: &[(&str, &[&str])]) -> Map<String, ObjectId> {
        let tree = db.store(&Object::Tree(Tree::new())).unwrap();
        let mut oids: Map<String, ObjectId> = Map::new();

        for (i, (name, parents)) in spec.iter().enumerate() {
            let date = GitDate::new(1_000_000 + i as i64 * 10, 0);
            let sig = Signature::new("A", "a@b.com", date);
            let parent_oids = parents.iter().map(|p| oids[*p]).collect();
            let commit = Commit::new(
                parent_oids,
                tree,
                sig.clone(),
                sig,
                BString::from(format!("{name}\n")),
            );
            let oid = db.store(&Object::Commit(commit)).unwrap();
            oids.insert(name.to_string(), oid);
        }
        oids
    }

    fn setup() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("objects"));
        (dir, db)
    }

    #[test]
    fn linear_history_base_is_older_commit() {
        let (_dir, db) = setup();
        let oids = build_graph(&db, &[("a", &[]), ("b", &["a"]), ("c", &["b"])]);

        let mut bases = Bases::new(&db, oids["c"], oids["a"]).unwrap();
        assert_eq!(bases.find().unwrap(), vec![oids["a"]]);
    }

    #[test]
    fn forked_history_finds_fork_point() {
        let (_dir, db) = setup();
        let oids = build_graph(
            &db,
            &[
                ("a", &[]),
                ("b", &["a"]),
                ("c", &["b"]),
                ("d", &["b"]),
                ("e", &["c"]),
                ("f", &["d"]),
            ],
        );

        let mut bases = Bases::new(&db, oids["e"], oids["f"]).unwrap();
        assert_eq!(bases.find().unwrap(), vec![oids["b"]]);
    }

    #[test]
    fn criss_cross_merge_yields_two_bases() {
        // a - b - d - f
        //   \   X   /
        //     c - e
        // d merges (b, c); e merges (c, b): both b and c are bases of (f-ish).
        let (_dir, db) = setup();
        let oids = build_graph(
            &db,
            &[
                ("a", &[]),
                ("b", &["a"]),
                ("c", &["a"]),
                ("d", &["b", "c"]),
                ("e", &["c", "b"]),
            ],
        );

        let mut bases = Bases::new(&db, oids["d"], oids["e"]).unwrap();
        let mut found = bases.find().unwrap();
        found.sort();
        let mut expected = vec![oids["b"], oids["c"]];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn redundant_base_is_filtered() {
        // a - b - c  and a side branch from b: both a and b are common
        // ancestors, but a is an ancestor of b, so only b survives.
        let (_dir, db) = setup();
        let oids = build_graph(
            &db,
            &[
                ("a", &[]),
                ("b", &["a"]),
                ("left", &["b"]),
                ("right", &["b"]),
            ],
        );

        let mut bases = Bases::new(&db, oids["left"], oids["right"]).unwrap();
        assert_eq!(bases.find().unwrap(), vec![oids["b"]]);
    }

    #[test]
    fn fast_forward_checks() {
        let (_dir, db) = setup();
        let oids = build_graph(
            &db,
            &[("a", &[]), ("b", &["a"]), ("c", &["b"]), ("side", &["a"])],
        );

        assert!(is_fast_forward(&db, oids["a"], oids["c"]).unwrap());
        assert!(!is_fast_forward(&db, oids["c"], oids["a"]).unwrap());
        assert!(!is_fast_forward(&db, oids["side"], oids["c"]).unwrap());

        assert_eq!(
            fast_forward_error(&db, Some(oids["a"]), Some(oids["c"])).unwrap(),
            None
        );
        assert_eq!(
            fast_forward_error(&db, Some(oids["side"]), Some(oids["c"])).unwrap(),
            Some("non-fast-forward")
        );
        assert_eq!(fast_forward_error(&db, None, Some(oids["c"])).unwrap(), None);

        let unknown = ObjectId::from_raw([0xaa; 20]);
        assert_eq!(
            fast_forward_error(&db, Some(unknown), Some(oids["c"])).unwrap(),
            Some("fetch first")
        );
    }
}
