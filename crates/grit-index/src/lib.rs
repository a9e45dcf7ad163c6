//! The staging area.
//!
//! Entries are keyed by `(path, stage)` and kept in sorted order so the
//! on-disk form is canonical. A parent-directory map answers "what does
//! this directory contain" without scanning, and the add discipline keeps
//! the index a valid tree projection: a path ejects its conflict stages,
//! any entry that is an ancestor directory of it, and all of its children.

pub mod entry;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

use bstr::{BStr, BString};
use grit_hash::{ChecksumReader, ChecksumWriter, ObjectId};
use grit_object::TreeEntry;
use grit_utils::path as repo_path;
use grit_utils::{LockError, LockFile, UtilError};

pub use entry::IndexEntry;

const SIGNATURE: &[u8; 4] = b"DIRC";
const VERSION: u32 = 2;
const HEADER_SIZE: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Unable to hold index lock: {0}")]
    LockDenied(#[from] LockError),

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<UtilError> for IndexError {
    fn from(e: UtilError) -> Self {
        match e {
            UtilError::Lock(lock) => Self::LockDenied(lock),
            UtilError::Io(io) => Self::Io(io),
            other => Self::Corrupt(other.to_string()),
        }
    }
}

pub struct Index {
    path: PathBuf,
    entries: BTreeMap<(BString, u8), IndexEntry>,
    /// directory → paths of entries somewhere below it.
    parents: HashMap<BString, BTreeSet<BString>>,
    lock: Option<LockFile>,
    changed: bool,
}

impl Index {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: BTreeMap::new(),
            parents: HashMap::new(),
            lock: None,
            changed: false,
        }
    }

    // ------------------------------------------------------------------
    // Loading and persistence

    /// Load for reading; a missing file is an empty index.
    pub fn load(&mut self) -> Result<(), IndexError> {
        self.clear_in_memory();

        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = ChecksumReader::new(file);
        let header = reader.read_exact_hashed(HEADER_SIZE)?;
        if &header[..4] != SIGNATURE {
            return Err(IndexError::Corrupt("bad signature".into()));
        }
        let version = u32::from_be_bytes(header[4..8].try_into().unwrap());
        if version != VERSION {
            return Err(IndexError::Corrupt(format!("unsupported version {version}")));
        }
        let count = u32::from_be_bytes(header[8..12].try_into().unwrap());

        for _ in 0..count {
            let mut data = reader.read_exact_hashed(entry::ENTRY_MIN_SIZE)?;
            while data.last() != Some(&0) {
                data.extend(reader.read_exact_hashed(entry::ENTRY_BLOCK)?);
            }
            self.store_entry(IndexEntry::parse(&data)?);
        }

        reader.verify_trailer()?;
        self.changed = false;
        Ok(())
    }

    /// Take the index lock, then load.
    pub fn load_for_update(&mut self) -> Result<(), IndexError> {
        self.lock = Some(LockFile::acquire(&self.path)?);
        self.load()
    }

    /// Write entries in sorted `(path, stage)` order with a SHA-1 trailer,
    /// or roll the lock back if nothing changed.
    pub fn write_updates(&mut self) -> Result<(), IndexError> {
        let lock = self.lock.take().expect("index not loaded for update");
        if !self.changed {
            lock.rollback()?;
            return Ok(());
        }

        let mut writer = ChecksumWriter::new(lock);

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(SIGNATURE);
        header.extend_from_slice(&VERSION.to_be_bytes());
        header.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        writer.write_hashed(&header)?;

        for entry in self.entries.values() {
            writer.write_hashed(&entry.to_bytes())?;
        }

        let lock = writer.finish()?;
        lock.commit()?;
        self.changed = false;
        Ok(())
    }

    /// Drop the lock without writing.
    pub fn release_lock(&mut self) -> Result<(), IndexError> {
        if let Some(lock) = self.lock.take() {
            lock.rollback()?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mutation

    /// Stage a workspace file at stage 0, clearing conflicts and any entry
    /// the new path shadows.
    pub fn add(&mut self, path: &BStr, oid: ObjectId, meta: &std::fs::Metadata) {
        for stage in 1..=3 {
            self.remove_entry_with_stage(path, stage);
        }
        let entry = IndexEntry::create(path, oid, meta);
        self.discard_conflicts(&entry);
        self.store_entry(entry);
        self.changed = true;
    }

    /// Stage a tree entry at stage 0 with an empty stat cache.
    pub fn add_from_db(&mut self, path: &BStr, item: &TreeEntry) {
        let entry = IndexEntry::create_from_db(path, item, 0);
        self.discard_conflicts(&entry);
        self.store_entry(entry);
        self.changed = true;
    }

    /// Record a conflict: stage 1 = base, 2 = ours, 3 = theirs; absent
    /// versions are skipped. Clears stage 0 for the path.
    pub fn add_conflict_set(&mut self, path: &BStr, items: [Option<TreeEntry>; 3]) {
        self.remove_entry_with_stage(path, 0);

        for (i, item) in items.iter().enumerate() {
            let Some(item) = item else { continue };
            let entry = IndexEntry::create_from_db(path, item, i as u8 + 1);
            self.store_entry(entry);
        }
        self.changed = true;
    }

    /// Remove a path (all stages) and everything below it.
    pub fn remove(&mut self, path: &BStr) {
        self.remove_entry(path);
        self.remove_children(&BString::from(path));
        self.changed = true;
    }

    pub fn clear(&mut self) {
        self.clear_in_memory();
        self.changed = true;
    }

    /// Refresh an entry's stat cache in place.
    pub fn update_entry_stat(&mut self, path: &BStr, meta: &std::fs::Metadata) {
        if let Some(entry) = self.entries.get_mut(&(BString::from(path), 0)) {
            entry.update_stat(meta);
            self.changed = true;
        }
    }

    // ------------------------------------------------------------------
    // Queries

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_for_path(&self, path: &BStr) -> Option<&IndexEntry> {
        self.entry_for_path_stage(path, 0)
    }

    pub fn entry_for_path_stage(&self, path: &BStr, stage: u8) -> Option<&IndexEntry> {
        self.entries.get(&(BString::from(path), stage))
    }

    pub fn is_tracked_file(&self, path: &BStr) -> bool {
        (0..=3).any(|stage| self.entries.contains_key(&(BString::from(path), stage)))
    }

    pub fn is_tracked_directory(&self, path: &BStr) -> bool {
        self.parents.contains_key(&BString::from(path))
    }

    pub fn is_tracked(&self, path: &BStr) -> bool {
        self.is_tracked_file(path) || self.is_tracked_directory(path)
    }

    /// Entry paths directly or transitively below `dir`.
    pub fn child_paths(&self, dir: &BStr) -> Vec<BString> {
        self.parents
            .get(&BString::from(dir))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_conflict(&self) -> bool {
        self.entries.keys().any(|(_, stage)| *stage > 0)
    }

    /// Distinct conflicted paths, in order.
    pub fn conflict_paths(&self) -> Vec<BString> {
        let mut out: Vec<BString> = self
            .entries
            .values()
            .filter(|e| e.stage() > 0)
            .map(|e| e.path.clone())
            .collect();
        out.dedup();
        out
    }

    /// The stages present for a conflicted path, ascending.
    pub fn conflict_stages(&self, path: &BStr) -> Vec<u8> {
        (1..=3)
            .filter(|&stage| self.entries.contains_key(&(BString::from(path), stage)))
            .collect()
    }

    // ------------------------------------------------------------------

    fn clear_in_memory(&mut self) {
        self.entries.clear();
        self.parents.clear();
        self.changed = false;
    }

    fn store_entry(&mut self, entry: IndexEntry) {
        for dir in repo_path::parent_directories(entry.path.as_ref()) {
            self.parents
                .entry(dir)
                .or_default()
                .insert(entry.path.clone());
        }
        self.entries.insert(entry.key(), entry);
    }

    /// A new file entry evicts any entry naming one of its ancestor
    /// directories, and any entry living underneath it.
    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for dir in repo_path::parent_directories(entry.path.as_ref()) {
            self.remove_entry(dir.as_ref());
        }
        self.remove_children(&entry.path);
    }

    fn remove_entry(&mut self, path: &BStr) {
        for stage in 0..=3 {
            self.remove_entry_with_stage(path, stage);
        }
    }

    fn remove_entry_with_stage(&mut self, path: &BStr, stage: u8) {
        let Some(entry) = self.entries.remove(&(BString::from(path), stage)) else {
            return;
        };

        for dir in repo_path::parent_directories(entry.path.as_ref()) {
            if let Some(children) = self.parents.get_mut(&dir) {
                children.remove(&entry.path);
                if children.is_empty() {
                    self.parents.remove(&dir);
                }
            }
        }
    }

    fn remove_children(&mut self, path: &BString) {
        let Some(children) = self.parents.get(path) else {
            return;
        };
        for child in children.clone() {
            self.remove_entry(child.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::ByteSlice;
    use grit_object::FileMode;

    fn tree_entry(n: u8) -> TreeEntry {
        TreeEntry::new(FileMode::Regular, ObjectId::from_raw([n; 20]))
    }

    fn index_at(dir: &Path) -> Index {
        Index::new(dir.join("index"))
    }

    #[test]
    fn add_removes_conflict_stages() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = index_at(dir.path());

        index.add_conflict_set(
            b"f.txt".as_bstr(),
            [Some(tree_entry(1)), Some(tree_entry(2)), Some(tree_entry(3))],
        );
        assert!(index.is_conflict());
        assert_eq!(index.conflict_stages(b"f.txt".as_bstr()), vec![1, 2, 3]);

        index.add_from_db(b"f.txt".as_bstr(), &tree_entry(4));
        assert!(!index.is_conflict());
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.entry_for_path(b"f.txt".as_bstr()).unwrap().oid,
            ObjectId::from_raw([4; 20])
        );
    }

    #[test]
    fn file_replaces_directory_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = index_at(dir.path());

        index.add_from_db(b"out/b.txt".as_bstr(), &tree_entry(1));
        index.add_from_db(b"out/in/c.txt".as_bstr(), &tree_entry(2));
        assert!(index.is_tracked_directory(b"out".as_bstr()));
        assert!(index.is_tracked_directory(b"out/in".as_bstr()));

        // Adding "out" as a file ejects everything under out/.
        index.add_from_db(b"out".as_bstr(), &tree_entry(3));
        assert!(index.is_tracked_file(b"out".as_bstr()));
        assert!(!index.is_tracked_file(b"out/b.txt".as_bstr()));
        assert!(!index.is_tracked_directory(b"out".as_bstr()));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn directory_replaces_file_of_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = index_at(dir.path());

        index.add_from_db(b"out".as_bstr(), &tree_entry(1));
        index.add_from_db(b"out/in/c.txt".as_bstr(), &tree_entry(2));

        assert!(!index.is_tracked_file(b"out".as_bstr()));
        assert!(index.is_tracked_directory(b"out".as_bstr()));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn parent_sets_track_children() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = index_at(dir.path());

        index.add_from_db(b"a/b/c".as_bstr(), &tree_entry(1));
        index.add_from_db(b"a/d".as_bstr(), &tree_entry(2));

        let children = index.child_paths(b"a".as_bstr());
        assert_eq!(children, vec![BString::from("a/b/c"), BString::from("a/d")]);

        index.remove(b"a/b/c".as_bstr());
        assert!(!index.is_tracked_directory(b"a/b".as_bstr()));
        assert_eq!(index.child_paths(b"a".as_bstr()), vec![BString::from("a/d")]);
    }

    #[test]
    fn write_read_canonical_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = index_at(dir.path());

        index.load_for_update().unwrap();
        index.add_from_db(b"b.txt".as_bstr(), &tree_entry(1));
        index.add_from_db(b"a.txt".as_bstr(), &tree_entry(2));
        index.add_conflict_set(
            b"c.txt".as_bstr(),
            [None, Some(tree_entry(3)), Some(tree_entry(4))],
        );
        index.write_updates().unwrap();

        let first = std::fs::read(dir.path().join("index")).unwrap();

        // Re-load and re-write: byte-identical output.
        let mut reloaded = index_at(dir.path());
        reloaded.load_for_update().unwrap();
        reloaded.add_from_db(b"a.txt".as_bstr(), &tree_entry(2));
        reloaded.write_updates().unwrap();

        let second = std::fs::read(dir.path().join("index")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn corrupted_file_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = index_at(dir.path());
        index.load_for_update().unwrap();
        index.add_from_db(b"a.txt".as_bstr(), &tree_entry(1));
        index.write_updates().unwrap();

        let path = dir.path().join("index");
        let mut data = std::fs::read(&path).unwrap();
        let mid = data.len() / 2;
        data[mid] ^= 0x40;
        std::fs::write(&path, data).unwrap();

        let mut reloaded = index_at(dir.path());
        assert!(reloaded.load().is_err());
    }

    #[test]
    fn lock_contention_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.lock"), b"").unwrap();

        let mut index = index_at(dir.path());
        assert!(matches!(
            index.load_for_update(),
            Err(IndexError::LockDenied(_))
        ));
    }

    #[test]
    fn unchanged_index_rolls_back_lock() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = index_at(dir.path());
        index.load_for_update().unwrap();
        index.write_updates().unwrap();

        assert!(!dir.path().join("index").exists());
        assert!(!dir.path().join("index.lock").exists());
    }
}
