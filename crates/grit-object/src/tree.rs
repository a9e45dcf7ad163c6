use std::collections::BTreeMap;

use bstr::{BStr, BString, ByteSlice};
use grit_hash::ObjectId;

use crate::ObjectError;

/// File mode for tree entries. Only the three modes git actually writes for
/// this repository model are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// Regular file (100644)
    Regular,
    /// Executable file (100755)
    Executable,
    /// Subdirectory (040000)
    Tree,
}

impl FileMode {
    /// Parse from octal ASCII bytes (e.g. `b"100644"`, `b"40000"`).
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        let mut raw: u32 = 0;
        for &b in s {
            if !(b'0'..=b'7').contains(&b) {
                return Err(ObjectError::InvalidFileMode(
                    String::from_utf8_lossy(s).into(),
                ));
            }
            raw = raw * 8 + u32::from(b - b'0');
        }
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: u32) -> Result<Self, ObjectError> {
        match raw {
            0o100644 => Ok(Self::Regular),
            0o100755 => Ok(Self::Executable),
            0o040000 => Ok(Self::Tree),
            other => Err(ObjectError::InvalidFileMode(format!("{other:o}"))),
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Tree => 0o40000,
        }
    }

    /// The canonical in-tree spelling (no leading zero for directories).
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Self::Regular => b"100644",
            Self::Executable => b"100755",
            Self::Tree => b"40000",
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree)
    }
}

/// A `(mode, oid)` pair; the entry name is the key in the owning tree, and
/// the same shape names a file version in tree diffs and merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: FileMode, oid: ObjectId) -> Self {
        Self { mode, oid }
    }

    pub fn tree(oid: ObjectId) -> Self {
        Self {
            mode: FileMode::Tree,
            oid,
        }
    }

    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }
}

/// An immutable directory snapshot: an ordered set of named entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: BTreeMap<BString, TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a tree payload: repeated `<mode> SP <name> NUL <20 raw bytes>`.
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut entries = BTreeMap::new();
        let mut pos = 0;

        while pos < payload.len() {
            let space = payload[pos..]
                .find_byte(b' ')
                .map(|p| p + pos)
                .ok_or_else(|| ObjectError::InvalidTree("missing mode terminator".into()))?;
            let mode = FileMode::from_bytes(&payload[pos..space])?;

            let nul = payload[space..]
                .find_byte(0)
                .map(|p| p + space)
                .ok_or_else(|| ObjectError::InvalidTree("missing name terminator".into()))?;
            let name = BString::from(&payload[space + 1..nul]);

            let oid_end = nul + 1 + grit_hash::DIGEST_LEN;
            if oid_end > payload.len() {
                return Err(ObjectError::InvalidTree("truncated entry oid".into()));
            }
            let oid = ObjectId::from_bytes(&payload[nul + 1..oid_end])?;

            entries.insert(name, TreeEntry { mode, oid });
            pos = oid_end;
        }

        Ok(Self { entries })
    }

    /// Serialize in git's tree order: entry names compare as if directories
    /// carried a trailing `/`.
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut sorted: Vec<(&BString, &TreeEntry)> = self.entries.iter().collect();
        sorted.sort_by(|(a_name, a), (b_name, b)| {
            sort_key(a_name, a.is_tree()).cmp(&sort_key(b_name, b.is_tree()))
        });

        let mut out = Vec::new();
        for (name, entry) in sorted {
            out.extend_from_slice(entry.mode.as_bytes());
            out.push(b' ');
            out.extend_from_slice(name);
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    pub fn get(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.get(name)
    }
}

fn sort_key(name: &BString, is_tree: bool) -> BString {
    if is_tree {
        let mut key = name.clone();
        key.push(b'/');
        key
    } else {
        name.clone()
    }
}

/// Builds nested tree objects from flat index paths, storing each subtree
/// bottom-up through the supplied callback.
#[derive(Default)]
pub struct TreeBuilder {
    entries: BTreeMap<BString, Node>,
}

enum Node {
    Leaf(TreeEntry),
    Dir(TreeBuilder),
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a flat path like `"out/in/c.txt"`, creating intermediate
    /// directories as needed.
    pub fn insert(&mut self, path: &BStr, entry: TreeEntry) {
        match path.find_byte(b'/') {
            None => {
                self.entries.insert(BString::from(path), Node::Leaf(entry));
            }
            Some(slash) => {
                let head = BString::from(&path[..slash]);
                let rest = BStr::new(&path[slash + 1..]);
                let node = self
                    .entries
                    .entry(head)
                    .or_insert_with(|| Node::Dir(TreeBuilder::new()));
                match node {
                    Node::Dir(builder) => builder.insert(rest, entry),
                    Node::Leaf(_) => {
                        // A file and a directory cannot share a name; the
                        // index add discipline prevents this upstream.
                        let mut builder = TreeBuilder::new();
                        builder.insert(rest, entry);
                        *node = Node::Dir(builder);
                    }
                }
            }
        }
    }

    /// Store every subtree bottom-up and return the root tree's OID.
    pub fn write<E>(
        &self,
        store: &mut dyn FnMut(&Tree) -> Result<ObjectId, E>,
    ) -> Result<ObjectId, E> {
        let mut tree = Tree::new();
        for (name, node) in &self.entries {
            let entry = match node {
                Node::Leaf(entry) => *entry,
                Node::Dir(builder) => TreeEntry::tree(builder.write(store)?),
            };
            tree.entries.insert(name.clone(), entry);
        }
        store(&tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hash_payload, ObjectType};

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_raw([n; 20])
    }

    #[test]
    fn parse_serialize_roundtrip() {
        let mut tree = Tree::new();
        tree.entries
            .insert(BString::from("a.txt"), TreeEntry::new(FileMode::Regular, oid(1)));
        tree.entries
            .insert(BString::from("bin"), TreeEntry::new(FileMode::Executable, oid(2)));
        tree.entries
            .insert(BString::from("sub"), TreeEntry::tree(oid(3)));

        let bytes = tree.serialize_content();
        let parsed = Tree::parse(&bytes).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn directories_sort_with_trailing_slash() {
        // "foo" the directory sorts after "foo-bar" but before "foo0",
        // because it compares as "foo/".
        let mut tree = Tree::new();
        tree.entries
            .insert(BString::from("foo"), TreeEntry::tree(oid(1)));
        tree.entries
            .insert(BString::from("foo-bar"), TreeEntry::new(FileMode::Regular, oid(2)));
        tree.entries
            .insert(BString::from("foo0"), TreeEntry::new(FileMode::Regular, oid(3)));

        let bytes = tree.serialize_content();
        let foo_bar = bytes.find(b"foo-bar").unwrap();
        let foo = bytes.find(b"40000 foo\0").unwrap();
        let foo0 = bytes.find(b"foo0").unwrap();
        assert!(foo_bar < foo);
        assert!(foo < foo0);
    }

    #[test]
    fn known_tree_oid() {
        // Single entry "hello.txt" pointing at the blob for "hello",
        // cross-checked against C git.
        let mut tree = Tree::new();
        tree.entries.insert(
            BString::from("hello.txt"),
            TreeEntry::new(
                FileMode::Regular,
                ObjectId::from_hex("b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0").unwrap(),
            ),
        );
        let content = tree.serialize_content();
        assert_eq!(
            hash_payload(ObjectType::Tree, &content).to_hex(),
            "04df07b08ca746b3167d0f1d1514e2f39a52c16c"
        );
    }

    #[test]
    fn builder_nests_directories() {
        let mut builder = TreeBuilder::new();
        builder.insert(BStr::new("a.txt"), TreeEntry::new(FileMode::Regular, oid(1)));
        builder.insert(
            BStr::new("out/b.txt"),
            TreeEntry::new(FileMode::Regular, oid(2)),
        );
        builder.insert(
            BStr::new("out/in/c.txt"),
            TreeEntry::new(FileMode::Regular, oid(3)),
        );

        let mut stored: Vec<Tree> = Vec::new();
        let root_oid = builder
            .write::<std::convert::Infallible>(&mut |tree| {
                stored.push(tree.clone());
                Ok(hash_payload(ObjectType::Tree, &tree.serialize_content()))
            })
            .unwrap();

        // Bottom-up: out/in, out, then the root.
        assert_eq!(stored.len(), 3);
        assert!(stored[0].entries.contains_key(&BString::from("c.txt")));
        assert!(stored[1].entries.contains_key(&BString::from("in")));
        let root = stored.last().unwrap();
        assert!(root.entries.contains_key(&BString::from("a.txt")));
        assert_eq!(
            root.entries.get(&BString::from("out")).unwrap().oid,
            hash_payload(ObjectType::Tree, &stored[1].serialize_content())
        );
        assert_eq!(
            root_oid,
            hash_payload(ObjectType::Tree, &root.serialize_content())
        );
    }
}
