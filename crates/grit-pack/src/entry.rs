//! Pack-list entries on the writer side.

use bstr::{BStr, BString};
use grit_hash::ObjectId;
use grit_object::ObjectType;

use crate::{type_code, OFS_DELTA, REF_DELTA};

/// A compressed delta chosen for an entry, pointing at its base by index
/// into the writer's pack list.
#[derive(Debug, Clone)]
pub struct PackDelta {
    pub base: usize,
    pub data: Vec<u8>,
}

/// One object scheduled for the pack being written.
#[derive(Debug, Clone)]
pub struct Entry {
    pub oid: ObjectId,
    pub ty: ObjectType,
    pub size: u64,
    /// Path the object was reached by, used only for delta-sort locality.
    pub path: Option<BString>,
    pub delta: Option<PackDelta>,
    pub depth: u32,
    /// Byte offset in the output pack; zero until written.
    pub offset: u64,
    /// Whether OFS-delta encoding was negotiated.
    pub ofs: bool,
}

impl Entry {
    pub fn new(oid: ObjectId, ty: ObjectType, size: u64, path: Option<BString>, ofs: bool) -> Self {
        Self {
            oid,
            ty,
            size,
            path,
            delta: None,
            depth: 0,
            offset: 0,
            ofs,
        }
    }

    /// Sort key for delta-window locality: like objects first, then same
    /// basename, then directory, then size. The compressor sorts the whole
    /// tuple descending.
    pub fn sort_key(&self) -> (u8, Option<BString>, Option<BString>, u64) {
        let basename = self
            .path
            .as_ref()
            .map(|p| BString::from(grit_utils::path::basename(BStr::new(p))));
        let dirname = self
            .path
            .as_ref()
            .map(|p| BString::from(grit_utils::path::dirname(BStr::new(p))));
        (type_code(self.ty), basename, dirname, self.size)
    }

    pub fn assign_delta(&mut self, base: usize, base_depth: u32, data: Vec<u8>) {
        self.depth = base_depth + 1;
        self.delta = Some(PackDelta { base, data });
    }

    /// The 3-bit record type this entry will be written as.
    pub fn packed_type(&self) -> u8 {
        match &self.delta {
            Some(_) if self.ofs => OFS_DELTA,
            Some(_) => REF_DELTA,
            None => type_code(self.ty),
        }
    }

    /// The byte length of the payload that will be compressed.
    pub fn packed_size(&self) -> u64 {
        match &self.delta {
            Some(delta) => delta.data.len() as u64,
            None => self.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ty: ObjectType, size: u64, path: Option<&str>) -> Entry {
        Entry::new(
            ObjectId::from_raw([1; 20]),
            ty,
            size,
            path.map(BString::from),
            false,
        )
    }

    #[test]
    fn sort_groups_by_type_then_basename() {
        let mut entries = vec![
            entry(ObjectType::Blob, 10, Some("src/lib.rs")),
            entry(ObjectType::Commit, 5, None),
            entry(ObjectType::Blob, 20, Some("doc/lib.rs")),
            entry(ObjectType::Tree, 8, Some("src")),
        ];
        entries.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));

        // Descending: blobs (3) before trees (2) before commits (1), and the
        // two lib.rs blobs adjacent.
        assert_eq!(entries[0].ty, ObjectType::Blob);
        assert_eq!(entries[1].ty, ObjectType::Blob);
        assert_eq!(entries[2].ty, ObjectType::Tree);
        assert_eq!(entries[3].ty, ObjectType::Commit);
    }

    #[test]
    fn packed_type_reflects_delta_state() {
        let mut e = entry(ObjectType::Blob, 100, None);
        assert_eq!(e.packed_type(), crate::BLOB);

        e.assign_delta(0, 0, vec![1, 2, 3]);
        assert_eq!(e.packed_type(), crate::REF_DELTA);
        assert_eq!(e.packed_size(), 3);
        assert_eq!(e.depth, 1);

        e.ofs = true;
        assert_eq!(e.packed_type(), crate::OFS_DELTA);
    }
}
