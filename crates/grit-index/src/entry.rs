//! On-disk index entries.

use bstr::{BStr, BString};
use grit_hash::ObjectId;
use grit_object::{FileMode, TreeEntry};

use crate::IndexError;

pub const REGULAR_MODE: u32 = 0o100644;
pub const EXECUTABLE_MODE: u32 = 0o100755;

/// Path lengths at or above this saturate the flags field.
pub const MAX_PATH_SIZE: u16 = 0xfff;

/// Fixed part of an entry: 10 u32 stat words + raw OID + flags.
pub const ENTRY_HEADER_SIZE: usize = 62;

/// Entries are NUL-padded to this boundary.
pub const ENTRY_BLOCK: usize = 8;

/// The smallest possible entry (header + path + padding).
pub const ENTRY_MIN_SIZE: usize = 64;

/// One `(path, stage)` slot in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub ctime: u32,
    pub ctime_nsec: u32,
    pub mtime: u32,
    pub mtime_nsec: u32,
    pub dev: u32,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub oid: ObjectId,
    pub flags: u16,
    pub path: BString,
}

impl IndexEntry {
    /// Build a stage-0 entry from a workspace file.
    pub fn create(path: &BStr, oid: ObjectId, meta: &std::fs::Metadata) -> Self {
        let mut entry = Self {
            ctime: 0,
            ctime_nsec: 0,
            mtime: 0,
            mtime_nsec: 0,
            dev: 0,
            ino: 0,
            mode: mode_for_metadata(meta),
            uid: 0,
            gid: 0,
            size: 0,
            oid,
            flags: flags_for(path, 0),
            path: BString::from(path),
        };
        entry.update_stat(meta);
        entry
    }

    /// Build an entry at `stage` from a tree entry, with no stat cache.
    pub fn create_from_db(path: &BStr, item: &TreeEntry, stage: u8) -> Self {
        Self {
            ctime: 0,
            ctime_nsec: 0,
            mtime: 0,
            mtime_nsec: 0,
            dev: 0,
            ino: 0,
            mode: item.mode.raw(),
            uid: 0,
            gid: 0,
            size: 0,
            oid: item.oid,
            flags: flags_for(path, stage),
            path: BString::from(path),
        }
    }

    pub fn stage(&self) -> u8 {
        ((self.flags >> 12) & 0x3) as u8
    }

    pub fn key(&self) -> (BString, u8) {
        (self.path.clone(), self.stage())
    }

    pub fn file_mode(&self) -> FileMode {
        if self.mode == EXECUTABLE_MODE {
            FileMode::Executable
        } else {
            FileMode::Regular
        }
    }

    pub fn as_tree_entry(&self) -> TreeEntry {
        TreeEntry::new(self.file_mode(), self.oid)
    }

    /// Refresh the cached stat fields from the filesystem.
    pub fn update_stat(&mut self, meta: &std::fs::Metadata) {
        let stat = stat_fields(meta);
        self.ctime = stat.0;
        self.ctime_nsec = stat.1;
        self.mtime = stat.2;
        self.mtime_nsec = stat.3;
        self.dev = stat.4;
        self.ino = stat.5;
        self.mode = mode_for_metadata(meta);
        self.uid = stat.6;
        self.gid = stat.7;
        self.size = stat.8;
    }

    /// Mode plus size agree with the file: the entry may still be current.
    pub fn stat_match(&self, meta: &std::fs::Metadata) -> bool {
        self.mode == mode_for_metadata(meta) && (self.size == 0 || self.size == size_of(meta))
    }

    /// Timestamps agree exactly: skip rehashing the content.
    pub fn times_match(&self, meta: &std::fs::Metadata) -> bool {
        let stat = stat_fields(meta);
        self.ctime == stat.0
            && self.ctime_nsec == stat.1
            && self.mtime == stat.2
            && self.mtime_nsec == stat.3
    }

    /// Parse one entry from its padded on-disk form.
    pub fn parse(data: &[u8]) -> Result<Self, IndexError> {
        if data.len() < ENTRY_HEADER_SIZE + 1 {
            return Err(IndexError::Corrupt("entry too short".into()));
        }

        let word = |i: usize| u32::from_be_bytes(data[i * 4..i * 4 + 4].try_into().unwrap());

        let oid = ObjectId::from_bytes(&data[40..60])
            .map_err(|_| IndexError::Corrupt("bad entry oid".into()))?;
        let flags = u16::from_be_bytes(data[60..62].try_into().unwrap());

        let path_end = data[ENTRY_HEADER_SIZE..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| p + ENTRY_HEADER_SIZE)
            .ok_or_else(|| IndexError::Corrupt("unterminated entry path".into()))?;
        let path = BString::from(&data[ENTRY_HEADER_SIZE..path_end]);

        Ok(Self {
            ctime: word(0),
            ctime_nsec: word(1),
            mtime: word(2),
            mtime_nsec: word(3),
            dev: word(4),
            ino: word(5),
            mode: word(6),
            uid: word(7),
            gid: word(8),
            size: word(9),
            oid,
            flags,
            path,
        })
    }

    /// Serialize with NUL-terminated path, padded to an 8-byte boundary.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENTRY_MIN_SIZE + self.path.len());
        for word in [
            self.ctime,
            self.ctime_nsec,
            self.mtime,
            self.mtime_nsec,
            self.dev,
            self.ino,
            self.mode,
            self.uid,
            self.gid,
            self.size,
        ] {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out.extend_from_slice(self.oid.as_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.path);
        out.push(0);
        while out.len() % ENTRY_BLOCK != 0 {
            out.push(0);
        }
        out
    }
}

fn flags_for(path: &BStr, stage: u8) -> u16 {
    let length = (path.len() as u16).min(MAX_PATH_SIZE);
    (u16::from(stage) << 12) | length
}

/// Regular or executable, from the file's permission bits.
#[cfg(unix)]
pub fn mode_for_metadata(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    if meta.mode() & 0o111 != 0 {
        EXECUTABLE_MODE
    } else {
        REGULAR_MODE
    }
}

#[cfg(not(unix))]
pub fn mode_for_metadata(_meta: &std::fs::Metadata) -> u32 {
    REGULAR_MODE
}

#[cfg(unix)]
fn stat_fields(meta: &std::fs::Metadata) -> (u32, u32, u32, u32, u32, u32, u32, u32, u32) {
    use std::os::unix::fs::MetadataExt;
    (
        meta.ctime() as u32,
        meta.ctime_nsec() as u32,
        meta.mtime() as u32,
        meta.mtime_nsec() as u32,
        meta.dev() as u32,
        meta.ino() as u32,
        meta.uid(),
        meta.gid(),
        meta.len() as u32,
    )
}

#[cfg(not(unix))]
fn stat_fields(meta: &std::fs::Metadata) -> (u32, u32, u32, u32, u32, u32, u32, u32, u32) {
    use std::time::UNIX_EPOCH;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .unwrap_or_default();
    let secs = mtime.as_secs() as u32;
    let nanos = mtime.subsec_nanos();
    (secs, nanos, secs, nanos, 0, 0, 0, 0, meta.len() as u32)
}

fn size_of(meta: &std::fs::Metadata) -> u32 {
    meta.len() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::ByteSlice;

    fn sample_entry(path: &str, stage: u8) -> IndexEntry {
        IndexEntry::create_from_db(
            path.as_bytes().as_bstr(),
            &TreeEntry::new(FileMode::Regular, ObjectId::from_raw([3; 20])),
            stage,
        )
    }

    #[test]
    fn parse_roundtrip() {
        let entry = sample_entry("out/in/c.txt", 0);
        let bytes = entry.to_bytes();
        assert_eq!(bytes.len() % ENTRY_BLOCK, 0);
        assert_eq!(IndexEntry::parse(&bytes).unwrap(), entry);
    }

    #[test]
    fn stage_lives_in_flag_bits() {
        for stage in 0..=3 {
            let entry = sample_entry("f.txt", stage);
            assert_eq!(entry.stage(), stage);
            assert_eq!(entry.flags & 0xfff, 5);
        }
    }

    #[test]
    fn long_paths_clamp_the_length_bits() {
        let long = "d/".repeat(3000) + "f";
        let entry = sample_entry(&long, 0);
        assert_eq!(entry.flags & 0xfff, MAX_PATH_SIZE);
        let parsed = IndexEntry::parse(&entry.to_bytes()).unwrap();
        assert_eq!(parsed.path, entry.path);
    }

    #[test]
    fn stat_fields_roundtrip_through_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x");
        std::fs::write(&file, b"contents").unwrap();
        let meta = std::fs::metadata(&file).unwrap();

        let entry = IndexEntry::create(
            b"x".as_bstr(),
            ObjectId::from_raw([1; 20]),
            &meta,
        );
        assert!(entry.stat_match(&meta));
        assert!(entry.times_match(&meta));
        assert_eq!(entry.size, 8);

        let parsed = IndexEntry::parse(&entry.to_bytes()).unwrap();
        assert!(parsed.stat_match(&meta));
        assert!(parsed.times_match(&meta));
    }
}
