//! Pack index (`.idx`) lookup.
//!
//! Version-2 layout: magic + version, a 256-entry cumulative fan-out table,
//! the sorted OID table, per-record CRC32s, 4-byte offsets (with an overflow
//! layer of 8-byte big-endian offsets for values ≥ 2^31), then the pack
//! checksum and the index's own checksum.

use std::fs::File;
use std::path::Path;

use grit_hash::{ObjectId, DIGEST_LEN};
use memmap2::Mmap;

use crate::{PackError, IDX_MAX_OFFSET, IDX_SIGNATURE, VERSION};

const HEADER_SIZE: usize = 8;
const FANOUT_SIZE: usize = 256 * 4;
const CRC_SIZE: usize = 4;
const OFS_SIZE: usize = 4;
const LARGE_OFS_SIZE: usize = 8;

pub struct PackIndex {
    map: Mmap,
    count: usize,
}

impl PackIndex {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PackError> {
        let file = File::open(path.as_ref())?;
        let map = unsafe { Mmap::map(&file) }?;

        if map.len() < HEADER_SIZE + FANOUT_SIZE + 2 * DIGEST_LEN {
            return Err(PackError::InvalidIndex("file too short".into()));
        }
        let magic = u32::from_be_bytes(map[0..4].try_into().unwrap());
        if magic != IDX_SIGNATURE {
            return Err(PackError::InvalidIndex(format!("bad magic {magic:#x}")));
        }
        let version = u32::from_be_bytes(map[4..8].try_into().unwrap());
        if version != VERSION {
            return Err(PackError::InvalidIndex(format!("bad version {version}")));
        }

        let count = u32::from_be_bytes(
            map[HEADER_SIZE + FANOUT_SIZE - 4..HEADER_SIZE + FANOUT_SIZE]
                .try_into()
                .unwrap(),
        ) as usize;

        let minimum =
            HEADER_SIZE + FANOUT_SIZE + count * (DIGEST_LEN + CRC_SIZE + OFS_SIZE) + 2 * DIGEST_LEN;
        if map.len() < minimum {
            return Err(PackError::InvalidIndex("truncated layers".into()));
        }

        Ok(Self { map, count })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn fanout(&self, byte: u8) -> usize {
        let at = HEADER_SIZE + usize::from(byte) * 4;
        u32::from_be_bytes(self.map[at..at + 4].try_into().unwrap()) as usize
    }

    fn oid_layer(&self) -> usize {
        HEADER_SIZE + FANOUT_SIZE
    }

    fn crc_layer(&self) -> usize {
        self.oid_layer() + self.count * DIGEST_LEN
    }

    fn ofs_layer(&self) -> usize {
        self.crc_layer() + self.count * CRC_SIZE
    }

    fn large_ofs_layer(&self) -> usize {
        self.ofs_layer() + self.count * OFS_SIZE
    }

    pub fn oid_at(&self, pos: usize) -> ObjectId {
        let at = self.oid_layer() + pos * DIGEST_LEN;
        ObjectId::from_bytes(&self.map[at..at + DIGEST_LEN]).expect("index oid layer")
    }

    pub fn crc_at(&self, pos: usize) -> u32 {
        let at = self.crc_layer() + pos * CRC_SIZE;
        u32::from_be_bytes(self.map[at..at + 4].try_into().unwrap())
    }

    /// Binary search for `oid`. `Ok(pos)` when present, `Err(insertion)`
    /// otherwise.
    fn position(&self, oid: &ObjectId) -> Result<usize, usize> {
        let first = oid.first_byte();
        let mut low = if first == 0 {
            0
        } else {
            self.fanout(first - 1)
        };
        let mut high = self.fanout(first);

        while low < high {
            let mid = (low + high) / 2;
            match self.oid_at(mid).cmp(oid) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Equal => return Ok(mid),
                std::cmp::Ordering::Greater => high = mid,
            }
        }
        Err(low)
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.position(oid).is_ok()
    }

    /// The pack offset of `oid`, following the large-offset overflow layer.
    pub fn oid_offset(&self, oid: &ObjectId) -> Option<u64> {
        let pos = self.position(oid).ok()?;
        let at = self.ofs_layer() + pos * OFS_SIZE;
        let raw = u64::from(u32::from_be_bytes(self.map[at..at + 4].try_into().unwrap()));

        if raw < IDX_MAX_OFFSET {
            return Some(raw);
        }

        let large_pos = (raw & (IDX_MAX_OFFSET - 1)) as usize;
        let at = self.large_ofs_layer() + large_pos * LARGE_OFS_SIZE;
        Some(u64::from_be_bytes(self.map[at..at + 8].try_into().unwrap()))
    }

    /// All stored OIDs whose hex form starts with `prefix`.
    pub fn prefix_match(&self, prefix: &str) -> Vec<ObjectId> {
        let prefix = prefix.to_ascii_lowercase();
        if !grit_hash::hex::is_hex(&prefix) || prefix.len() > grit_hash::HEX_LEN {
            return Vec::new();
        }

        // Pad the prefix with zeros to get the first candidate position.
        let mut padded = prefix.clone();
        padded.push_str(&"0".repeat(grit_hash::HEX_LEN - prefix.len()));
        let floor = ObjectId::from_hex(&padded).expect("padded hex prefix");

        let mut pos = match self.position(&floor) {
            Ok(pos) | Err(pos) => pos,
        };

        let mut out = Vec::new();
        while pos < self.count {
            let oid = self.oid_at(pos);
            if !oid.to_hex().starts_with(&prefix) {
                break;
            }
            out.push(oid);
            pos += 1;
        }
        out
    }

    /// Iterate every `(oid, offset)` pair in OID order.
    pub fn entries(&self) -> impl Iterator<Item = (ObjectId, u64)> + '_ {
        (0..self.count).map(|pos| {
            let oid = self.oid_at(pos);
            let offset = self.oid_offset(&oid).expect("offset for stored oid");
            (oid, offset)
        })
    }
}
