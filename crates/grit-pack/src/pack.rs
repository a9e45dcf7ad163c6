//! Read access to an on-disk pack + idx pair.

use std::fs::File;
use std::path::{Path, PathBuf};

use grit_hash::ObjectId;
use grit_object::ObjectType;

use crate::index::PackIndex;
use crate::reader::{load_info_at, read_record_at};
use crate::delta::Expander;
use crate::{PackError, Record, RecordInfo};

/// One `pack-<hash>.pack` with its index, opened for random access.
pub struct PackFile {
    pub path: PathBuf,
    file: File,
    index: PackIndex,
}

impl PackFile {
    /// Open `<name>.pack`; the companion `.idx` must sit next to it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let index = PackIndex::open(path.with_extension("idx"))?;
        Ok(Self { path, file, index })
    }

    pub fn has(&self, oid: &ObjectId) -> bool {
        self.index.contains(oid)
    }

    pub fn prefix_match(&self, prefix: &str) -> Vec<ObjectId> {
        self.index.prefix_match(prefix)
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// Load the full payload, reconstructing delta chains.
    pub fn load_raw(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, PackError> {
        match self.index.oid_offset(oid) {
            Some(offset) => self.load_raw_at(offset).map(Some),
            None => Ok(None),
        }
    }

    fn load_raw_at(&self, offset: u64) -> Result<(ObjectType, Vec<u8>), PackError> {
        match read_record_at(&self.file, offset)? {
            Record::Base { ty, data } => Ok((ty, data)),
            Record::OfsDelta { base_ofs, delta } => {
                let (ty, base) = self.load_raw_at(offset - base_ofs)?;
                Ok((ty, Expander::expand(&base, &delta)?))
            }
            Record::RefDelta { base_oid, delta } => {
                let (ty, base) = self
                    .load_raw(&base_oid)?
                    .ok_or(PackError::MissingBase(base_oid))?;
                Ok((ty, Expander::expand(&base, &delta)?))
            }
        }
    }

    /// Load `(type, size)` cheaply: base records never decompress their
    /// payload, and delta records report the reconstructed target size from
    /// the delta header.
    pub fn load_info(&self, oid: &ObjectId) -> Result<Option<(ObjectType, u64)>, PackError> {
        match self.index.oid_offset(oid) {
            Some(offset) => self.load_info_at(offset).map(Some),
            None => Ok(None),
        }
    }

    fn load_info_at(&self, offset: u64) -> Result<(ObjectType, u64), PackError> {
        match load_info_at(&self.file, offset)? {
            RecordInfo::Base { ty, size } => Ok((ty, size)),
            RecordInfo::OfsDelta {
                base_ofs,
                target_size,
            } => {
                let (ty, _) = self.load_info_at(offset - base_ofs)?;
                Ok((ty, target_size))
            }
            RecordInfo::RefDelta {
                base_oid,
                target_size,
            } => {
                let (ty, _) = self
                    .load_info(&base_oid)?
                    .ok_or(PackError::MissingBase(base_oid))?;
                Ok((ty, target_size))
            }
        }
    }
}
