//! Loose object storage.
//!
//! An object with OID `xy…` lives at `objects/xy/…` as a zlib stream of
//! `<type> SP <size> NUL <payload>`. Writes go through a temp file in the
//! fan-out directory and finish with an atomic rename; existing files are
//! never rewritten.

mod read;
mod write;

use std::path::{Path, PathBuf};

use grit_hash::ObjectId;

#[derive(Debug, thiserror::Error)]
pub enum LooseError {
    #[error("corrupt loose object {oid}: {reason}")]
    Corrupt { oid: String, reason: String },

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Util(#[from] grit_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The loose backend rooted at a repository's `objects/` directory.
pub struct LooseStore {
    objects_dir: PathBuf,
    compression: u32,
}

impl LooseStore {
    /// Default zlib level for loose objects (speed over ratio, matching the
    /// write-heavy loose path).
    pub const DEFAULT_COMPRESSION: u32 = 1;

    pub fn new(objects_dir: impl AsRef<Path>) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
            compression: Self::DEFAULT_COMPRESSION,
        }
    }

    /// Override the zlib level (from `core.compression`).
    pub fn set_compression(&mut self, level: u32) {
        self.compression = level.min(9);
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub(crate) fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.objects_dir.join(oid.loose_path())
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.object_path(oid).is_file()
    }
}
