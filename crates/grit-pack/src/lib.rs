//! Packfile codec.
//!
//! A pack is `PACK` + u32 version(2) + u32 count, followed by that many
//! records and a 20-byte SHA-1 trailer over everything before it. Records
//! are either base objects (commit/tree/blob) or deltas against another
//! record, referenced by negative offset (OFS) or by OID (REF). The
//! companion `.idx` file maps OIDs to record offsets through a 256-entry
//! fan-out table.

pub mod compressor;
pub mod delta;
pub mod entry;
pub mod index;
pub mod indexer;
pub mod numbers;
pub mod pack;
pub mod reader;
pub mod stream;
pub mod window;
pub mod writer;
pub mod xdelta;

use grit_hash::ObjectId;
use grit_object::ObjectType;

/// Pack file signature.
pub const SIGNATURE: &[u8; 4] = b"PACK";

/// The only supported pack/idx layout version.
pub const VERSION: u32 = 2;

/// Pack header length: signature + version + count.
pub const HEADER_SIZE: usize = 12;

/// Index file signature (`\xfftOc`).
pub const IDX_SIGNATURE: u32 = 0xff74_4f63;

/// Offsets at or above this go to the idx large-offset layer.
pub const IDX_MAX_OFFSET: u64 = 0x8000_0000;

/// Largest span a single delta Copy op can cover.
pub const MAX_COPY_SIZE: u64 = 0xff_ffff;

/// Largest literal run a single delta Insert op can carry.
pub const MAX_INSERT_SIZE: usize = 0x7f;

pub const COMMIT: u8 = 1;
pub const TREE: u8 = 2;
pub const BLOB: u8 = 3;
pub const OFS_DELTA: u8 = 6;
pub const REF_DELTA: u8 = 7;

/// The 3-bit record type code for a base object.
pub fn type_code(ty: ObjectType) -> u8 {
    match ty {
        ObjectType::Commit => COMMIT,
        ObjectType::Tree => TREE,
        ObjectType::Blob => BLOB,
    }
}

pub fn type_from_code(code: u8) -> Option<ObjectType> {
    match code {
        COMMIT => Some(ObjectType::Commit),
        TREE => Some(ObjectType::Tree),
        BLOB => Some(ObjectType::Blob),
        _ => None,
    }
}

/// One record read from a pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A self-contained object.
    Base { ty: ObjectType, data: Vec<u8> },
    /// Delta whose base lives `base_ofs` bytes before this record.
    OfsDelta { base_ofs: u64, delta: Vec<u8> },
    /// Delta whose base is named by OID.
    RefDelta { base_oid: ObjectId, delta: Vec<u8> },
}

/// Header-only record info; delta variants carry the reconstructed target
/// size parsed from the delta stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordInfo {
    Base { ty: ObjectType, size: u64 },
    OfsDelta { base_ofs: u64, target_size: u64 },
    RefDelta { base_oid: ObjectId, target_size: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("bad pack signature")]
    BadSignature,

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("unknown pack record type: {0}")]
    UnknownRecordType(u8),

    #[error("unexpected end of pack data")]
    UnexpectedEof,

    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    #[error("zlib error: {0}")]
    Zlib(String),

    #[error("checksum does not match value read from pack")]
    ChecksumMismatch,

    #[error("pack is missing base object {0}")]
    MissingBase(ObjectId),

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("object not found while packing: {0}")]
    ObjectMissing(ObjectId),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Anything that can feed objects into pack construction. Implemented by
/// the object database; tests use in-memory maps.
pub trait ObjectSource {
    /// Object type and size without materializing the payload.
    fn info(&self, oid: &ObjectId) -> Result<(ObjectType, u64), PackError>;

    /// The full payload bytes.
    fn payload(&self, oid: &ObjectId) -> Result<Vec<u8>, PackError>;
}
