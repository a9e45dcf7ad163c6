//! Object identity for grit: SHA-1 object IDs, incremental hashing, hex
//! codec, and checksummed streams used by the index and pack formats.

pub mod checksum;
pub mod hasher;
pub mod hex;
pub mod oid;

pub use checksum::{ChecksumReader, ChecksumWriter};
pub use hasher::Hasher;
pub use oid::ObjectId;

/// Length of a raw SHA-1 digest in bytes.
pub const DIGEST_LEN: usize = 20;

/// Length of a hex-encoded SHA-1 in characters.
pub const HEX_LEN: usize = 40;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hex digit {byte:#04x} at position {position}")]
    InvalidHex { byte: u8, position: usize },

    #[error("invalid object id length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("checksum does not match data stored on disk")]
    ChecksumMismatch,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
