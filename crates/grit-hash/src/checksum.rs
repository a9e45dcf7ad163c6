//! Checksummed streams.
//!
//! The index and pack-index files end with a 20-byte trailer equal to the
//! SHA-1 of every preceding byte. These wrappers fold all traffic through a
//! running digest so writers can append the trailer and readers can verify
//! it at EOF.

use std::io::{Read, Write};

use crate::{Hasher, HashError, ObjectId, DIGEST_LEN};

/// A reader that hashes everything it yields.
pub struct ChecksumReader<R> {
    inner: R,
    hasher: Hasher,
}

impl<R: Read> ChecksumReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    /// Read exactly `n` bytes, folding them into the digest.
    pub fn read_exact_hashed(&mut self, n: usize) -> Result<Vec<u8>, HashError> {
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        self.hasher.update(&buf);
        Ok(buf)
    }

    /// Consume the 20-byte trailer and compare it with the running digest.
    pub fn verify_trailer(mut self) -> Result<ObjectId, HashError> {
        let mut trailer = [0u8; DIGEST_LEN];
        self.inner.read_exact(&mut trailer)?;
        let actual = self.hasher.finalize();
        if trailer != *actual.as_bytes() {
            return Err(HashError::ChecksumMismatch);
        }
        Ok(actual)
    }
}

/// A writer that hashes everything it emits.
pub struct ChecksumWriter<W> {
    inner: W,
    hasher: Hasher,
}

impl<W: Write> ChecksumWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
        }
    }

    pub fn write_hashed(&mut self, data: &[u8]) -> Result<(), HashError> {
        self.inner.write_all(data)?;
        self.hasher.update(data);
        Ok(())
    }

    /// Append the digest of everything written so far and return it.
    pub fn write_trailer(mut self) -> Result<ObjectId, HashError> {
        let digest = self.hasher.finalize();
        self.inner.write_all(digest.as_bytes())?;
        self.inner.flush()?;
        Ok(digest)
    }

    /// Append the trailer and hand the inner writer back (for callers that
    /// still need to commit a lock file).
    pub fn finish(mut self) -> Result<W, HashError> {
        let digest = self.hasher.finalize();
        self.inner.write_all(digest.as_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_then_verify() {
        let mut buf = Vec::new();
        let mut writer = ChecksumWriter::new(&mut buf);
        writer.write_hashed(b"DIRC").unwrap();
        writer.write_hashed(b"payload").unwrap();
        let written = writer.write_trailer().unwrap();

        let mut reader = ChecksumReader::new(Cursor::new(buf));
        assert_eq!(reader.read_exact_hashed(4).unwrap(), b"DIRC");
        assert_eq!(reader.read_exact_hashed(7).unwrap(), b"payload");
        let verified = reader.verify_trailer().unwrap();
        assert_eq!(verified, written);
    }

    #[test]
    fn corrupted_byte_fails_verification() {
        let mut buf = Vec::new();
        let mut writer = ChecksumWriter::new(&mut buf);
        writer.write_hashed(b"payload").unwrap();
        writer.write_trailer().unwrap();

        buf[3] ^= 0x01;

        let mut reader = ChecksumReader::new(Cursor::new(buf));
        reader.read_exact_hashed(7).unwrap();
        assert!(matches!(
            reader.verify_trailer(),
            Err(HashError::ChecksumMismatch)
        ));
    }

    #[test]
    fn truncated_trailer_is_io_error() {
        let mut reader = ChecksumReader::new(Cursor::new(b"short".to_vec()));
        reader.read_exact_hashed(5).unwrap();
        assert!(matches!(reader.verify_trailer(), Err(HashError::Io(_))));
    }
}
