//! Buffered pack input stream.
//!
//! Wraps the transport (socket pipe or file) with three abilities the pack
//! reader needs: a running SHA-1 of everything consumed (for the trailer
//! check), an un-read buffer for bytes zlib over-consumed, and capture of
//! the exact byte range of a record (for CRC32 and re-writing to disk).
//!
//! While a capture is active, consumed bytes are hashed only when the
//! capture ends, so un-reading inside a record never corrupts the digest.

use std::io::Read;

use grit_hash::Hasher;

use crate::numbers::ByteSource;
use crate::PackError;

pub struct Stream<R> {
    input: R,
    hasher: Hasher,
    offset: u64,
    buffer: Vec<u8>,
    capture: Option<Vec<u8>>,
}

impl<R: Read> Stream<R> {
    pub fn new(input: R) -> Self {
        Self::with_prefix(input, &[])
    }

    /// Seed the buffer with bytes a higher protocol layer already consumed
    /// (the `PACK` signature arrives through the pkt-line reader).
    pub fn with_prefix(input: R, prefix: &[u8]) -> Self {
        Self {
            input,
            hasher: Hasher::new(),
            offset: 0,
            buffer: prefix.to_vec(),
            capture: None,
        }
    }

    /// Bytes consumed so far (net of un-reads).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read exactly `n` bytes.
    pub fn read_exact(&mut self, n: usize) -> Result<Vec<u8>, PackError> {
        let data = self.fill(n, true)?;
        if data.len() != n {
            return Err(PackError::UnexpectedEof);
        }
        self.consume(&data);
        Ok(data)
    }

    /// Read up to `n` bytes; fewer (or none) at end of input.
    pub fn read_nonblock(&mut self, n: usize) -> Result<Vec<u8>, PackError> {
        let data = self.fill(n, false)?;
        self.consume(&data);
        Ok(data)
    }

    /// Push bytes back so the next read sees them first.
    pub fn unread(&mut self, data: &[u8]) {
        if let Some(capture) = self.capture.as_mut() {
            capture.truncate(capture.len() - data.len());
        }
        let mut buffer = data.to_vec();
        buffer.extend_from_slice(&self.buffer);
        self.buffer = buffer;
        self.offset -= data.len() as u64;
    }

    /// Start recording consumed bytes.
    pub fn begin_capture(&mut self) {
        self.capture = Some(Vec::new());
    }

    /// Stop recording; the captured bytes are folded into the digest now.
    pub fn end_capture(&mut self) -> Vec<u8> {
        let captured = self.capture.take().unwrap_or_default();
        self.hasher.update(&captured);
        captured
    }

    /// Read the 20-byte trailer and compare with the running digest.
    pub fn verify_checksum(&mut self) -> Result<(), PackError> {
        let trailer = self.fill(20, true)?;
        if trailer.len() != 20 {
            return Err(PackError::UnexpectedEof);
        }
        // Trailer bytes are not part of the digest.
        self.offset += 20;
        let digest = self.hasher.clone().finalize();
        if trailer != digest.as_bytes() {
            return Err(PackError::ChecksumMismatch);
        }
        Ok(())
    }

    fn consume(&mut self, data: &[u8]) {
        self.offset += data.len() as u64;
        match self.capture.as_mut() {
            Some(capture) => capture.extend_from_slice(data),
            None => self.hasher.update(data),
        }
    }

    /// Pull `n` bytes from the buffer, then the underlying input. When
    /// `block` is false a short read is returned as-is.
    fn fill(&mut self, n: usize, block: bool) -> Result<Vec<u8>, PackError> {
        let take = n.min(self.buffer.len());
        let mut out: Vec<u8> = self.buffer.drain(..take).collect();

        while out.len() < n {
            let mut chunk = vec![0u8; n - out.len()];
            let read = self.input.read(&mut chunk)?;
            if read == 0 {
                if block && !out.is_empty() && out.len() < n {
                    return Err(PackError::UnexpectedEof);
                }
                break;
            }
            out.extend_from_slice(&chunk[..read]);
            if !block {
                break;
            }
        }
        Ok(out)
    }
}

impl<R: Read> ByteSource for Stream<R> {
    fn read_byte(&mut self) -> Result<u8, PackError> {
        let data = self.read_exact(1)?;
        Ok(data[0])
    }
}
