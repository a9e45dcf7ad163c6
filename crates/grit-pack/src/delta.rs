//! Delta instruction streams.
//!
//! A delta begins with two varint sizes (source, then target) followed by
//! ops. A Copy op has bit 0x80 set in its header byte and packs
//! `(size << 32) | offset` under the header's low-bit bitmap; an Insert op's
//! header byte is its literal length (1-127).

use crate::numbers::{packed56, varint_le, ByteSource, SliceSource};
use crate::{PackError, MAX_INSERT_SIZE};

/// One reconstruction instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOp {
    /// Copy `size` bytes from `offset` in the base.
    Copy { offset: u64, size: u64 },
    /// Append literal bytes.
    Insert(Vec<u8>),
}

impl DeltaOp {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Copy { offset, size } => {
                let mut bytes = packed56::write((size << 32) | offset);
                bytes[0] |= 0x80;
                bytes
            }
            Self::Insert(data) => {
                assert!(!data.is_empty() && data.len() <= MAX_INSERT_SIZE);
                let mut bytes = Vec::with_capacity(1 + data.len());
                bytes.push(data.len() as u8);
                bytes.extend_from_slice(data);
                bytes
            }
        }
    }

    fn parse(src: &mut SliceSource<'_>, header: u8) -> Result<Self, PackError> {
        if header >= 0x80 {
            let value = packed56::read(src, header & 0x7f)?;
            let offset = value & 0xffff_ffff;
            let mut size = value >> 32;
            if size == 0 {
                size = 0x10000;
            }
            Ok(Self::Copy { offset, size })
        } else if header > 0 {
            Ok(Self::Insert(src.take(header as usize)?.to_vec()))
        } else {
            Err(PackError::InvalidDelta("unexpected opcode 0".into()))
        }
    }
}

/// Serialize a complete delta: size headers plus ops.
pub fn serialize(source_size: u64, target_size: u64, ops: &[DeltaOp]) -> Vec<u8> {
    let mut out = varint_le::write(source_size, 7);
    out.extend_from_slice(&varint_le::write(target_size, 7));
    for op in ops {
        out.extend_from_slice(&op.encode());
    }
    out
}

/// Applies a delta stream to a base payload.
pub struct Expander<'a> {
    src: SliceSource<'a>,
    pub source_size: u64,
    pub target_size: u64,
}

impl<'a> Expander<'a> {
    pub fn new(delta: &'a [u8]) -> Result<Self, PackError> {
        let mut src = SliceSource::new(delta);
        let (_, source_size) = varint_le::read(&mut src, 7)?;
        let (_, target_size) = varint_le::read(&mut src, 7)?;
        Ok(Self {
            src,
            source_size,
            target_size,
        })
    }

    /// Reconstruct the target from `source` and `delta`, verifying both the
    /// declared source and target lengths.
    pub fn expand(source: &[u8], delta: &'a [u8]) -> Result<Vec<u8>, PackError> {
        Self::new(delta)?.apply(source)
    }

    pub fn apply(mut self, source: &[u8]) -> Result<Vec<u8>, PackError> {
        if source.len() as u64 != self.source_size {
            return Err(PackError::InvalidDelta(format!(
                "source size mismatch: declared {}, got {}",
                self.source_size,
                source.len()
            )));
        }

        let mut target = Vec::with_capacity(self.target_size as usize);
        while !self.src.is_empty() {
            let header = self.src.read_byte()?;
            match DeltaOp::parse(&mut self.src, header)? {
                DeltaOp::Copy { offset, size } => {
                    let start = offset as usize;
                    let end = start + size as usize;
                    if end > source.len() {
                        return Err(PackError::InvalidDelta(format!(
                            "copy out of range: {start}..{end} of {}",
                            source.len()
                        )));
                    }
                    target.extend_from_slice(&source[start..end]);
                }
                DeltaOp::Insert(data) => target.extend_from_slice(&data),
            }
        }

        if target.len() as u64 != self.target_size {
            return Err(PackError::InvalidDelta(format!(
                "target size mismatch: declared {}, got {}",
                self.target_size,
                target.len()
            )));
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_op_encoding_matches_canonical_layout() {
        let op = DeltaOp::Copy {
            offset: 5,
            size: 10,
        };
        let bytes = op.encode();
        // Header: 0x80 | bit0 (offset byte 0) | bit4 (size byte 0)
        assert_eq!(bytes, vec![0x80 | 0x01 | 0x10, 5, 10]);
    }

    #[test]
    fn insert_op_roundtrip() {
        let op = DeltaOp::Insert(vec![0xaa, 0xbb, 0xcc]);
        let delta = serialize(0, 3, std::slice::from_ref(&op));
        let out = Expander::expand(b"", &delta).unwrap();
        assert_eq!(out, vec![0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn copy_then_insert_reconstructs() {
        let source = b"0123456789";
        let ops = [
            DeltaOp::Copy { offset: 2, size: 4 },
            DeltaOp::Insert(b"XY".to_vec()),
            DeltaOp::Copy { offset: 0, size: 2 },
        ];
        let delta = serialize(source.len() as u64, 8, &ops);
        let out = Expander::expand(source, &delta).unwrap();
        assert_eq!(out, b"2345XY01");
    }

    #[test]
    fn zero_size_copy_means_64k() {
        let source = vec![7u8; 0x10000];
        let mut delta = varint_le::write(source.len() as u64, 7);
        delta.extend_from_slice(&varint_le::write(0x10000, 7));
        delta.push(0x80); // copy, no offset bytes, no size bytes
        let out = Expander::expand(&source, &delta).unwrap();
        assert_eq!(out.len(), 0x10000);
    }

    #[test]
    fn declared_size_mismatch_is_rejected() {
        let ops = [DeltaOp::Insert(b"abc".to_vec())];
        let delta = serialize(0, 99, &ops);
        assert!(matches!(
            Expander::expand(b"", &delta),
            Err(PackError::InvalidDelta(_))
        ));

        let delta = serialize(5, 3, &ops);
        assert!(matches!(
            Expander::expand(b"", &delta),
            Err(PackError::InvalidDelta(_))
        ));
    }

    #[test]
    fn opcode_zero_is_rejected() {
        let mut delta = serialize(0, 0, &[]);
        delta.push(0);
        assert!(matches!(
            Expander::expand(b"", &delta),
            Err(PackError::InvalidDelta(_))
        ));
    }

    #[test]
    fn copy_beyond_source_is_rejected() {
        let ops = [DeltaOp::Copy { offset: 8, size: 8 }];
        let delta = serialize(10, 8, &ops);
        assert!(Expander::expand(b"0123456789", &delta).is_err());
    }
}
