//! Block-based delta compression.
//!
//! The source is indexed in 16-byte blocks; the compressor slides through
//! the target looking the current block up in the index, extending matches
//! forward byte-wise and backward through pending literals, and emitting
//! Copy ops for matches and Insert ops for everything else.

use std::collections::HashMap;

use crate::delta::DeltaOp;
use crate::{MAX_COPY_SIZE, MAX_INSERT_SIZE};

const BLOCK_SIZE: usize = 16;

/// A reusable index over one source buffer.
pub struct XDeltaIndex {
    source: Vec<u8>,
    index: HashMap<[u8; BLOCK_SIZE], Vec<usize>>,
}

impl XDeltaIndex {
    pub fn new(source: Vec<u8>) -> Self {
        let mut index: HashMap<[u8; BLOCK_SIZE], Vec<usize>> = HashMap::new();
        let blocks = source.len() / BLOCK_SIZE;

        for i in 0..blocks {
            let offset = i * BLOCK_SIZE;
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(&source[offset..offset + BLOCK_SIZE]);
            index.entry(block).or_default().push(offset);
        }

        Self { source, index }
    }

    /// Produce the op sequence that rebuilds `target` from this source.
    pub fn compress(&self, target: &[u8]) -> Vec<DeltaOp> {
        Compression {
            index: self,
            target,
            offset: 0,
            insert: Vec::new(),
            ops: Vec::new(),
        }
        .run()
    }
}

struct Compression<'a> {
    index: &'a XDeltaIndex,
    target: &'a [u8],
    offset: usize,
    insert: Vec<u8>,
    ops: Vec<DeltaOp>,
}

impl Compression<'_> {
    fn run(mut self) -> Vec<DeltaOp> {
        while self.offset < self.target.len() {
            self.generate_ops();
        }
        self.flush_insert();
        self.ops
    }

    fn generate_ops(&mut self) {
        let (m_offset, m_size) = self.longest_match();
        if m_size == 0 {
            self.push_insert();
            return;
        }

        let (m_offset, m_size) = self.expand_match(m_offset, m_size);
        self.flush_insert();
        self.ops.push(DeltaOp::Copy {
            offset: m_offset as u64,
            size: m_size as u64,
        });
    }

    fn longest_match(&self) -> (usize, usize) {
        if self.offset + BLOCK_SIZE > self.target.len() {
            return (0, 0);
        }
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(&self.target[self.offset..self.offset + BLOCK_SIZE]);

        let Some(positions) = self.index.index.get(&block) else {
            return (0, 0);
        };

        let mut m_offset = 0;
        let mut m_size = 0;

        for &pos in positions {
            let remaining = self.remaining_bytes(pos);
            if remaining <= m_size {
                break;
            }

            let end = self.match_from(pos, remaining);
            if m_size >= end - pos {
                continue;
            }

            m_offset = pos;
            m_size = end - pos;
        }

        (m_offset, m_size)
    }

    fn remaining_bytes(&self, pos: usize) -> usize {
        let source_remaining = self.index.source.len() - pos;
        let target_remaining = self.target.len() - self.offset;
        source_remaining
            .min(target_remaining)
            .min(MAX_COPY_SIZE as usize)
    }

    fn match_from(&self, pos: usize, mut remaining: usize) -> usize {
        let source = &self.index.source;
        let mut s = pos;
        let mut t = self.offset;

        while remaining > 0 && source[s] == self.target[t] {
            s += 1;
            t += 1;
            remaining -= 1;
        }
        s
    }

    /// Grow a match backwards through literal bytes queued just before it.
    fn expand_match(&mut self, mut m_offset: usize, mut m_size: usize) -> (usize, usize) {
        while !self.insert.is_empty()
            && m_offset > 0
            && self.index.source[m_offset - 1] == *self.insert.last().unwrap()
        {
            if m_size as u64 == MAX_COPY_SIZE {
                break;
            }
            self.offset -= 1;
            m_offset -= 1;
            m_size += 1;
            self.insert.pop();
        }

        self.offset += m_size;
        (m_offset, m_size)
    }

    fn push_insert(&mut self) {
        self.insert.push(self.target[self.offset]);
        self.offset += 1;
        if self.insert.len() >= MAX_INSERT_SIZE {
            self.flush_insert();
        }
    }

    fn flush_insert(&mut self) {
        if self.insert.is_empty() {
            return;
        }
        self.ops
            .push(DeltaOp::Insert(std::mem::take(&mut self.insert)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::{serialize, Expander};

    fn roundtrip(source: &[u8], target: &[u8]) -> Vec<DeltaOp> {
        let index = XDeltaIndex::new(source.to_vec());
        let ops = index.compress(target);
        let delta = serialize(source.len() as u64, target.len() as u64, &ops);
        assert_eq!(Expander::expand(source, &delta).unwrap(), target);
        ops
    }

    #[test]
    fn identical_buffers_become_one_copy() {
        let data = vec![9u8; 512];
        let ops = roundtrip(&data, &data);
        assert_eq!(
            ops,
            vec![DeltaOp::Copy {
                offset: 0,
                size: 512
            }]
        );
    }

    #[test]
    fn appended_suffix_compresses_to_copy_plus_insert() {
        let source: Vec<u8> = (0u8..=255).cycle().take(512).collect();
        let mut target = source.clone();
        target.extend_from_slice(b"extra bytes");

        let ops = roundtrip(&source, &target);
        assert!(matches!(ops[0], DeltaOp::Copy { offset: 0, .. }));
        assert!(ops
            .iter()
            .any(|op| matches!(op, DeltaOp::Insert(data) if data.ends_with(b"bytes"))));
    }

    #[test]
    fn unrelated_target_is_all_inserts() {
        let source = vec![0u8; 256];
        let target: Vec<u8> = (1u8..=128).collect();
        let index = XDeltaIndex::new(source.clone());
        let ops = index.compress(&target);
        assert!(ops.iter().all(|op| matches!(op, DeltaOp::Insert(_))));
    }

    #[test]
    fn long_inserts_split_at_limit() {
        let source = vec![0u8; 16];
        let target: Vec<u8> = (0..300).map(|i| (i % 251) as u8 ^ 0x55).collect();
        let index = XDeltaIndex::new(source);
        let ops = index.compress(&target);
        for op in &ops {
            if let DeltaOp::Insert(data) = op {
                assert!(data.len() <= MAX_INSERT_SIZE);
            }
        }
    }

    #[test]
    fn interleaved_edits_roundtrip() {
        let source: Vec<u8> = (0..2048).map(|i| (i * 31 % 256) as u8).collect();
        let mut target = source.clone();
        target.splice(100..100, b"inserted run".iter().copied());
        target.drain(900..950);
        target.extend_from_slice(&source[..64]);
        roundtrip(&source, &target);
    }
}
