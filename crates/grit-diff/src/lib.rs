//! Differencing: Myers edit scripts over lines, diff3 three-way merge, and
//! recursive tree diffs with path pruning.

pub mod diff3;
pub mod hunk;
pub mod myers;
pub mod tree;

use bstr::{BStr, BString, ByteSlice};

pub use diff3::{Diff3, MergeChunk, MergeResult};
pub use hunk::Hunk;
pub use myers::{Edit, EditType, Myers};
pub use tree::{PathFilter, TreeDiff, TreeDiffChanges};

/// A numbered line; numbers are 1-based to match edit-script conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub text: BString,
}

/// Split a document into lines keeping terminators, so content round-trips
/// through merges byte-for-byte.
pub fn split_lines(data: &[u8]) -> Vec<BString> {
    data.split_inclusive(|&b| b == b'\n')
        .map(BString::from)
        .collect()
}

/// Number a document's lines.
pub fn lines(data: &[BString]) -> Vec<Line> {
    data.iter()
        .enumerate()
        .map(|(i, text)| Line {
            number: i + 1,
            text: text.clone(),
        })
        .collect()
}

/// Edit script between two documents, already split into lines.
pub fn diff(a: &[BString], b: &[BString]) -> Vec<Edit> {
    Myers::diff(&lines(a), &lines(b))
}

/// Convenience wrapper over raw byte documents.
pub fn diff_bytes(a: &BStr, b: &BStr) -> Vec<Edit> {
    diff(&split_lines(a.as_bytes()), &split_lines(b.as_bytes()))
}
