//! Three-way line merge.
//!
//! Both sides are diffed against the base; runs where the sides agree with
//! the base (or with each other) emit clean chunks, and overlapping edits
//! become conflict chunks carrying all three versions.

use std::collections::HashMap;

use bstr::{BStr, BString};

use crate::myers::EditType;
use crate::{diff, split_lines};

/// A merged region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeChunk {
    Clean(Vec<BString>),
    Conflict {
        base: Vec<BString>,
        ours: Vec<BString>,
        theirs: Vec<BString>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub chunks: Vec<MergeChunk>,
}

impl MergeResult {
    pub fn is_clean(&self) -> bool {
        self.chunks
            .iter()
            .all(|chunk| matches!(chunk, MergeChunk::Clean(_)))
    }

    /// Render with `<<<<<<<`/`=======`/`>>>>>>>` markers around conflicts.
    pub fn to_bytes(&self, ours_name: &str, theirs_name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in &self.chunks {
            match chunk {
                MergeChunk::Clean(lines) => {
                    for line in lines {
                        out.extend_from_slice(line);
                    }
                }
                MergeChunk::Conflict { ours, theirs, .. } => {
                    separator(&mut out, b'<', Some(ours_name));
                    for line in ours {
                        out.extend_from_slice(line);
                    }
                    separator(&mut out, b'=', None);
                    for line in theirs {
                        out.extend_from_slice(line);
                    }
                    separator(&mut out, b'>', Some(theirs_name));
                }
            }
        }
        out
    }
}

fn separator(out: &mut Vec<u8>, marker: u8, name: Option<&str>) {
    out.extend_from_slice(&[marker; 7]);
    if let Some(name) = name {
        out.push(b' ');
        out.extend_from_slice(name.as_bytes());
    }
    out.push(b'\n');
}

pub struct Diff3 {
    o: Vec<BString>,
    a: Vec<BString>,
    b: Vec<BString>,
    chunks: Vec<MergeChunk>,
    line_o: usize,
    line_a: usize,
    line_b: usize,
    /// base line number → side line number, for matching (equal) lines.
    match_a: HashMap<usize, usize>,
    match_b: HashMap<usize, usize>,
}

impl Diff3 {
    pub fn merge(base: &BStr, ours: &BStr, theirs: &BStr) -> MergeResult {
        let mut state = Self {
            o: split_lines(base),
            a: split_lines(ours),
            b: split_lines(theirs),
            chunks: Vec::new(),
            line_o: 0,
            line_a: 0,
            line_b: 0,
            match_a: HashMap::new(),
            match_b: HashMap::new(),
        };
        state.match_a = match_set(&state.o, &state.a);
        state.match_b = match_set(&state.o, &state.b);
        state.generate_chunks();
        MergeResult {
            chunks: state.chunks,
        }
    }

    fn generate_chunks(&mut self) {
        loop {
            match self.find_next_mismatch() {
                Some(1) => {
                    let (o, a, b) = self.find_next_match();
                    if let (Some(a), Some(b)) = (a, b) {
                        self.emit_chunk(o, a, b);
                    } else {
                        self.emit_final_chunk();
                        return;
                    }
                }
                Some(i) => self.emit_chunk(self.line_o + i, self.line_a + i, self.line_b + i),
                None => {
                    self.emit_final_chunk();
                    return;
                }
            }
        }
    }

    /// Offset of the first line (1-based from the cursors) where the sides
    /// stop matching the base in lockstep; `None` when every remaining line
    /// matches.
    fn find_next_mismatch(&self) -> Option<usize> {
        let mut i = 1;
        while self.in_bounds(i)
            && self.is_match(&self.match_a, self.line_a, i)
            && self.is_match(&self.match_b, self.line_b, i)
        {
            i += 1;
        }
        self.in_bounds(i).then_some(i)
    }

    fn in_bounds(&self, i: usize) -> bool {
        self.line_o + i <= self.o.len()
            || self.line_a + i <= self.a.len()
            || self.line_b + i <= self.b.len()
    }

    fn is_match(&self, matches: &HashMap<usize, usize>, offset: usize, i: usize) -> bool {
        matches.get(&(self.line_o + i)) == Some(&(offset + i))
    }

    /// The next base line matched by both sides, with their line numbers.
    fn find_next_match(&self) -> (usize, Option<usize>, Option<usize>) {
        let mut o = self.line_o + 1;
        while o <= self.o.len()
            && !(self.match_a.contains_key(&o) && self.match_b.contains_key(&o))
        {
            o += 1;
        }
        (o, self.match_a.get(&o).copied(), self.match_b.get(&o).copied())
    }

    fn emit_chunk(&mut self, o: usize, a: usize, b: usize) {
        self.write_chunk(
            self.o[self.line_o..o - 1].to_vec(),
            self.a[self.line_a..a - 1].to_vec(),
            self.b[self.line_b..b - 1].to_vec(),
        );
        self.line_o = o - 1;
        self.line_a = a - 1;
        self.line_b = b - 1;
    }

    fn emit_final_chunk(&mut self) {
        self.write_chunk(
            self.o[self.line_o..].to_vec(),
            self.a[self.line_a..].to_vec(),
            self.b[self.line_b..].to_vec(),
        );
    }

    fn write_chunk(&mut self, o: Vec<BString>, a: Vec<BString>, b: Vec<BString>) {
        if o.is_empty() && a.is_empty() && b.is_empty() {
            return;
        }
        if a == o || a == b {
            self.chunks.push(MergeChunk::Clean(b));
        } else if b == o {
            self.chunks.push(MergeChunk::Clean(a));
        } else {
            self.chunks.push(MergeChunk::Conflict {
                base: o,
                ours: a,
                theirs: b,
            });
        }
    }
}

/// Base line number → side line number for every equal edit.
fn match_set(o: &[BString], side: &[BString]) -> HashMap<usize, usize> {
    let mut matches = HashMap::new();
    for edit in diff(o, side) {
        if edit.ty == EditType::Eql {
            matches.insert(
                edit.a_line.as_ref().unwrap().number,
                edit.b_line.as_ref().unwrap().number,
            );
        }
    }
    matches
}
