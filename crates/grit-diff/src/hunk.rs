//! Grouping edit scripts into hunks with surrounding context.

use crate::myers::{Edit, EditType};

/// Lines of unchanged context kept on each side of a change run.
pub const HUNK_CONTEXT: usize = 3;

/// A contiguous display unit of a diff: a run of edits with up to
/// [`HUNK_CONTEXT`] equal lines on both ends. Runs whose contexts touch
/// are merged into one hunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub a_start: usize,
    pub b_start: usize,
    pub edits: Vec<Edit>,
}

impl Hunk {
    /// Assemble hunks from a full edit script.
    pub fn filter(edits: &[Edit]) -> Vec<Hunk> {
        let mut hunks = Vec::new();
        let mut offset = 0isize;

        loop {
            while (offset as usize) < edits.len()
                && edits[offset as usize].ty == EditType::Eql
            {
                offset += 1;
            }
            if offset as usize >= edits.len() {
                return hunks;
            }

            offset -= HUNK_CONTEXT as isize + 1;

            let (a_start, b_start) = if offset < 0 {
                (0, 0)
            } else {
                let edit = &edits[offset as usize];
                (
                    edit.a_line.as_ref().map(|l| l.number).unwrap_or(0),
                    edit.b_line.as_ref().map(|l| l.number).unwrap_or(0),
                )
            };

            let mut hunk = Hunk {
                a_start,
                b_start,
                edits: Vec::new(),
            };
            offset = Self::build(&mut hunk, edits, offset);
            hunks.push(hunk);
        }
    }

    /// Collect edits into `hunk` until the trailing context runs dry,
    /// extending whenever another change appears within reach.
    fn build(hunk: &mut Hunk, edits: &[Edit], mut offset: isize) -> isize {
        let mut counter: isize = -1;

        while counter != 0 {
            if offset >= 0 && counter > 0 {
                hunk.edits.push(edits[offset as usize].clone());
            }

            offset += 1;
            if offset as usize >= edits.len() {
                break;
            }

            let lookahead = edits.get(offset as usize + HUNK_CONTEXT);
            match lookahead {
                Some(edit) if edit.ty != EditType::Eql => {
                    counter = 2 * HUNK_CONTEXT as isize + 1;
                }
                _ => counter -= 1,
            }
        }

        offset
    }

    /// The `@@ -a,n +b,m @@` header values.
    pub fn header(&self) -> String {
        let a_lines: Vec<usize> = self
            .edits
            .iter()
            .filter_map(|e| e.a_line.as_ref().map(|l| l.number))
            .collect();
        let b_lines: Vec<usize> = self
            .edits
            .iter()
            .filter_map(|e| e.b_line.as_ref().map(|l| l.number))
            .collect();

        let a_offset = format_range('-', &a_lines, self.a_start);
        let b_offset = format_range('+', &b_lines, self.b_start);
        format!("@@ {a_offset} {b_offset} @@")
    }
}

fn format_range(sign: char, lines: &[usize], fallback: usize) -> String {
    let start = lines.first().copied().unwrap_or(fallback);
    format!("{sign}{start},{}", lines.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diff, split_lines};

    fn hunks(a: &str, b: &str) -> Vec<Hunk> {
        Hunk::filter(&diff(&split_lines(a.as_bytes()), &split_lines(b.as_bytes())))
    }

    #[test]
    fn no_changes_no_hunks() {
        assert!(hunks("a\nb\nc\n", "a\nb\nc\n").is_empty());
    }

    #[test]
    fn single_change_carries_three_context_lines() {
        let doc_a = "1\n2\n3\n4\n5\n6\n7\n8\n9\n";
        let doc_b = "1\n2\n3\n4\nX\n6\n7\n8\n9\n";

        let found = hunks(doc_a, doc_b);
        assert_eq!(found.len(), 1);

        // 3 before + del + ins + 3 after.
        assert_eq!(found[0].edits.len(), 8);
        assert_eq!(found[0].header(), "@@ -2,7 +2,7 @@");
    }

    #[test]
    fn nearby_changes_merge_into_one_hunk() {
        let doc_a = "1\n2\n3\n4\n5\n6\n7\n8\n9\n";
        let doc_b = "1\nX\n3\n4\n5\nY\n7\n8\n9\n";

        let found = hunks(doc_a, doc_b);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn distant_changes_split_into_hunks() {
        let lines_a: Vec<String> = (1..=30).map(|i| format!("{i}\n")).collect();
        let mut lines_b = lines_a.clone();
        lines_b[1] = "X\n".to_string();
        lines_b[27] = "Y\n".to_string();

        let found = hunks(&lines_a.concat(), &lines_b.concat());
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn change_at_start_has_no_leading_context() {
        let found = hunks("a\nb\nc\nd\ne\n", "X\nb\nc\nd\ne\n");
        assert_eq!(found.len(), 1);
        let first = &found[0].edits[0];
        assert_ne!(first.ty, EditType::Eql);
    }
}
