//! Myers O((N+M)D) shortest edit script.

use std::collections::HashMap;

use crate::Line;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditType {
    Eql,
    Ins,
    Del,
}

/// One step of an edit script. Equal edits carry both lines, insertions
/// only the new line, deletions only the old.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub ty: EditType,
    pub a_line: Option<Line>,
    pub b_line: Option<Line>,
}

pub struct Myers<'a> {
    a: &'a [Line],
    b: &'a [Line],
}

impl<'a> Myers<'a> {
    pub fn diff(a: &'a [Line], b: &'a [Line]) -> Vec<Edit> {
        Self { a, b }.run()
    }

    fn run(&self) -> Vec<Edit> {
        let mut edits = Vec::new();

        for (prev_x, prev_y, x, y) in self.backtrack() {
            if x == prev_x {
                edits.push(Edit {
                    ty: EditType::Ins,
                    a_line: None,
                    b_line: Some(self.b[prev_y].clone()),
                });
            } else if y == prev_y {
                edits.push(Edit {
                    ty: EditType::Del,
                    a_line: Some(self.a[prev_x].clone()),
                    b_line: None,
                });
            } else {
                edits.push(Edit {
                    ty: EditType::Eql,
                    a_line: Some(self.a[prev_x].clone()),
                    b_line: Some(self.b[prev_y].clone()),
                });
            }
        }

        edits.reverse();
        edits
    }

    /// Walk the d-level trace backwards, yielding `(prev_x, prev_y, x, y)`
    /// coordinate steps for the edit script.
    fn backtrack(&self) -> Vec<(usize, usize, usize, usize)> {
        let trace = self.shortest_edit();
        let mut steps = Vec::new();

        let mut x = self.a.len() as i64;
        let mut y = self.b.len() as i64;

        for (d, v) in trace.iter().enumerate().rev() {
            let d = d as i64;
            let k = x - y;

            let prev_k = if k == -d || (k != d && get(v, k - 1) < get(v, k + 1)) {
                k + 1
            } else {
                k - 1
            };
            let prev_x = get(v, prev_k);
            let prev_y = prev_x - prev_k;

            // Follow the diagonal while both sides stay equal.
            while x > prev_x && y > prev_y {
                steps.push(((x - 1) as usize, (y - 1) as usize, x as usize, y as usize));
                x -= 1;
                y -= 1;
            }

            if d > 0 {
                steps.push((prev_x as usize, prev_y as usize, x as usize, y as usize));
            }

            x = prev_x;
            y = prev_y;
        }

        steps
    }

    /// Forward pass: for each edit distance d, the furthest x reachable on
    /// every diagonal k.
    fn shortest_edit(&self) -> Vec<HashMap<i64, i64>> {
        let n = self.a.len() as i64;
        let m = self.b.len() as i64;
        let max_d = n + m;

        let mut v: HashMap<i64, i64> = HashMap::from([(1, 0)]);
        let mut trace = Vec::new();

        for d in 0..=max_d {
            trace.push(v.clone());

            let mut k = -d;
            while k <= d {
                let mut x = if k == -d || (k != d && get(&v, k - 1) < get(&v, k + 1)) {
                    get(&v, k + 1)
                } else {
                    get(&v, k - 1) + 1
                };
                let mut y = x - k;

                while x < n && y < m && self.a[x as usize].text == self.b[y as usize].text {
                    x += 1;
                    y += 1;
                }

                v.insert(k, x);

                if x >= n && y >= m {
                    return trace;
                }
                k += 2;
            }
        }

        trace
    }
}

fn get(v: &HashMap<i64, i64>, k: i64) -> i64 {
    v.get(&k).copied().unwrap_or(0)
}
