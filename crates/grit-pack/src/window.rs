//! The sliding window of recently visited objects used for delta source
//! selection.

use crate::xdelta::XDeltaIndex;

/// An object held in the window with its payload and a lazily built delta
/// index.
pub struct Unpacked {
    pub entry_index: usize,
    pub data: Vec<u8>,
    index: Option<XDeltaIndex>,
}

impl Unpacked {
    /// The delta index over this object's data, built on first use.
    pub fn delta_index(&mut self) -> &XDeltaIndex {
        if self.index.is_none() {
            self.index = Some(XDeltaIndex::new(self.data.clone()));
        }
        self.index.as_ref().unwrap()
    }
}

/// Fixed-size ring of candidate delta sources.
pub struct Window {
    slots: Vec<Option<Unpacked>>,
    cursor: usize,
}

impl Window {
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "window size must be positive");
        Self {
            slots: (0..size).map(|_| None).collect(),
            cursor: 0,
        }
    }

    /// Insert the next target, evicting the oldest occupant. Returns the
    /// slot it landed in.
    pub fn add(&mut self, entry_index: usize, data: Vec<u8>) -> usize {
        let slot = self.cursor;
        self.slots[slot] = Some(Unpacked {
            entry_index,
            data,
            index: None,
        });
        self.cursor = (self.cursor + 1) % self.slots.len();
        slot
    }

    /// Occupied slots other than `target_slot`, most recently added first.
    pub fn sources(&self, target_slot: usize) -> Vec<usize> {
        let len = self.slots.len();
        let mut out = Vec::with_capacity(len - 1);
        let mut cursor = (target_slot + len - 1) % len;
        while cursor != target_slot {
            if self.slots[cursor].is_some() {
                out.push(cursor);
            }
            cursor = (cursor + len - 1) % len;
        }
        out
    }

    pub fn get(&self, slot: usize) -> &Unpacked {
        self.slots[slot].as_ref().expect("empty window slot")
    }

    /// Mutable source plus shared target, which must be distinct slots.
    pub fn pair_mut(&mut self, source: usize, target: usize) -> (&mut Unpacked, &Unpacked) {
        assert_ne!(source, target);
        if source < target {
            let (a, b) = self.slots.split_at_mut(target);
            (
                a[source].as_mut().expect("empty window slot"),
                b[0].as_ref().expect("empty window slot"),
            )
        } else {
            let (a, b) = self.slots.split_at_mut(source);
            (
                b[0].as_mut().expect("empty window slot"),
                a[target].as_ref().expect("empty window slot"),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_exclude_target_and_run_newest_first() {
        let mut window = Window::new(4);
        let s0 = window.add(10, vec![0]);
        let s1 = window.add(11, vec![1]);
        let s2 = window.add(12, vec![2]);

        let sources = window.sources(s2);
        assert_eq!(sources, vec![s1, s0]);
    }

    #[test]
    fn ring_evicts_oldest() {
        let mut window = Window::new(2);
        window.add(1, vec![]);
        window.add(2, vec![]);
        let slot = window.add(3, vec![]);

        let sources = window.sources(slot);
        assert_eq!(sources.len(), 1);
        assert_eq!(window.get(sources[0]).entry_index, 2);
    }

    #[test]
    fn pair_mut_allows_index_building() {
        let mut window = Window::new(3);
        let a = window.add(0, vec![7u8; 32]);
        let b = window.add(1, vec![7u8; 32]);

        let (source, target) = window.pair_mut(a, b);
        let ops = source.delta_index().compress(&target.data);
        assert!(!ops.is_empty());
    }
}
