//! Delta selection over the pack list.
//!
//! Entries are sorted so similar objects are adjacent, then slid through a
//! fixed-size window. Each window neighbor is tried as a delta base; a delta
//! survives only if it beats a size budget scaled by how much chain depth it
//! would leave available.

use crate::delta;
use crate::entry::Entry;
use crate::window::Window;
use crate::{ObjectSource, PackError};

/// Objects outside this size band are never delta candidates.
const OBJECT_SIZE_MIN: u64 = 50;
const OBJECT_SIZE_MAX: u64 = 0x2000_0000;

/// Maximum delta chain length.
pub const MAX_DEPTH: u32 = 50;

/// Number of previous objects considered as bases.
pub const WINDOW_SIZE: usize = 8;

/// Try to replace entry payloads with deltas against window neighbors.
pub fn build_deltas<S: ObjectSource>(db: &S, entries: &mut [Entry]) -> Result<(), PackError> {
    let mut eligible: Vec<usize> = (0..entries.len())
        .filter(|&i| (OBJECT_SIZE_MIN..=OBJECT_SIZE_MAX).contains(&entries[i].size))
        .collect();
    eligible.sort_by(|&a, &b| entries[b].sort_key().cmp(&entries[a].sort_key()));

    let mut window = Window::new(WINDOW_SIZE);

    for idx in eligible {
        let data = db.payload(&entries[idx].oid)?;
        let target_slot = window.add(idx, data);
        for source_slot in window.sources(target_slot) {
            try_delta(entries, &mut window, source_slot, target_slot);
        }
    }

    Ok(())
}

fn try_delta(entries: &mut [Entry], window: &mut Window, source_slot: usize, target_slot: usize) {
    let source_idx = window.get(source_slot).entry_index;
    let target_idx = window.get(target_slot).entry_index;

    let source = &entries[source_idx];
    let target = &entries[target_idx];

    if source.ty != target.ty || source.depth >= MAX_DEPTH {
        return;
    }

    let max_size = max_size_heuristic(source, target);
    if !compatible_sizes(source, target, max_size) {
        return;
    }

    let (source_size, target_size) = (source.size, target.size);
    let (source_depth, target_packed) = (source.depth, target.packed_size());
    let target_depth = target.depth;

    let delta_data = {
        let (source_unp, target_unp) = window.pair_mut(source_slot, target_slot);
        let ops = source_unp.delta_index().compress(&target_unp.data);
        delta::serialize(source_size, target_size, &ops)
    };

    let delta_size = delta_data.len() as u64;
    if delta_size as f64 > max_size {
        return;
    }
    if delta_size == target_packed && source_depth + 1 >= target_depth {
        return;
    }

    entries[target_idx].assign_delta(source_idx, source_depth, delta_data);
}

/// The size budget a candidate delta must beat, shrinking as the source sits
/// deeper in an existing chain.
fn max_size_heuristic(source: &Entry, target: &Entry) -> f64 {
    let (max_size, ref_depth) = match &target.delta {
        Some(delta) => (delta.data.len() as f64, target.depth),
        None => (target.size as f64 / 2.0 - 20.0, 1),
    };

    max_size * f64::from(MAX_DEPTH - source.depth) / f64::from(MAX_DEPTH + 1 - ref_depth)
}

fn compatible_sizes(source: &Entry, target: &Entry, max_size: f64) -> bool {
    let size_diff = target.size.saturating_sub(source.size) as f64;
    if max_size <= 0.0 {
        return false;
    }
    if size_diff >= max_size {
        return false;
    }
    if target.size < source.size / 32 {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use grit_hash::ObjectId;
    use grit_object::ObjectType;
    use std::collections::HashMap;

    struct MapSource(HashMap<ObjectId, (ObjectType, Vec<u8>)>);

    impl ObjectSource for MapSource {
        fn info(&self, oid: &ObjectId) -> Result<(ObjectType, u64), PackError> {
            let (ty, data) = self.0.get(oid).ok_or(PackError::ObjectMissing(*oid))?;
            Ok((*ty, data.len() as u64))
        }

        fn payload(&self, oid: &ObjectId) -> Result<Vec<u8>, PackError> {
            Ok(self.0.get(oid).ok_or(PackError::ObjectMissing(*oid))?.1.clone())
        }
    }

    fn blob(n: u8, data: Vec<u8>) -> (ObjectId, (ObjectType, Vec<u8>)) {
        (ObjectId::from_raw([n; 20]), (ObjectType::Blob, data))
    }

    #[test]
    fn similar_blobs_get_deltas() {
        let base: Vec<u8> = (0..512u32).map(|i| (i % 251) as u8).collect();
        let mut extended = base.clone();
        extended.extend_from_slice(b"trailing 11b");

        let (oid_a, val_a) = blob(1, base.clone());
        let (oid_b, val_b) = blob(2, extended.clone());
        let db = MapSource(HashMap::from([(oid_a, val_a), (oid_b, val_b)]));

        let mut entries = vec![
            Entry::new(oid_a, ObjectType::Blob, base.len() as u64, None, true),
            Entry::new(oid_b, ObjectType::Blob, extended.len() as u64, None, true),
        ];
        build_deltas(&db, &mut entries).unwrap();

        let deltified = entries.iter().filter(|e| e.delta.is_some()).count();
        assert_eq!(deltified, 1);
        let target = entries.iter().find(|e| e.delta.is_some()).unwrap();
        assert_eq!(target.depth, 1);
        assert!(target.packed_size() < target.size / 2);
    }

    #[test]
    fn small_objects_are_skipped() {
        let (oid_a, val_a) = blob(1, vec![1; 20]);
        let (oid_b, val_b) = blob(2, vec![1; 20]);
        let db = MapSource(HashMap::from([(oid_a, val_a), (oid_b, val_b)]));

        let mut entries = vec![
            Entry::new(oid_a, ObjectType::Blob, 20, None, true),
            Entry::new(oid_b, ObjectType::Blob, 20, None, true),
        ];
        build_deltas(&db, &mut entries).unwrap();
        assert!(entries.iter().all(|e| e.delta.is_none()));
    }

    #[test]
    fn unrelated_types_never_pair() {
        let data: Vec<u8> = (0..512u32).map(|i| (i % 7) as u8).collect();
        let (oid_a, val_a) = blob(1, data.clone());
        let oid_b = ObjectId::from_raw([2; 20]);
        let db = MapSource(HashMap::from([
            (oid_a, val_a),
            (oid_b, (ObjectType::Tree, data.clone())),
        ]));

        let mut entries = vec![
            Entry::new(oid_a, ObjectType::Blob, data.len() as u64, None, true),
            Entry::new(oid_b, ObjectType::Tree, data.len() as u64, None, true),
        ];
        build_deltas(&db, &mut entries).unwrap();
        assert!(entries.iter().all(|e| e.delta.is_none()));
    }
}
