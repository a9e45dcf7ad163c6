//! Property tests for the delta codec: any pair of buffers must survive a
//! compress/serialize/expand round trip.

use grit_pack::delta::{serialize, Expander};
use grit_pack::numbers::{varint_be, varint_le, SliceSource};
use grit_pack::xdelta::XDeltaIndex;
use proptest::prelude::*;

proptest! {
    #[test]
    fn xdelta_roundtrip_reconstructs_any_target(
        source in proptest::collection::vec(any::<u8>(), 0..2048),
        target in proptest::collection::vec(any::<u8>(), 0..2048),
    ) {
        let index = XDeltaIndex::new(source.clone());
        let ops = index.compress(&target);
        let delta = serialize(source.len() as u64, target.len() as u64, &ops);
        let rebuilt = Expander::expand(&source, &delta).unwrap();
        prop_assert_eq!(rebuilt, target);
    }

    #[test]
    fn related_buffers_roundtrip_through_edits(
        base in proptest::collection::vec(any::<u8>(), 64..1024),
        insert_at in 0usize..64,
        inserted in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut target = base.clone();
        let at = insert_at.min(target.len());
        target.splice(at..at, inserted);

        let index = XDeltaIndex::new(base.clone());
        let ops = index.compress(&target);
        let delta = serialize(base.len() as u64, target.len() as u64, &ops);
        prop_assert_eq!(Expander::expand(&base, &delta).unwrap(), target);
    }

    #[test]
    fn varint_le_roundtrips(value in any::<u64>(), shift in 4u32..8) {
        let encoded = varint_le::write(value, shift);
        let mut src = SliceSource::new(&encoded);
        let (_, decoded) = varint_le::read(&mut src, shift).unwrap();
        prop_assert_eq!(decoded, value);
    }

    #[test]
    fn varint_be_roundtrips(value in any::<u64>()) {
        let encoded = varint_be::write(value);
        let mut src = SliceSource::new(&encoded);
        prop_assert_eq!(varint_be::read(&mut src).unwrap(), value);
    }
}
