//! Processing for received packs.
//!
//! Small transfers are exploded into loose objects; anything over the
//! configured unpack limit is kept as a pack and indexed in place.

use std::collections::HashMap;
use std::io::Read;

use grit_hash::ObjectId;
use grit_object::ObjectType;
use grit_pack::delta::Expander;
use grit_pack::indexer::Indexer;
use grit_pack::reader::Reader;
use grit_pack::stream::Stream;
use grit_pack::{PackError, Record};

use crate::{Database, OdbError};

/// Read one pack from `stream` into the database. `unpack_limit` is the
/// configured `*.unpackLimit`; packs with more records than the limit stay
/// packed and get indexed.
pub fn receive_packed_objects<R: Read>(
    db: &Database,
    stream: Stream<R>,
    unpack_limit: Option<u32>,
) -> Result<(), OdbError> {
    let mut reader = Reader::new(stream);
    reader.read_header()?;

    match unpack_limit {
        Some(limit) if reader.count > limit => {
            Indexer::new(db.pack_dir(), reader).process_pack()?;
            db.reload_packs();
        }
        _ => unpack(db, reader)?,
    }
    Ok(())
}

/// Store every record as a loose object, expanding deltas as their bases
/// become available.
fn unpack<R: Read>(db: &Database, mut reader: Reader<R>) -> Result<(), OdbError> {
    // OFS deltas reference earlier records by byte offset.
    let mut stored_at: HashMap<u64, ObjectId> = HashMap::new();

    for _ in 0..reader.count {
        let offset = reader.stream.offset();
        let (record, _) = reader.capture_record()?;

        let (ty, data) = match record {
            Record::Base { ty, data } => (ty, data),
            Record::RefDelta { base_oid, delta } => expand_from(db, &base_oid, &delta)?,
            Record::OfsDelta { base_ofs, delta } => {
                let base_oid = stored_at
                    .get(&(offset - base_ofs))
                    .copied()
                    .ok_or_else(|| {
                        OdbError::Pack(PackError::InvalidDelta(format!(
                            "ofs delta references unknown offset {}",
                            offset - base_ofs
                        )))
                    })?;
                expand_from(db, &base_oid, &delta)?
            }
        };

        let oid = db.store_raw(ty, &data)?;
        stored_at.insert(offset, oid);
    }

    reader.stream.verify_checksum()?;
    Ok(())
}

fn expand_from(
    db: &Database,
    base_oid: &ObjectId,
    delta: &[u8],
) -> Result<(ObjectType, Vec<u8>), OdbError> {
    let base = db
        .load_raw(base_oid)?
        .ok_or(OdbError::Pack(PackError::MissingBase(*base_oid)))?;
    let data = Expander::expand(&base.data, delta)?;
    Ok((base.ty, data))
}
