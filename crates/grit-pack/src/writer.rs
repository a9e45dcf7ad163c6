//! Pack serialization.

use std::io::Write;

use bstr::BString;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use grit_hash::{Hasher, ObjectId};

use crate::compressor;
use crate::entry::Entry;
use crate::numbers::{varint_be, varint_le};
use crate::{ObjectSource, PackError, HEADER_SIZE, SIGNATURE, VERSION};

/// Default zlib level for pack payloads.
pub const DEFAULT_COMPRESSION: u32 = 6;

pub struct Writer<W: Write> {
    output: W,
    hasher: Hasher,
    offset: u64,
    compression: u32,
    allow_ofs: bool,
}

impl<W: Write> Writer<W> {
    pub fn new(output: W, compression: u32, allow_ofs: bool) -> Self {
        Self {
            output,
            hasher: Hasher::new(),
            offset: 0,
            compression: compression.min(9),
            allow_ofs,
        }
    }

    /// Write a complete pack containing `objects`, choosing deltas within
    /// the compression window. Returns the pack trailer hash.
    pub fn write_objects<S: ObjectSource>(
        &mut self,
        objects: &[(ObjectId, Option<BString>)],
        db: &S,
    ) -> Result<ObjectId, PackError> {
        let mut entries = self.prepare_pack_list(objects, db)?;
        compressor::build_deltas(db, &mut entries)?;

        self.write_header(entries.len() as u32)?;
        for idx in 0..entries.len() {
            self.write_entry(&mut entries, idx, db)?;
        }

        let digest = self.hasher.clone().finalize();
        self.output.write_all(digest.as_bytes())?;
        self.output.flush()?;
        Ok(digest)
    }

    fn prepare_pack_list<S: ObjectSource>(
        &self,
        objects: &[(ObjectId, Option<BString>)],
        db: &S,
    ) -> Result<Vec<Entry>, PackError> {
        let mut entries = Vec::with_capacity(objects.len());
        for (oid, path) in objects {
            let (ty, size) = db.info(oid)?;
            entries.push(Entry::new(*oid, ty, size, path.clone(), self.allow_ofs));
        }
        Ok(entries)
    }

    fn write_header(&mut self, count: u32) -> Result<(), PackError> {
        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(SIGNATURE);
        header.extend_from_slice(&VERSION.to_be_bytes());
        header.extend_from_slice(&count.to_be_bytes());
        self.write(&header)
    }

    fn write_entry<S: ObjectSource>(
        &mut self,
        entries: &mut [Entry],
        idx: usize,
        db: &S,
    ) -> Result<(), PackError> {
        // A delta's base must precede it in the pack.
        if let Some(base) = entries[idx].delta.as_ref().map(|d| d.base) {
            self.write_entry(entries, base, db)?;
        }

        if entries[idx].offset != 0 {
            return Ok(());
        }
        entries[idx].offset = self.offset;

        let payload = match &entries[idx].delta {
            Some(delta) => delta.data.clone(),
            None => db.payload(&entries[idx].oid)?,
        };

        let mut header = varint_le::write(entries[idx].packed_size(), 4);
        header[0] |= entries[idx].packed_type() << 4;
        self.write(&header)?;

        if let Some(delta) = &entries[idx].delta {
            if entries[idx].ofs {
                let distance = entries[idx].offset - entries[delta.base].offset;
                self.write(&varint_be::write(distance))?;
            } else {
                let base_oid = entries[delta.base].oid;
                self.write(base_oid.as_bytes())?;
            }
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.compression));
        encoder.write_all(&payload)?;
        self.write(&encoder.finish()?)?;

        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PackError> {
        self.output.write_all(data)?;
        self.hasher.update(data);
        self.offset += data.len() as u64;
        Ok(())
    }
}
