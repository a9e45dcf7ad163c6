//! Incoming-pack indexing.
//!
//! Streams a received pack to disk verbatim while recording each record's
//! offset and CRC32, resolves delta chains to learn every object's OID, and
//! writes the companion `.idx`. Both files are assembled under temp names
//! and renamed once their trailing checksums are known.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use grit_hash::{Hasher, ObjectId};
use grit_object::{hash_payload, ObjectType};
use grit_utils::tempfile::TempFile;

use crate::delta::Expander;
use crate::reader::{read_record_at, Reader};
use crate::{PackError, Record, HEADER_SIZE, IDX_MAX_OFFSET, IDX_SIGNATURE, SIGNATURE, VERSION};

/// A temp file that tracks the SHA-1 of everything written, so the final
/// name and trailing checksum can both come from the digest.
struct ChecksummedTemp {
    file: TempFile,
    hasher: Hasher,
}

impl ChecksummedTemp {
    fn new(dir: &Path, prefix: &str) -> Result<Self, PackError> {
        Ok(Self {
            file: TempFile::new(dir, prefix).map_err(io_from_util)?,
            hasher: Hasher::new(),
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PackError> {
        self.file.write_all(data).map_err(io_from_util)?;
        self.hasher.update(data);
        Ok(())
    }

    fn digest(&self) -> ObjectId {
        self.hasher.clone().finalize()
    }

    /// Append the running digest as the trailer and rename into place.
    fn finish(mut self, name: &str) -> Result<PathBuf, PackError> {
        let digest = self.digest();
        self.file.write_all(digest.as_bytes()).map_err(io_from_util)?;
        self.file.persist(name).map_err(io_from_util)
    }
}

fn io_from_util(e: grit_utils::UtilError) -> PackError {
    match e {
        grit_utils::UtilError::Io(io) => PackError::Io(io),
        other => PackError::Io(std::io::Error::other(other.to_string())),
    }
}

pub struct Indexer<R: Read> {
    pack_dir: PathBuf,
    reader: Reader<R>,
    /// oid → (offset, crc32) for every resolved record.
    index: BTreeMap<ObjectId, (u64, u32)>,
    pending_ofs: HashMap<u64, Vec<(u64, u32)>>,
    pending_ref: HashMap<ObjectId, Vec<(u64, u32)>>,
}

impl<R: Read> Indexer<R> {
    /// `reader` must have consumed the pack header already.
    pub fn new(pack_dir: impl AsRef<Path>, reader: Reader<R>) -> Self {
        Self {
            pack_dir: pack_dir.as_ref().to_path_buf(),
            reader,
            index: BTreeMap::new(),
            pending_ofs: HashMap::new(),
            pending_ref: HashMap::new(),
        }
    }

    /// Consume the stream and produce `pack-<hash>.pack` + `pack-<hash>.idx`.
    /// Returns the pack path.
    pub fn process_pack(mut self) -> Result<PathBuf, PackError> {
        let mut pack_file = ChecksummedTemp::new(&self.pack_dir, "tmp_pack")?;

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(SIGNATURE);
        header.extend_from_slice(&VERSION.to_be_bytes());
        header.extend_from_slice(&self.reader.count.to_be_bytes());
        pack_file.write(&header)?;

        for _ in 0..self.reader.count {
            self.index_record(&mut pack_file)?;
        }

        self.reader.stream.verify_checksum()?;

        let pack_digest = pack_file.digest();
        let pack_name = format!("pack-{}.pack", pack_digest.to_hex());
        let pack_path = pack_file.finish(&pack_name)?;

        self.resolve_deltas(&pack_path)?;
        self.write_index(&pack_digest)?;

        Ok(pack_path)
    }

    fn index_record(&mut self, pack_file: &mut ChecksummedTemp) -> Result<(), PackError> {
        let offset = self.reader.stream.offset();
        let (record, bytes) = self.reader.capture_record()?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&bytes);
        let crc32 = crc.finalize();

        pack_file.write(&bytes)?;

        match record {
            Record::Base { ty, data } => {
                let oid = hash_payload(ty, &data);
                self.index.insert(oid, (offset, crc32));
            }
            Record::OfsDelta { base_ofs, .. } => {
                self.pending_ofs
                    .entry(offset - base_ofs)
                    .or_default()
                    .push((offset, crc32));
            }
            Record::RefDelta { base_oid, .. } => {
                self.pending_ref
                    .entry(base_oid)
                    .or_default()
                    .push((offset, crc32));
            }
        }
        Ok(())
    }

    /// Expand every delta chain rooted at a base record, assigning OIDs to
    /// the reconstructed objects.
    fn resolve_deltas(&mut self, pack_path: &Path) -> Result<(), PackError> {
        let file = File::open(pack_path)?;
        let roots: Vec<(ObjectId, u64)> = self
            .index
            .iter()
            .map(|(oid, (offset, _))| (*oid, *offset))
            .collect();

        for (oid, offset) in roots {
            let record = read_record_at(&file, offset)?;
            let Record::Base { ty, data } = record else {
                continue;
            };
            self.resolve_base(&file, ty, &data, offset, oid)?;
        }
        Ok(())
    }

    fn resolve_base(
        &mut self,
        file: &File,
        ty: ObjectType,
        data: &[u8],
        offset: u64,
        oid: ObjectId,
    ) -> Result<(), PackError> {
        let mut pending = self.pending_ofs.remove(&offset).unwrap_or_default();
        pending.extend(self.pending_ref.remove(&oid).unwrap_or_default());

        for (delta_offset, crc32) in pending {
            let record = read_record_at(file, delta_offset)?;
            let delta = match record {
                Record::OfsDelta { delta, .. } | Record::RefDelta { delta, .. } => delta,
                Record::Base { .. } => continue,
            };

            let expanded = Expander::expand(data, &delta)?;
            let child_oid = hash_payload(ty, &expanded);
            self.index.insert(child_oid, (delta_offset, crc32));

            self.resolve_base(file, ty, &expanded, delta_offset, child_oid)?;
        }
        Ok(())
    }

    fn write_index(&self, pack_digest: &ObjectId) -> Result<(), PackError> {
        let mut idx = ChecksummedTemp::new(&self.pack_dir, "tmp_idx")?;

        let mut header = Vec::with_capacity(8);
        header.extend_from_slice(&IDX_SIGNATURE.to_be_bytes());
        header.extend_from_slice(&VERSION.to_be_bytes());
        idx.write(&header)?;

        // Cumulative fan-out.
        let mut counts = [0u32; 256];
        for oid in self.index.keys() {
            counts[usize::from(oid.first_byte())] += 1;
        }
        let mut total = 0u32;
        for count in counts {
            total += count;
            idx.write(&total.to_be_bytes())?;
        }

        for oid in self.index.keys() {
            idx.write(oid.as_bytes())?;
        }

        for (_, crc32) in self.index.values() {
            idx.write(&crc32.to_be_bytes())?;
        }

        let mut large_offsets: Vec<u64> = Vec::new();
        for (offset, _) in self.index.values() {
            if *offset >= IDX_MAX_OFFSET {
                large_offsets.push(*offset);
                let pointer = IDX_MAX_OFFSET as u32 | (large_offsets.len() as u32 - 1);
                idx.write(&pointer.to_be_bytes())?;
            } else {
                idx.write(&(*offset as u32).to_be_bytes())?;
            }
        }
        for offset in large_offsets {
            idx.write(&offset.to_be_bytes())?;
        }

        idx.write(pack_digest.as_bytes())?;
        idx.finish(&format!("pack-{}.idx", pack_digest.to_hex()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::PackIndex;
    use crate::pack::PackFile;
    use crate::stream::Stream;
    use crate::writer::Writer;
    use crate::ObjectSource;
    use bstr::BString;
    use std::io::Cursor;

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

    fn sample_objects() -> Vec<(ObjectId, Vec<u8>)> {
        let base: Vec<u8> = (0..512u32).map(|i| (i % 251) as u8).collect();
        let mut extended = base.clone();
        extended.extend_from_slice(b"11 more byte");
        let tiny = b"tiny".to_vec();

        vec![
            (hash_payload(ObjectType::Blob, &base), base),
            (hash_payload(ObjectType::Blob, &extended), extended),
            (hash_payload(ObjectType::Blob, &tiny), tiny),
        ]
    }

    fn build_pack(objects: &[(ObjectId, Vec<u8>)], allow_ofs: bool) -> Vec<u8> {
        let db = MapSource(
            objects
                .iter()
                .map(|(oid, data)| (*oid, (ObjectType::Blob, data.clone())))
                .collect(),
        );
        let list: Vec<(ObjectId, Option<BString>)> =
            objects.iter().map(|(oid, _)| (*oid, None)).collect();
        let mut out = Vec::new();
        Writer::new(&mut out, 6, allow_ofs)
            .write_objects(&list, &db)
            .unwrap();
        out
    }

    #[test]
    fn index_pack_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let objects = sample_objects();
        let wire = build_pack(&objects, true);

        let mut reader = Reader::new(Stream::new(Cursor::new(wire)));
        reader.read_header().unwrap();
        let pack_path = Indexer::new(dir.path(), reader).process_pack().unwrap();

        let idx_path = pack_path.with_extension("idx");
        assert!(idx_path.is_file());

        let index = PackIndex::open(&idx_path).unwrap();
        assert_eq!(index.count(), objects.len());

        let pack = PackFile::open(&pack_path).unwrap();
        for (oid, data) in &objects {
            assert!(index.contains(oid));
            let (ty, loaded) = pack.load_raw(oid).unwrap().unwrap();
            assert_eq!(ty, ObjectType::Blob);
            assert_eq!(&loaded, data, "payload mismatch for {oid}");

            let (_, size) = pack.load_info(oid).unwrap().unwrap();
            assert_eq!(size, data.len() as u64);
        }
    }

    #[test]
    fn ref_delta_pack_resolves_through_oid() {
        let dir = tempfile::tempdir().unwrap();
        let objects = sample_objects();
        let wire = build_pack(&objects, false);

        let mut reader = Reader::new(Stream::new(Cursor::new(wire)));
        reader.read_header().unwrap();
        let pack_path = Indexer::new(dir.path(), reader).process_pack().unwrap();

        let pack = PackFile::open(&pack_path).unwrap();
        for (oid, data) in &objects {
            let (_, loaded) = pack.load_raw(oid).unwrap().unwrap();
            assert_eq!(&loaded, data);
        }
    }

    #[test]
    fn prefix_match_in_index() {
        let dir = tempfile::tempdir().unwrap();
        let objects = sample_objects();
        let wire = build_pack(&objects, true);

        let mut reader = Reader::new(Stream::new(Cursor::new(wire)));
        reader.read_header().unwrap();
        let pack_path = Indexer::new(dir.path(), reader).process_pack().unwrap();

        let index = PackIndex::open(pack_path.with_extension("idx")).unwrap();
        for (oid, _) in &objects {
            let matches = index.prefix_match(&oid.to_hex()[..8]);
            assert!(matches.contains(oid));
        }
        assert!(index.prefix_match("zz").is_empty());
    }

    #[test]
    fn truncated_pack_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let objects = sample_objects();
        let mut wire = build_pack(&objects, true);
        wire.truncate(wire.len() - 5);

        let mut reader = Reader::new(Stream::new(Cursor::new(wire)));
        reader.read_header().unwrap();
        let result = Indexer::new(dir.path(), reader).process_pack();
        assert!(result.is_err());
    }
}
