//! Streaming pack parser.

use std::io::{Read, Seek, SeekFrom};

use flate2::{Decompress, FlushDecompress, Status};
use grit_hash::ObjectId;

use crate::delta::Expander;
use crate::numbers::varint_le;
use crate::stream::Stream;
use crate::{
    type_from_code, PackError, Record, RecordInfo, OFS_DELTA, REF_DELTA, SIGNATURE, VERSION,
};

/// Chunk size for feeding the inflater; over-read bytes are pushed back
/// onto the stream.
const ZLIB_CHUNK: usize = 256;

pub struct Reader<R: Read> {
    pub stream: Stream<R>,
    pub count: u32,
}

impl<R: Read> Reader<R> {
    pub fn new(stream: Stream<R>) -> Self {
        Self { stream, count: 0 }
    }

    /// Parse `PACK <version> <count>`.
    pub fn read_header(&mut self) -> Result<(), PackError> {
        let header = self.stream.read_exact(crate::HEADER_SIZE)?;
        if &header[..4] != SIGNATURE {
            return Err(PackError::BadSignature);
        }
        let version = u32::from_be_bytes(header[4..8].try_into().unwrap());
        if version != VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        self.count = u32::from_be_bytes(header[8..12].try_into().unwrap());
        Ok(())
    }

    /// Read one full record, decompressing its payload.
    pub fn read_record(&mut self) -> Result<Record, PackError> {
        let (ty, _) = self.read_record_header()?;

        if let Some(obj_ty) = type_from_code(ty) {
            let data = self.read_zlib_stream()?;
            return Ok(Record::Base { ty: obj_ty, data });
        }

        match ty {
            OFS_DELTA => {
                let base_ofs = crate::numbers::varint_be::read(&mut self.stream)?;
                let delta = self.read_zlib_stream()?;
                Ok(Record::OfsDelta { base_ofs, delta })
            }
            REF_DELTA => {
                let raw = self.stream.read_exact(grit_hash::DIGEST_LEN)?;
                let base_oid = ObjectId::from_bytes(&raw)?;
                let delta = self.read_zlib_stream()?;
                Ok(Record::RefDelta { base_oid, delta })
            }
            other => Err(PackError::UnknownRecordType(other)),
        }
    }

    /// Read one record's metadata. Base payloads are not decompressed; for
    /// deltas the instruction stream is, so the reconstructed target size
    /// can be reported.
    pub fn load_info(&mut self) -> Result<RecordInfo, PackError> {
        let (ty, size) = self.read_record_header()?;

        if let Some(obj_ty) = type_from_code(ty) {
            return Ok(RecordInfo::Base { ty: obj_ty, size });
        }

        match ty {
            OFS_DELTA => {
                let base_ofs = crate::numbers::varint_be::read(&mut self.stream)?;
                let delta = self.read_zlib_stream()?;
                let target_size = Expander::new(&delta)?.target_size;
                Ok(RecordInfo::OfsDelta {
                    base_ofs,
                    target_size,
                })
            }
            REF_DELTA => {
                let raw = self.stream.read_exact(grit_hash::DIGEST_LEN)?;
                let base_oid = ObjectId::from_bytes(&raw)?;
                let delta = self.read_zlib_stream()?;
                let target_size = Expander::new(&delta)?.target_size;
                Ok(RecordInfo::RefDelta {
                    base_oid,
                    target_size,
                })
            }
            other => Err(PackError::UnknownRecordType(other)),
        }
    }

    /// Read a record while capturing the exact bytes it occupied (for CRC
    /// and for re-writing the pack to disk).
    pub fn capture_record(&mut self) -> Result<(Record, Vec<u8>), PackError> {
        self.stream.begin_capture();
        let result = self.read_record();
        let captured = self.stream.end_capture();
        Ok((result?, captured))
    }

    fn read_record_header(&mut self) -> Result<(u8, u64), PackError> {
        let (first, size) = varint_le::read(&mut self.stream, 4)?;
        Ok(((first >> 4) & 0x7, size))
    }

    /// Inflate one zlib stream, pushing bytes the inflater did not consume
    /// back onto the stream.
    fn read_zlib_stream(&mut self) -> Result<Vec<u8>, PackError> {
        let mut inflater = Decompress::new(true);
        let mut out = Vec::with_capacity(ZLIB_CHUNK);
        let mut done = false;

        while !done {
            let chunk = self.stream.read_nonblock(ZLIB_CHUNK)?;
            if chunk.is_empty() {
                return Err(PackError::UnexpectedEof);
            }

            let mut consumed = 0usize;
            loop {
                let before_in = inflater.total_in();
                let status = inflater
                    .decompress_vec(&chunk[consumed..], &mut out, FlushDecompress::None)
                    .map_err(|e| PackError::Zlib(e.to_string()))?;
                consumed += (inflater.total_in() - before_in) as usize;

                match status {
                    Status::StreamEnd => {
                        done = true;
                        break;
                    }
                    Status::Ok | Status::BufError => {
                        if consumed == chunk.len() {
                            break;
                        }
                        out.reserve(ZLIB_CHUNK.max(out.capacity()));
                    }
                }
            }

            if done && consumed < chunk.len() {
                self.stream.unread(&chunk[consumed..]);
            }
        }

        Ok(out)
    }
}

/// Read the record starting at `offset` in a seekable pack file.
pub fn read_record_at<F: Read + Seek>(mut file: F, offset: u64) -> Result<Record, PackError> {
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = Reader::new(Stream::new(file));
    reader.read_record()
}

/// Read record metadata starting at `offset` in a seekable pack file.
pub fn load_info_at<F: Read + Seek>(mut file: F, offset: u64) -> Result<RecordInfo, PackError> {
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = Reader::new(Stream::new(file));
    reader.load_info()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Writer;
    use crate::ObjectSource;
    use bstr::BString;
    use grit_object::ObjectType;
    use std::collections::HashMap;
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

    fn write_pack(objects: &[(ObjectId, Vec<u8>)], allow_ofs: bool) -> Vec<u8> {
        let db = MapSource(
            objects
                .iter()
                .map(|(oid, data)| (*oid, (ObjectType::Blob, data.clone())))
                .collect(),
        );
        let list: Vec<(ObjectId, Option<BString>)> =
            objects.iter().map(|(oid, _)| (*oid, None)).collect();

        let mut out = Vec::new();
        let mut writer = Writer::new(&mut out, 6, allow_ofs);
        writer.write_objects(&list, &db).unwrap();
        out
    }

    #[test]
    fn roundtrip_base_records() {
        let objects = vec![
            (ObjectId::from_raw([1; 20]), b"first payload".to_vec()),
            (ObjectId::from_raw([2; 20]), b"second payload".to_vec()),
        ];
        let pack = write_pack(&objects, false);

        let mut reader = Reader::new(Stream::new(Cursor::new(pack)));
        reader.read_header().unwrap();
        assert_eq!(reader.count, 2);

        for expected in [b"first payload".as_slice(), b"second payload".as_slice()] {
            match reader.read_record().unwrap() {
                Record::Base { ty, data } => {
                    assert_eq!(ty, ObjectType::Blob);
                    assert_eq!(data, expected);
                }
                other => panic!("expected base record, got {other:?}"),
            }
        }

        reader.stream.verify_checksum().unwrap();
    }

    #[test]
    fn delta_records_roundtrip_with_ofs() {
        // Two blobs where the second extends the first; the writer should
        // emit the smaller one as an OFS delta.
        let base: Vec<u8> = (0..512u32).map(|i| (i % 251) as u8).collect();
        let mut extended = base.clone();
        extended.extend_from_slice(b"11 more byte");

        let objects = vec![
            (ObjectId::from_raw([1; 20]), base.clone()),
            (ObjectId::from_raw([2; 20]), extended.clone()),
        ];
        let pack = write_pack(&objects, true);

        let mut reader = Reader::new(Stream::new(Cursor::new(pack)));
        reader.read_header().unwrap();

        let first = reader.read_record().unwrap();
        let second = reader.read_record().unwrap();
        reader.stream.verify_checksum().unwrap();

        let Record::Base { data: base_data, .. } = first else {
            panic!("first record must be the delta base");
        };
        let Record::OfsDelta { delta, .. } = second else {
            panic!("second record must be an OFS delta");
        };
        let rebuilt = Expander::expand(&base_data, &delta).unwrap();
        assert!(rebuilt == base || rebuilt == extended);
    }

    #[test]
    fn load_info_reports_delta_target_size() {
        let base: Vec<u8> = (0..512u32).map(|i| (i % 251) as u8).collect();
        let mut extended = base.clone();
        extended.extend_from_slice(b"11 more byte");

        let objects = vec![
            (ObjectId::from_raw([1; 20]), base.clone()),
            (ObjectId::from_raw([2; 20]), extended.clone()),
        ];
        let pack = write_pack(&objects, true);

        let mut reader = Reader::new(Stream::new(Cursor::new(pack)));
        reader.read_header().unwrap();

        let first = reader.load_info().unwrap();
        let second = reader.load_info().unwrap();

        let RecordInfo::Base { size, .. } = first else {
            panic!("expected base info");
        };
        let RecordInfo::OfsDelta { target_size, .. } = second else {
            panic!("expected delta info");
        };
        // The delta target is whichever blob was deltified.
        assert!(size == base.len() as u64 || size == extended.len() as u64);
        assert!(target_size == base.len() as u64 || target_size == extended.len() as u64);
        assert_ne!(size, target_size);
    }

    #[test]
    fn bad_signature_is_rejected() {
        let mut reader = Reader::new(Stream::new(Cursor::new(b"JUNKxxxxxxxx".to_vec())));
        assert!(matches!(reader.read_header(), Err(PackError::BadSignature)));
    }

    #[test]
    fn capture_record_returns_wire_bytes() {
        let objects = vec![(ObjectId::from_raw([1; 20]), b"capture me!!".to_vec())];
        let pack = write_pack(&objects, false);
        let pack_len = pack.len();

        let mut reader = Reader::new(Stream::new(Cursor::new(pack)));
        reader.read_header().unwrap();
        let (record, bytes) = reader.capture_record().unwrap();

        assert!(matches!(record, Record::Base { .. }));
        // Header (12) + record + trailer (20) is the whole pack.
        assert_eq!(bytes.len(), pack_len - 12 - 20);
        reader.stream.verify_checksum().unwrap();
    }
}
