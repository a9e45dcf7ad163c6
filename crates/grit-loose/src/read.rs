use std::fs::{self, File};
use std::io::Read;

use flate2::read::ZlibDecoder;
use flate2::{Decompress, FlushDecompress};
use grit_hash::ObjectId;
use grit_object::{header, ObjectType};

use crate::{LooseError, LooseStore};

/// How much of a compressed file we read when only the header is needed.
const INFO_PROBE_LEN: usize = 128;

impl LooseStore {
    /// Load a full object: `(type, payload)`. Returns `None` if the OID is
    /// not stored loose.
    pub fn load_raw(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, LooseError> {
        let path = self.object_path(oid);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut data = Vec::new();
        decoder.read_to_end(&mut data).map_err(|e| LooseError::Corrupt {
            oid: oid.to_hex(),
            reason: format!("zlib: {e}"),
        })?;

        let (ty, size, header_len) = header::parse_header(&data)?;
        let payload = data.split_off(header_len);
        if payload.len() != size {
            return Err(LooseError::Corrupt {
                oid: oid.to_hex(),
                reason: format!("size mismatch: header says {size}, got {}", payload.len()),
            });
        }

        Ok(Some((ty, payload)))
    }

    /// Load just `(type, size)` by decompressing only the file's prefix.
    pub fn load_info(&self, oid: &ObjectId) -> Result<Option<(ObjectType, usize)>, LooseError> {
        let path = self.object_path(oid);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut compressed = [0u8; INFO_PROBE_LEN];
        let mut filled = 0;
        while filled < INFO_PROBE_LEN {
            let n = file.read(&mut compressed[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        let mut inflater = Decompress::new(true);
        let mut out = [0u8; INFO_PROBE_LEN];
        inflater
            .decompress(&compressed[..filled], &mut out, FlushDecompress::None)
            .map_err(|e| LooseError::Corrupt {
                oid: oid.to_hex(),
                reason: format!("zlib: {e}"),
            })?;
        let produced = inflater.total_out() as usize;

        let (ty, size, _) = header::parse_header(&out[..produced])?;
        Ok(Some((ty, size)))
    }

    /// All loose OIDs whose hex form starts with `prefix`.
    pub fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, LooseError> {
        let prefix = prefix.to_ascii_lowercase();
        if prefix.len() < 2 || !grit_hash::hex::is_hex(&prefix) {
            return Ok(Vec::new());
        }

        let dirname = self.objects_dir().join(&prefix[..2]);
        let entries = match fs::read_dir(&dirname) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut oids = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let candidate = format!("{}{}", &prefix[..2], name.to_string_lossy());
            if candidate.starts_with(&prefix) {
                if let Ok(oid) = ObjectId::from_hex(&candidate) {
                    oids.push(oid);
                }
            }
        }
        Ok(oids)
    }
}
