use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use grit_hash::{Hasher, ObjectId};
use grit_object::{header, ObjectType};
use grit_utils::tempfile::TempFile;

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Write an object payload. Returns the OID; storing a duplicate is a
    /// no-op.
    pub fn write(&self, ty: ObjectType, payload: &[u8]) -> Result<ObjectId, LooseError> {
        let hdr = header::write_header(ty, payload.len());

        let oid = {
            let mut hasher = Hasher::new();
            hasher.update(&hdr);
            hasher.update(payload);
            hasher.finalize()
        };

        if self.contains(&oid) {
            return Ok(oid);
        }

        let final_path = self.object_path(&oid);
        let dir = final_path.parent().expect("fan-out dir");

        let mut tmp = TempFile::new(dir, "tmp_obj")?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.compression));
        encoder.write_all(&hdr)?;
        encoder.write_all(payload)?;
        tmp.write_all(&encoder.finish()?)?;

        let name = final_path
            .file_name()
            .expect("object file name")
            .to_string_lossy()
            .into_owned();
        tmp.persist(&name)?;

        Ok(oid)
    }
}
