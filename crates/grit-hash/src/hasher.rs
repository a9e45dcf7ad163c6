use digest::Digest;
use sha1::Sha1;

use crate::ObjectId;

/// Incremental SHA-1 hasher producing an [`ObjectId`].
#[derive(Clone)]
pub struct Hasher {
    inner: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> ObjectId {
        let digest = self.inner.finalize();
        let mut raw = [0u8; crate::DIGEST_LEN];
        raw.copy_from_slice(&digest);
        ObjectId::from_raw(raw)
    }

    /// Hash a complete buffer in one call.
    pub fn digest(data: &[u8]) -> ObjectId {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}
