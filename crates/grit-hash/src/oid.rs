use std::fmt;
use std::str::FromStr;

use crate::{hex, HashError, DIGEST_LEN, HEX_LEN};

/// A git object identifier: the SHA-1 of an object's canonical serialization.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; DIGEST_LEN]);

impl ObjectId {
    /// The all-zeros OID used on the wire for ref creation and deletion.
    pub const ZERO: Self = Self([0u8; DIGEST_LEN]);

    pub fn from_raw(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != DIGEST_LEN {
            return Err(HashError::InvalidLength {
                expected: DIGEST_LEN,
                actual: bytes.len(),
            });
        }
        let mut raw = [0u8; DIGEST_LEN];
        raw.copy_from_slice(bytes);
        Ok(Self(raw))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, HashError> {
        if hex_str.len() != HEX_LEN {
            return Err(HashError::InvalidLength {
                expected: HEX_LEN,
                actual: hex_str.len(),
            });
        }
        let mut raw = [0u8; DIGEST_LEN];
        hex::decode(hex_str, &mut raw)?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// The abbreviated form used in user-facing output.
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// First byte, for fan-out table indexing.
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// The loose object path component: `"xy/xxxx…"`.
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    #[test]
    fn hex_roundtrip() {
        let oid = ObjectId::from_hex(SAMPLE).unwrap();
        assert_eq!(oid.to_hex(), SAMPLE);
        let parsed: ObjectId = SAMPLE.parse().unwrap();
        assert_eq!(parsed, oid);
    }

    #[test]
    fn raw_bytes_roundtrip() {
        let oid = ObjectId::from_hex(SAMPLE).unwrap();
        let back = ObjectId::from_bytes(oid.as_bytes()).unwrap();
        assert_eq!(back, oid);
    }

    #[test]
    fn rejects_wrong_lengths() {
        assert!(ObjectId::from_hex("abcd").is_err());
        assert!(ObjectId::from_bytes(&[0u8; 19]).is_err());
    }

    #[test]
    fn zero_oid() {
        assert!(ObjectId::ZERO.is_zero());
        assert!(!ObjectId::from_hex(SAMPLE).unwrap().is_zero());
    }

    #[test]
    fn short_and_loose_path() {
        let oid = ObjectId::from_hex(SAMPLE).unwrap();
        assert_eq!(oid.short(), "da39a3e");
        assert_eq!(oid.loose_path(), format!("da/{}", &SAMPLE[2..]));
        assert_eq!(oid.first_byte(), 0xda);
    }

    #[test]
    fn usable_as_map_key() {
        let oid = ObjectId::from_hex(SAMPLE).unwrap();
        let mut map = HashMap::new();
        map.insert(oid, 1);
        assert_eq!(map.get(&oid), Some(&1));
    }

    #[test]
    fn ordering_is_bytewise() {
        let a = ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
        let b = ObjectId::from_hex("0000000000000000000000000000000000000002").unwrap();
        assert!(a < b);
    }
}
