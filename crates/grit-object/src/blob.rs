use bstr::BString;

/// Opaque file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: BString,
}

impl Blob {
    pub fn new(data: impl Into<BString>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hash_payload, ObjectType};

    #[test]
    fn blob_identity_matches_git() {
        let blob = Blob::new("hello");
        assert_eq!(
            hash_payload(ObjectType::Blob, &blob.data).to_hex(),
            "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0"
        );
    }
}
