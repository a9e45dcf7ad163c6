//! Git object model: the three storable shapes (blob, tree, commit), their
//! canonical serialization, and the `<type> SP <size> NUL` header that makes
//! an object's identity.

pub mod blob;
pub mod commit;
pub mod header;
pub mod tree;

use bstr::BString;
use grit_hash::{Hasher, ObjectId};

pub use blob::Blob;
pub use commit::Commit;
pub use tree::{FileMode, Tree, TreeEntry};

#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid object header: {0}")]
    InvalidHeader(String),

    #[error("unknown object type: {0}")]
    UnknownType(String),

    #[error("invalid file mode: {0}")]
    InvalidFileMode(String),

    #[error("invalid tree entry: {0}")]
    InvalidTree(String),

    #[error("commit is missing required field: {field}")]
    MissingCommitField { field: &'static str },

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error(transparent)]
    Hash(#[from] grit_hash::HashError),
}

/// The kind of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }

    pub fn from_bytes(name: &[u8]) -> Result<Self, ObjectError> {
        match name {
            b"blob" => Ok(Self::Blob),
            b"tree" => Ok(Self::Tree),
            b"commit" => Ok(Self::Commit),
            other => Err(ObjectError::UnknownType(
                String::from_utf8_lossy(other).into(),
            )),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed object of any kind.
///
/// Tagged variant rather than a trait hierarchy: the object store handles
/// exactly these three shapes and every caller matches on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
}

impl Object {
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Blob(_) => ObjectType::Blob,
            Self::Tree(_) => ObjectType::Tree,
            Self::Commit(_) => ObjectType::Commit,
        }
    }

    /// Parse an object's payload (no header) for a known type.
    pub fn parse(ty: ObjectType, payload: &[u8]) -> Result<Self, ObjectError> {
        match ty {
            ObjectType::Blob => Ok(Self::Blob(Blob::new(BString::from(payload)))),
            ObjectType::Tree => Ok(Self::Tree(Tree::parse(payload)?)),
            ObjectType::Commit => Ok(Self::Commit(Commit::parse(payload)?)),
        }
    }

    /// Serialize the payload (no header).
    pub fn serialize_content(&self) -> Vec<u8> {
        match self {
            Self::Blob(blob) => blob.data.to_vec(),
            Self::Tree(tree) => tree.serialize_content(),
            Self::Commit(commit) => commit.serialize_content(),
        }
    }

    /// The OID this object would have when stored.
    pub fn oid(&self) -> ObjectId {
        let content = self.serialize_content();
        hash_payload(self.object_type(), &content)
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Self::Commit(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Self::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }
}

/// Hash `<type> SP <size> NUL <payload>` without storing anything.
pub fn hash_payload(ty: ObjectType, payload: &[u8]) -> ObjectId {
    let mut hasher = Hasher::new();
    hasher.update(&header::write_header(ty, payload.len()));
    hasher.update(payload);
    hasher.finalize()
}
