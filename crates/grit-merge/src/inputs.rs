//! Merge inputs: the two sides by name and OID plus their common bases.

use grit_hash::ObjectId;
use grit_repository::Repository;
use grit_revwalk::{Bases, Revision};

use crate::MergeError;

#[derive(Debug, Clone)]
pub struct MergeInputs {
    pub left_name: String,
    pub right_name: String,
    pub left_oid: ObjectId,
    pub right_oid: ObjectId,
    pub base_oids: Vec<ObjectId>,
}

impl MergeInputs {
    /// Resolve both sides as commits and find their best common ancestors.
    pub fn resolve(
        repo: &Repository,
        left_name: &str,
        right_name: &str,
    ) -> Result<Self, MergeError> {
        let left_oid = Revision::new(repo, left_name).resolve_commit()?;
        let right_oid = Revision::new(repo, right_name).resolve_commit()?;

        let base_oids = Bases::new(&repo.database, left_oid, right_oid)?.find()?;

        Ok(Self {
            left_name: left_name.to_string(),
            right_name: right_name.to_string(),
            left_oid,
            right_oid,
            base_oids,
        })
    }

    /// Inputs with an explicitly chosen base, as cherry-pick and revert use.
    pub fn pick(
        left_name: impl Into<String>,
        right_name: impl Into<String>,
        left_oid: ObjectId,
        right_oid: ObjectId,
        base_oids: Vec<ObjectId>,
    ) -> Self {
        Self {
            left_name: left_name.into(),
            right_name: right_name.into(),
            left_oid,
            right_oid,
            base_oids,
        }
    }

    /// The right side is already contained in the left.
    pub fn already_merged(&self) -> bool {
        self.base_oids == [self.right_oid]
    }

    /// The left side is an ancestor of the right: no merge commit needed.
    pub fn fast_forward(&self) -> bool {
        self.base_oids == [self.left_oid]
    }
}
