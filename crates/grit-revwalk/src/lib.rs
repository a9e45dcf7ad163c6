//! Revision queries over the commit graph: parsing revision expressions,
//! the date-ordered reachability walk that feeds log and pack generation,
//! and common-ancestor discovery for merges and fast-forward tests.

pub mod merge_base;
pub mod revision;
pub mod walk;

pub use merge_base::{fast_forward_error, is_fast_forward, Bases, CommonAncestors};
pub use revision::{HintedError, Revision, RevisionError};
pub use walk::{RevList, RevListOptions};

#[derive(Debug, thiserror::Error)]
pub enum RevWalkError {
    #[error(transparent)]
    Revision(#[from] RevisionError),

    #[error(transparent)]
    Repo(#[from] grit_repository::RepoError),

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),
}
