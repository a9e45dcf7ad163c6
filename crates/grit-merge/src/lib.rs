//! The merge engine: three-way tree resolution with conflict typing, and
//! the sequencer that drives multi-commit cherry-pick and revert.

pub mod inputs;
pub mod resolve;
pub mod sequencer;

pub use inputs::MergeInputs;
pub use resolve::Resolve;
pub use sequencer::{Sequencer, SequencerAction};

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error(transparent)]
    Revision(#[from] grit_revwalk::RevisionError),

    #[error(transparent)]
    Repo(#[from] grit_repository::RepoError),

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Migration(#[from] grit_repository::MigrationError),

    #[error("{0}")]
    Sequencer(String),
}
