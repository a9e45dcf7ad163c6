//! The wire protocol.
//!
//! Both fetch and push speak pkt-line framing with capabilities attached
//! to the first payload in each direction, then stream a pack. The
//! capability subset in play here is `report-status`, `delete-refs`,
//! `ofs-delta`, and `no-thin`.

pub mod agent;
pub mod client;
pub mod objects;
pub mod protocol;

pub use protocol::Protocol;

pub const CAP_REPORT_STATUS: &str = "report-status";
pub const CAP_DELETE_REFS: &str = "delete-refs";
pub const CAP_OFS_DELTA: &str = "ofs-delta";
pub const CAP_NO_THIN: &str = "no-thin";

/// The all-zeros OID spelled out, denoting ref creation or deletion.
pub const ZERO_OID_HEX: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid pkt-line: {0}")]
    InvalidLine(String),

    #[error(transparent)]
    Walk(#[from] grit_revwalk::RevWalkError),

    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Pack(#[from] grit_pack::PackError),

    #[error(transparent)]
    Repo(#[from] grit_repository::RepoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
