//! Pack exchange over an established connection.

use std::io::{Read, Write};

use bstr::BString;
use grit_hash::ObjectId;
use grit_odb::recv::receive_packed_objects;
use grit_pack::stream::Stream;
use grit_pack::writer::{Writer, DEFAULT_COMPRESSION};
use grit_repository::Repository;
use grit_revwalk::{RevList, RevListOptions};

use crate::ProtocolError;

/// Walk `revs` (with `^exclusions`) and stream the reachable objects as a
/// pack into `output`.
pub fn send_packed_objects<W: Write>(
    repo: &Repository,
    output: W,
    revs: &[String],
    allow_ofs: bool,
) -> Result<(), ProtocolError> {
    let options = RevListOptions {
        walk: true,
        objects: true,
        missing: true,
        all: false,
    };
    let mut rev_list = RevList::new(repo, revs, options)?;
    let items = rev_list.collect_items()?;
    let objects: Vec<(ObjectId, Option<BString>)> =
        items.into_iter().map(|item| (item.oid, item.path)).collect();

    let compression = repo
        .config
        .get_int(&["pack", "compression"])
        .or_else(|| repo.config.get_int(&["core", "compression"]))
        .filter(|level| (0..=9).contains(level))
        .map(|level| level as u32)
        .unwrap_or(DEFAULT_COMPRESSION);

    let mut writer = Writer::new(output, compression, allow_ofs);
    writer.write_objects(&objects, &repo.database)?;
    Ok(())
}

/// Receive one pack from `input` into the object database. `prefix` holds
/// bytes of the pack already consumed by pkt-line framing (the signature).
pub fn recv_packed_objects<R: Read>(
    repo: &Repository,
    input: R,
    prefix: &[u8],
    unpack_limit: Option<u32>,
) -> Result<(), ProtocolError> {
    let stream = Stream::with_prefix(input, prefix);
    receive_packed_objects(&repo.database, stream, unpack_limit)?;
    Ok(())
}
