use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Result};
use clap::Args;
use grit_hash::ObjectId;
use grit_protocol::client::{format_ref_update, recv_references};
use grit_protocol::{objects, Protocol};
use grit_repository::refspec::Refspec;
use grit_repository::remotes::DEFAULT_REMOTE;
use grit_revwalk::{fast_forward_error, RevList, RevListOptions};

use super::open_repo;
use crate::Cli;

const UPLOAD_PACK: &str = "grit upload-pack";

#[derive(Args)]
pub struct FetchArgs {
    /// Update refs even when they do not fast-forward
    #[arg(short, long)]
    force: bool,

    /// Program to run on the remote side
    #[arg(long = "upload-pack")]
    uploader: Option<String>,

    /// Remote name or URL, then optional refspecs
    args: Vec<String>,
}

pub fn run(args: &FetchArgs, cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;

    // Pick the remote, its URL, and the specs to fetch.
    let name = args
        .args
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_REMOTE.to_string());
    let remotes = repo.remotes();
    let remote = remotes.get(&name);

    let fetch_url = remote
        .as_ref()
        .and_then(|r| r.fetch_url())
        .or_else(|| args.args.first().cloned())
        .ok_or_else(|| anyhow!("no remote or url to fetch from"))?;
    let uploader = args
        .uploader
        .clone()
        .or_else(|| remote.as_ref().and_then(|r| r.uploader()))
        .unwrap_or_else(|| UPLOAD_PACK.to_string());
    let fetch_specs: Vec<String> = if args.args.len() > 1 {
        args.args[1..].to_vec()
    } else {
        remote.as_ref().map(|r| r.fetch_specs()).unwrap_or_default()
    };

    let connection = grit_transport::start_agent(&uploader, &fetch_url)?;
    let mut child = connection.child;
    let mut conn = Protocol::new("fetch", connection.input, connection.output, &[]);

    let remote_refs = recv_references(&mut conn)?;

    // Decide what we want.
    let remote_ref_names: Vec<String> = remote_refs.keys().cloned().collect();
    let targets = Refspec::expand(&fetch_specs, &remote_ref_names);

    let mut local_refs: BTreeMap<String, Option<ObjectId>> = BTreeMap::new();
    let mut wanted: BTreeSet<ObjectId> = BTreeSet::new();

    for (target, (source, _)) in &targets {
        let Some(remote_oid) = remote_refs.get(source) else {
            continue;
        };
        let local_oid = repo.refs.read_ref(target)?;
        if local_oid == Some(*remote_oid) {
            continue;
        }
        local_refs.insert(target.clone(), local_oid);
        wanted.insert(*remote_oid);
    }

    for oid in &wanted {
        conn.send_packet(Some(format!("want {}", oid.to_hex()).as_bytes()))?;
    }
    conn.send_packet(None)?;

    if wanted.is_empty() {
        drop(conn);
        let _ = child.wait();
        return Ok(0);
    }

    // Advertise what we already have, then take the pack.
    let options = RevListOptions {
        walk: true,
        objects: false,
        missing: true,
        all: true,
    };
    let mut rev_list = RevList::new(&repo, &[], options)?;
    while let Some(item) = rev_list.next_item()? {
        conn.send_packet(Some(format!("have {}", item.oid.to_hex()).as_bytes()))?;
    }
    conn.send_packet(Some(b"done"))?;

    conn.recv_until(Some(grit_pack::SIGNATURE.as_slice()))?;

    let unpack_limit = repo
        .config
        .get_int(&["fetch", "unpackLimit"])
        .map(|n| n as u32);
    objects::recv_packed_objects(&repo, &mut conn.input, grit_pack::SIGNATURE, unpack_limit)?;

    // Move the tracking refs.
    eprintln!("From {fetch_url}");

    let mut errors = false;
    for (target, old_oid) in &local_refs {
        let (source, forced) = &targets[target];
        let new_oid = remote_refs[source];

        let ff_error = fast_forward_error(&repo.database, *old_oid, Some(new_oid))?;

        let error = if args.force || *forced || ff_error.is_none() {
            repo.refs.update_ref(target, &new_oid)?;
            None
        } else {
            errors = true;
            ff_error
        };

        let source_short = repo.refs.short_name(source);
        let target_short = repo.refs.short_name(target);
        if let Some(line) = format_ref_update(
            (Some(&source_short), Some(&target_short)),
            error,
            *old_oid,
            Some(new_oid),
            ff_error.is_none(),
        ) {
            eprintln!("{line}");
        }
    }

    drop(conn);
    let _ = child.wait();

    Ok(if errors { 1 } else { 0 })
}
