use std::collections::BTreeMap;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use clap::Args;
use grit_hash::ObjectId;
use grit_protocol::client::{format_ref_update, recv_references};
use grit_protocol::{objects, Protocol, CAP_DELETE_REFS, CAP_OFS_DELTA, CAP_REPORT_STATUS, ZERO_OID_HEX};
use grit_repository::refspec::Refspec;
use grit_repository::remotes::DEFAULT_REMOTE;
use grit_repository::Repository;
use grit_revwalk::{fast_forward_error, Revision};
use regex::bytes::Regex;

use super::open_repo;
use crate::Cli;

const RECEIVE_PACK: &str = "grit receive-pack";

/// One accepted ref update.
struct Update {
    source: Option<String>,
    ff_error: Option<&'static str>,
    old_oid: Option<ObjectId>,
    new_oid: Option<ObjectId>,
}

fn unpack_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^unpack (.+)$").unwrap())
}

fn update_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(ok|ng) (\S+)(.*)$").unwrap())
}

#[derive(Args)]
pub struct PushArgs {
    /// Push even when the update is not a fast-forward
    #[arg(short, long)]
    force: bool,

    /// Program to run on the remote side
    #[arg(long = "receive-pack")]
    receiver: Option<String>,

    /// Remote name or URL, then optional refspecs
    args: Vec<String>,
}

pub fn run(args: &PushArgs, cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;

    // Remote selection falls back to the current branch's configuration.
    let current_branch = repo.refs.current_ref()?.short_name(&repo.refs);
    let branch_remote = repo.config.get_str(&["branch", &current_branch, "remote"]);
    let branch_merge = repo.config.get_str(&["branch", &current_branch, "merge"]);

    let name = args
        .args
        .first()
        .cloned()
        .or(branch_remote)
        .unwrap_or_else(|| DEFAULT_REMOTE.to_string());
    let remotes = repo.remotes();
    let remote = remotes.get(&name);

    let push_url = remote
        .as_ref()
        .and_then(|r| r.push_url())
        .or_else(|| args.args.first().cloned())
        .ok_or_else(|| anyhow!("no remote or url to push to"))?;
    let fetch_specs = remote.as_ref().map(|r| r.fetch_specs()).unwrap_or_default();
    let receiver = args
        .receiver
        .clone()
        .or_else(|| remote.as_ref().and_then(|r| r.receiver()))
        .unwrap_or_else(|| RECEIVE_PACK.to_string());

    let push_specs: Vec<String> = if args.args.len() > 1 {
        args.args[1..].to_vec()
    } else if let Some(merge) = branch_merge {
        vec![Refspec::new(current_branch.clone(), merge, false).to_string()]
    } else {
        remote.as_ref().map(|r| r.push_specs()).unwrap_or_default()
    };

    if push_specs.is_empty() {
        eprintln!("fatal: The current branch {current_branch} has no upstream branch.");
        return Ok(128);
    }

    let connection = grit_transport::start_agent(&receiver, &push_url)?;
    let mut child = connection.child;
    let mut conn = Protocol::new(
        "push",
        connection.input,
        connection.output,
        &[CAP_REPORT_STATUS],
    );

    let remote_refs = recv_references(&mut conn)?;

    // Choose updates.
    let local_ref_names: Vec<String> = {
        let mut names: Vec<String> = repo
            .refs
            .list_all_refs()?
            .into_iter()
            .map(|r| r.path)
            .collect();
        names.sort();
        names
    };
    let targets = Refspec::expand(&push_specs, &local_ref_names);

    let mut updates: BTreeMap<String, Update> = BTreeMap::new();
    let mut errors: Vec<((Option<String>, String), String)> = Vec::new();

    for (target, (source, forced)) in &targets {
        if source.is_empty() {
            if conn.capable(CAP_DELETE_REFS) {
                updates.insert(
                    target.clone(),
                    Update {
                        source: None,
                        ff_error: None,
                        old_oid: remote_refs.get(target).copied(),
                        new_oid: None,
                    },
                );
            } else {
                errors.push((
                    (None, target.clone()),
                    "remote does not support deleting refs".to_string(),
                ));
            }
            continue;
        }

        let old_oid = remote_refs.get(target).copied();
        let new_oid = Revision::new(&repo, source).resolve_commit()?;
        if old_oid == Some(new_oid) {
            continue;
        }

        let ff_error = fast_forward_error(&repo.database, old_oid, Some(new_oid))?;

        if args.force || *forced || ff_error.is_none() {
            updates.insert(
                target.clone(),
                Update {
                    source: Some(source.clone()),
                    ff_error,
                    old_oid,
                    new_oid: Some(new_oid),
                },
            );
        } else {
            errors.push((
                (Some(source.clone()), target.clone()),
                ff_error.unwrap_or("rejected").to_string(),
            ));
        }
    }

    // Send the update commands, then the objects they need.
    for (target, update) in &updates {
        let old = update
            .old_oid
            .map(|oid| oid.to_hex())
            .unwrap_or_else(|| ZERO_OID_HEX.to_string());
        let new = update
            .new_oid
            .map(|oid| oid.to_hex())
            .unwrap_or_else(|| ZERO_OID_HEX.to_string());
        conn.send_packet(Some(format!("{old} {new} {target}").as_bytes()))?;
    }
    conn.send_packet(None)?;

    let new_oids: Vec<String> = updates
        .values()
        .filter_map(|u| u.new_oid.map(|oid| oid.to_hex()))
        .collect();
    if !new_oids.is_empty() {
        let mut revs = new_oids;
        for oid in remote_refs.values() {
            revs.push(format!("^{}", oid.to_hex()));
        }
        let allow_ofs = conn.capable(CAP_OFS_DELTA);
        objects::send_packed_objects(&repo, &mut conn.output, &revs, allow_ofs)?;
    }

    // Summary, then the remote's verdict.
    if updates.is_empty() && errors.is_empty() {
        eprintln!("Everything up-to-date");
    } else {
        eprintln!("To {push_url}");
        for ((source, target), reason) in &errors {
            let source_short = source.as_ref().map(|s| repo.refs.short_name(s));
            let target_short = repo.refs.short_name(target);
            if let Some(line) = format_ref_update(
                (source_short.as_deref(), Some(&target_short)),
                Some(reason),
                None,
                None,
                false,
            ) {
                eprintln!("{line}");
            }
        }
    }

    let mut failed = !errors.is_empty();
    if conn.capable(CAP_REPORT_STATUS) && !updates.is_empty() {
        failed |= recv_report_status(&repo, &mut conn, &updates, &fetch_specs)?;
    }

    drop(conn);
    let _ = child.wait();

    Ok(if failed { 1 } else { 0 })
}

/// Read `unpack …` then per-ref `ok`/`ng` lines, reporting each and moving
/// tracking refs for accepted updates.
fn recv_report_status(
    repo: &Repository,
    conn: &mut Protocol<std::process::ChildStdout, std::process::ChildStdin>,
    updates: &BTreeMap<String, Update>,
    fetch_specs: &[String],
) -> Result<bool> {
    let mut failed = false;

    if let Some(line) = conn.recv_packet()? {
        if let Some(caps) = unpack_line().captures(&line) {
            let result = caps.get(1).unwrap().as_bytes();
            if result != b"ok" {
                eprintln!(
                    "error: remote unpack failed: {}",
                    String::from_utf8_lossy(result)
                );
                failed = true;
            }
        } else {
            failed |= handle_status(repo, updates, fetch_specs, &line)?;
        }
    }

    loop {
        match conn.recv_packet()? {
            None => break,
            Some(line) => failed |= handle_status(repo, updates, fetch_specs, &line)?,
        }
    }

    Ok(failed)
}

fn handle_status(
    repo: &Repository,
    updates: &BTreeMap<String, Update>,
    fetch_specs: &[String],
    line: &[u8],
) -> Result<bool> {
    let Some(caps) = update_line().captures(line) else {
        return Ok(false);
    };

    let status = caps.get(1).unwrap().as_bytes();
    let target = String::from_utf8_lossy(caps.get(2).unwrap().as_bytes()).into_owned();
    let reason = String::from_utf8_lossy(caps.get(3).unwrap().as_bytes())
        .trim()
        .to_string();

    let error = (status == b"ng").then_some(reason);

    let Some(update) = updates.get(&target) else {
        return Ok(error.is_some());
    };

    let source_short = update.source.as_ref().map(|s| repo.refs.short_name(s));
    let target_short = repo.refs.short_name(&target);
    if let Some(line) = format_ref_update(
        (source_short.as_deref(), Some(&target_short)),
        error.as_deref(),
        update.old_oid,
        update.new_oid,
        update.ff_error.is_none(),
    ) {
        eprintln!("{line}");
    }

    // Successful updates also move our remote-tracking refs.
    if error.is_none() {
        let mapped = Refspec::expand(fetch_specs, std::slice::from_ref(&target));
        for local_ref in mapped.keys() {
            match update.new_oid {
                Some(new_oid) => repo.refs.update_ref(local_ref, &new_oid)?,
                None => repo.refs.delete_ref(local_ref)?,
            }
        }
    }

    Ok(error.is_some())
}
