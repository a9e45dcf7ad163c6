use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Args;
use grit_hash::ObjectId;
use grit_protocol::{
    agent, objects, Protocol, CAP_DELETE_REFS, CAP_NO_THIN, CAP_OFS_DELTA, CAP_REPORT_STATUS,
};
use grit_repository::Repository;
use grit_revwalk::fast_forward_error;

use crate::Cli;

#[derive(Args)]
pub struct ReceivePackArgs {
    /// Repository to receive into
    directory: PathBuf,
}

type Request = (Option<ObjectId>, Option<ObjectId>);

pub fn run(args: &ReceivePackArgs, _cli: &Cli) -> Result<i32> {
    let git_dir = agent::detect_git_dir(&args.directory).ok_or_else(|| {
        anyhow!(
            "'{}' does not appear to be a grit repository",
            args.directory.display()
        )
    })?;
    let repo = Repository::new(git_dir);

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut conn = Protocol::new(
        "receive-pack",
        stdin.lock(),
        stdout.lock(),
        &[CAP_NO_THIN, CAP_REPORT_STATUS, CAP_DELETE_REFS, CAP_OFS_DELTA],
    );

    agent::send_references(&repo, &mut conn)?;

    // Update commands: "<old> <new> <ref>" until flush.
    let mut requests: BTreeMap<String, Request> = BTreeMap::new();
    for line in conn.recv_until(None)? {
        let text = String::from_utf8_lossy(&line).into_owned();
        let mut parts = text.split_whitespace();
        let (Some(old), Some(new), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        requests.insert(name.to_string(), (zero_to_none(old), zero_to_none(new)));
    }

    // The pack follows raw (no pkt framing) whenever anything is created
    // or updated.
    let mut unpack_error: Option<String> = None;
    if requests.iter().any(|(_, (_, new))| new.is_some()) {
        let unpack_limit = repo
            .config
            .get_int(&["receive", "unpackLimit"])
            .map(|n| n as u32);
        if let Err(e) = objects::recv_packed_objects(&repo, &mut conn.input, b"", unpack_limit) {
            unpack_error = Some(e.to_string());
        }
    }

    report_status(
        &mut conn,
        Some(&match &unpack_error {
            None => "unpack ok".to_string(),
            Some(e) => format!("unpack {e}"),
        }),
    )?;

    for (name, (old, new)) in &requests {
        if unpack_error.is_some() {
            report_status(&mut conn, Some(&format!("ng {name} unpacker error")))?;
            continue;
        }

        match validate_update(&repo, name, *old, *new)? {
            Some(reason) => report_status(&mut conn, Some(&format!("ng {name} {reason}")))?,
            None => match repo.refs.compare_and_swap(name, *old, *new) {
                Ok(()) => report_status(&mut conn, Some(&format!("ok {name}")))?,
                Err(e) => report_status(&mut conn, Some(&format!("ng {name} {e}")))?,
            },
        }
    }

    report_status_flush(&mut conn)?;
    Ok(0)
}

fn zero_to_none(hex: &str) -> Option<ObjectId> {
    ObjectId::from_hex(hex).ok().filter(|oid| !oid.is_zero())
}

fn report_status<R: std::io::Read, W: std::io::Write>(
    conn: &mut Protocol<R, W>,
    line: Option<&str>,
) -> Result<()> {
    if conn.capable(CAP_REPORT_STATUS) {
        conn.send_packet(line.map(|l| l.as_bytes()))?;
    }
    Ok(())
}

fn report_status_flush<R: std::io::Read, W: std::io::Write>(
    conn: &mut Protocol<R, W>,
) -> Result<()> {
    report_status(conn, None)
}

/// The receive.* policy checks. Returns a rejection reason, or `None` to
/// proceed.
fn validate_update(
    repo: &Repository,
    name: &str,
    old: Option<ObjectId>,
    new: Option<ObjectId>,
) -> Result<Option<&'static str>> {
    if repo.config.get_bool(&["receive", "denyDeletes"]).unwrap_or(false) && new.is_none() {
        return Ok(Some("deletion prohibited"));
    }

    if repo
        .config
        .get_bool(&["receive", "denyNonFastForwards"])
        .unwrap_or(false)
        && fast_forward_error(&repo.database, old, new)?.is_some()
    {
        return Ok(Some("non-fast-forward"));
    }

    // The current-branch rules only bind non-bare repositories.
    let bare = repo.config.get_bool(&["core", "bare"]).unwrap_or(true);
    let current = repo.refs.current_ref()?;
    if bare || current.path != name {
        return Ok(None);
    }

    // Unset means deny; pushing into the checked-out branch silently
    // desynchronizes the workspace.
    if repo
        .config
        .get_bool(&["receive", "denyCurrentBranch"])
        .unwrap_or(true)
        && new.is_some()
    {
        return Ok(Some("branch is currently checked out"));
    }

    if repo
        .config
        .get_bool(&["receive", "denyDeleteCurrent"])
        .unwrap_or(true)
        && new.is_none()
    {
        return Ok(Some("deletion of the current branch prohibited"));
    }

    Ok(None)
}
