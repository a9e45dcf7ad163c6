use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use clap::Args;
use grit_protocol::{agent, objects, Protocol};
use grit_repository::Repository;
use regex::bytes::Regex;

use crate::Cli;

fn want_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^want ([0-9a-f]{40})$").unwrap())
}

fn have_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^have ([0-9a-f]{40})$").unwrap())
}

#[derive(Args)]
pub struct UploadPackArgs {
    /// Repository to serve
    directory: PathBuf,
}

pub fn run(args: &UploadPackArgs, _cli: &Cli) -> Result<i32> {
    let git_dir = agent::detect_git_dir(&args.directory)
        .ok_or_else(|| anyhow!("'{}' does not appear to be a grit repository", args.directory.display()))?;
    let repo = Repository::new(git_dir);

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut conn = Protocol::new("upload-pack", stdin.lock(), stdout.lock(), &[]);

    agent::send_references(&repo, &mut conn)?;

    // want list, then have list terminated by "done".
    let mut wanted: BTreeSet<String> = BTreeSet::new();
    for line in conn.recv_until(None)? {
        if let Some(caps) = want_line().captures(&line) {
            wanted.insert(String::from_utf8_lossy(caps.get(1).unwrap().as_bytes()).into_owned());
        }
    }
    if wanted.is_empty() {
        return Ok(0);
    }

    let mut remote_has: BTreeSet<String> = BTreeSet::new();
    for line in conn.recv_until(Some(b"done"))? {
        if let Some(caps) = have_line().captures(&line) {
            remote_has
                .insert(String::from_utf8_lossy(caps.get(1).unwrap().as_bytes()).into_owned());
        }
    }
    conn.send_packet(Some(b"NAK"))?;

    let mut revs: Vec<String> = wanted.into_iter().collect();
    revs.extend(remote_has.into_iter().map(|oid| format!("^{oid}")));

    objects::send_packed_objects(&repo, &mut conn.output, &revs, false)?;
    Ok(0)
}
