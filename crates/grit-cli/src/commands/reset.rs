use anyhow::Result;
use bstr::{BStr, BString};
use clap::Args;
use grit_hash::ObjectId;
use grit_repository::Repository;
use grit_revwalk::Revision;

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct ResetArgs {
    /// Move HEAD only
    #[arg(long)]
    soft: bool,

    /// Move HEAD and reset the index (default)
    #[arg(long)]
    mixed: bool,

    /// Move HEAD and reset index and working tree
    #[arg(long)]
    hard: bool,

    /// Revision, then optional paths
    args: Vec<String>,
}

#[derive(PartialEq)]
enum Mode {
    Soft,
    Mixed,
    Hard,
}

pub fn run(args: &ResetArgs, cli: &Cli) -> Result<i32> {
    let mut repo = open_repo(cli)?;

    let mode = if args.soft {
        Mode::Soft
    } else if args.hard {
        Mode::Hard
    } else {
        Mode::Mixed
    };

    // The first argument is a revision if it resolves; everything else is
    // a path.
    let mut paths: Vec<String> = args.args.clone();
    let commit_oid = select_commit_oid(&repo, &mut paths)?;

    repo.index.load_for_update()?;

    match mode {
        Mode::Soft => {}
        Mode::Hard => {
            if let Some(oid) = commit_oid {
                repo.hard_reset(oid)?;
            }
        }
        Mode::Mixed => {
            if paths.is_empty() {
                repo.index.clear();
                reset_path(&mut repo, commit_oid, None)?;
            } else {
                for path in &paths {
                    reset_path(&mut repo, commit_oid, Some(BStr::new(path.as_bytes())))?;
                }
            }
        }
    }

    repo.index.write_updates()?;

    if paths.is_empty() {
        if let Some(oid) = commit_oid {
            let head_oid = repo.refs.update_head(&oid)?;
            if let Some(head_oid) = head_oid {
                repo.refs.update_ref(grit_ref::ORIG_HEAD, &head_oid)?;
            }
        }
    }

    Ok(0)
}

fn select_commit_oid(
    repo: &Repository,
    args: &mut Vec<String>,
) -> Result<Option<ObjectId>> {
    let revision = args.first().cloned().unwrap_or_else(|| "HEAD".to_string());
    match Revision::new(repo, &revision).resolve() {
        Ok(oid) => {
            if !args.is_empty() {
                args.remove(0);
            }
            Ok(Some(oid))
        }
        Err(grit_revwalk::RevisionError::InvalidObject(_)) => Ok(repo.refs.read_head()?),
        Err(e) => Err(e.into()),
    }
}

/// Re-point index entries at the given commit's content, under `path` or
/// for the whole tree.
fn reset_path(
    repo: &mut Repository,
    commit_oid: Option<ObjectId>,
    path: Option<&BStr>,
) -> Result<()> {
    let entry = repo.load_tree_entry(commit_oid, path)?;

    if let Some(path) = path {
        repo.index.remove(path);
    }

    let mut listing = std::collections::HashMap::new();
    if let Some(entry) = entry {
        collect_listing(repo, &mut listing, entry, path.map(BString::from))?;
    }

    for (item_path, item) in listing {
        repo.index.add_from_db(item_path.as_ref(), &item);
    }
    Ok(())
}

fn collect_listing(
    repo: &Repository,
    listing: &mut std::collections::HashMap<BString, grit_object::TreeEntry>,
    entry: grit_object::TreeEntry,
    prefix: Option<BString>,
) -> Result<()> {
    let prefix = prefix.unwrap_or_default();
    if !entry.is_tree() {
        listing.insert(prefix, entry);
        return Ok(());
    }
    let tree = repo.database.load_tree(&entry.oid)?;
    for (name, item) in &tree.entries {
        let path = grit_utils::path::join(prefix.as_ref(), name.as_ref());
        collect_listing(repo, listing, *item, Some(path))?;
    }
    Ok(())
}
