use std::path::PathBuf;

use anyhow::{anyhow, Result};
use bstr::{BString, ByteVec};
use clap::Args;
use grit_diff::tree::PathFilter;
use grit_merge::{MergeInputs, Resolve};
use grit_repository::{PendingType, RepoError};

use super::open_repo;
use crate::write_commit::{
    self, current_author, print_commit, read_message, write_commit, CONFLICT_MESSAGE,
};
use crate::Cli;

#[derive(Args)]
pub struct MergeArgs {
    /// Commit message
    #[arg(short, long)]
    message: Option<String>,

    /// Read the message from a file
    #[arg(short = 'F', long = "file")]
    file: Option<PathBuf>,

    /// Conclude the merge after resolving conflicts
    #[arg(long = "continue", conflicts_with = "abort")]
    continue_: bool,

    /// Abort the merge and restore the pre-merge state
    #[arg(long)]
    abort: bool,

    /// Branch or revision to merge
    revision: Option<String>,
}

pub fn run(args: &MergeArgs, cli: &Cli) -> Result<i32> {
    let mut repo = open_repo(cli)?;

    if args.continue_ {
        return handle_continue(&mut repo);
    }
    if args.abort {
        return handle_abort(&mut repo);
    }

    if repo.pending_commit().in_progress() {
        eprintln!("error: Merging is not possible because you have unmerged files.");
        eprintln!("{CONFLICT_MESSAGE}");
        return Ok(128);
    }

    let revision = args
        .revision
        .as_deref()
        .ok_or_else(|| anyhow!("no revision given to merge"))?;

    let inputs = match MergeInputs::resolve(&repo, "HEAD", revision) {
        Ok(inputs) => inputs,
        Err(grit_merge::MergeError::Revision(
            grit_revwalk::RevisionError::InvalidObject(expr),
        )) => {
            eprintln!("fatal: Not a valid object name: '{expr}'.");
            return Ok(128);
        }
        Err(e) => return Err(e.into()),
    };

    repo.refs.update_ref(grit_ref::ORIG_HEAD, &inputs.left_oid)?;

    if inputs.already_merged() {
        println!("Already up to date.");
        return Ok(0);
    }
    if inputs.fast_forward() {
        return handle_fast_forward(&mut repo, &inputs);
    }

    repo.pending_commit()
        .start(&inputs.right_oid, PendingType::Merge)?;

    let message = read_message(&args.message, &args.file)?
        .unwrap_or_else(|| default_message(&inputs));
    repo.pending_commit().set_merge_message(&message)?;

    // Resolve into workspace and index.
    repo.index.load_for_update()?;
    let mut resolve = Resolve::new(&mut repo, &inputs);
    resolve.execute().map_err(|e| anyhow!("{e}"))?;
    for line in resolve.log.clone() {
        println!("{line}");
    }
    repo.index.write_updates()?;

    if repo.index.is_conflict() {
        println!("Automatic merge failed; fix conflicts and then commit the result.");
        return Ok(1);
    }

    // Clean merge: commit right away.
    let head = repo.refs.read_head()?.expect("merge from existing HEAD");
    let author = current_author(&repo)?;
    let (oid, commit) = write_commit(
        &mut repo,
        vec![head, inputs.right_oid],
        author.clone(),
        author,
        message.as_ref(),
    )?;
    repo.pending_commit().clear(PendingType::Merge)?;
    print_commit(&repo, &oid, &commit)?;
    Ok(0)
}

fn default_message(inputs: &MergeInputs) -> BString {
    let mut message = BString::from(format!("Merge commit '{}'", inputs.right_name));
    message.push_str("\n");
    message
}

fn handle_fast_forward(
    repo: &mut grit_repository::Repository,
    inputs: &MergeInputs,
) -> Result<i32> {
    println!(
        "Updating {}..{}",
        repo.database.short_oid(&inputs.left_oid),
        repo.database.short_oid(&inputs.right_oid)
    );
    println!("Fast-forward");

    repo.index.load_for_update()?;
    let diff = repo.tree_diff(
        Some(inputs.left_oid),
        Some(inputs.right_oid),
        &PathFilter::any(),
    )?;
    repo.migration(diff)
        .apply_changes()
        .map_err(|e| anyhow!("{e}"))?;
    repo.index.write_updates()?;
    repo.refs.update_head(&inputs.right_oid)?;
    Ok(0)
}

fn handle_continue(repo: &mut grit_repository::Repository) -> Result<i32> {
    repo.index.load()?;
    match repo.pending_commit().merge_type() {
        Some(PendingType::Merge) => match write_commit::resume_merge(repo, PendingType::Merge) {
            Ok(code) => Ok(code),
            Err(e) => {
                eprintln!("fatal: {e}");
                Ok(128)
            }
        },
        _ => {
            eprintln!("fatal: There is no merge in progress (MERGE_HEAD missing).");
            Ok(128)
        }
    }
}

fn handle_abort(repo: &mut grit_repository::Repository) -> Result<i32> {
    match repo.pending_commit().clear(PendingType::Merge) {
        Ok(()) => {}
        Err(RepoError::PendingCommit(message)) => {
            eprintln!("fatal: {message}");
            return Ok(128);
        }
        Err(e) => return Err(e.into()),
    }

    repo.index.load_for_update()?;
    let head = repo.refs.read_head()?;
    if let Some(head) = head {
        repo.hard_reset(head)?;
    }
    repo.index.write_updates()?;
    Ok(0)
}
