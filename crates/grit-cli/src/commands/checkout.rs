use anyhow::Result;
use clap::Args;
use grit_diff::tree::PathFilter;
use grit_repository::{MigrationError, Repository};

use super::{open_repo, resolve_revision};
use crate::Cli;

const DETACHED_HEAD_MESSAGE: &str = "\
You are in 'detached HEAD' state. You can look around, make experimental
changes and commit them, and you can discard any commits you make in this
state without impacting any branches by performing another checkout.

If you want to create a new branch to retain commits you create, you may
do so (now or later) by using the branch command. Example:

    grit branch <new-branch-name>
";

#[derive(Args)]
pub struct CheckoutArgs {
    /// Branch or revision to check out
    target: String,
}

pub fn run(args: &CheckoutArgs, cli: &Cli) -> Result<i32> {
    let mut repo = open_repo(cli)?;

    let current_ref = repo.refs.current_ref()?;
    let current_oid = current_ref.read_oid(&repo.refs)?;

    let target_oid = match resolve_revision(&repo, &args.target, 1)? {
        Ok(oid) => oid,
        Err(code) => return Ok(code),
    };

    repo.index.load_for_update()?;

    let diff = repo.tree_diff(current_oid, Some(target_oid), &PathFilter::any())?;
    let mut migration = repo.migration(diff);
    match migration.apply_changes() {
        Ok(()) => {}
        Err(MigrationError::Conflict { errors }) => {
            repo.index.release_lock()?;
            for block in errors {
                eprintln!("error: {block}");
            }
            eprintln!("Aborting");
            return Ok(1);
        }
        Err(MigrationError::Repo(e)) => return Err(e.into()),
    }

    repo.index.write_updates()?;
    repo.refs.set_head(&args.target, &target_oid)?;
    let new_ref = repo.refs.current_ref()?;

    // Progress summary on stderr, matching the reference porcelain.
    if current_ref.is_head() && current_oid != Some(target_oid) {
        if let Some(oid) = current_oid {
            print_head_position(&repo, "Previous HEAD position was", &oid)?;
        }
    }

    if new_ref.is_head() && !current_ref.is_head() {
        eprintln!("Note: checking out '{}'.\n", args.target);
        eprintln!("{DETACHED_HEAD_MESSAGE}");
    }

    if new_ref.is_head() {
        print_head_position(&repo, "HEAD is now at", &target_oid)?;
    } else if new_ref == current_ref {
        eprintln!("Already on '{}'", args.target);
    } else {
        eprintln!("Switched to branch '{}'", args.target);
    }

    Ok(0)
}

fn print_head_position(repo: &Repository, message: &str, oid: &grit_hash::ObjectId) -> Result<()> {
    let commit = repo.database.load_commit(oid)?;
    eprintln!(
        "{message} {} {}",
        repo.database.short_oid(oid),
        commit.title_line()
    );
    Ok(())
}
