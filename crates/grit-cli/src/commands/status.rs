use anyhow::Result;
use clap::Args;
use grit_repository::status::{change_label, conflict_label};
use grit_repository::{PendingType, Repository, Status};

use super::open_repo;
use crate::Cli;

const LABEL_WIDTH: usize = 12;
const CONFLICT_LABEL_WIDTH: usize = 17;

#[derive(Args)]
pub struct StatusArgs {
    /// Machine-readable output
    #[arg(long)]
    porcelain: bool,
}

pub fn run(args: &StatusArgs, cli: &Cli) -> Result<i32> {
    let mut repo = open_repo(cli)?;

    repo.index.load_for_update()?;
    let status = repo.status(None)?;
    repo.index.write_updates()?;

    if args.porcelain {
        print_porcelain(&status);
    } else {
        print_long(&repo, &status)?;
    }
    Ok(0)
}

fn print_porcelain(status: &Status) {
    for path in &status.changed {
        println!("{} {}", status.porcelain_code(path.as_ref()), path);
    }
    for path in &status.untracked {
        println!("?? {path}");
    }
}

fn print_long(repo: &Repository, status: &Status) -> Result<()> {
    print_branch_status(repo)?;
    print_pending_commit_status(repo, status)?;

    if !status.index_changes.is_empty() {
        println!("Changes to be committed");
        println!();
        for (path, change) in &status.index_changes {
            println!("\t{:width$}{}", change_label(*change), path, width = LABEL_WIDTH);
        }
        println!();
    }

    if !status.conflicts.is_empty() {
        println!("Unmerged paths");
        println!();
        for (path, stages) in &status.conflicts {
            println!("\t{:width$}{}", conflict_label(stages), path, width = CONFLICT_LABEL_WIDTH);
        }
        println!();
    }

    if !status.workspace_changes.is_empty() {
        println!("Changes not staged for commit");
        println!();
        for (path, change) in &status.workspace_changes {
            println!("\t{:width$}{}", change_label(*change), path, width = LABEL_WIDTH);
        }
        println!();
    }

    if !status.untracked.is_empty() {
        println!("Untracked files");
        println!();
        for path in &status.untracked {
            println!("\t{path}");
        }
        println!();
    }

    print_commit_status(status);
    Ok(())
}

fn print_branch_status(repo: &Repository) -> Result<()> {
    let current = repo.refs.current_ref()?;
    if current.is_head() {
        println!("Not currently on any branch.");
    } else {
        println!("On branch {}", current.short_name(&repo.refs));
    }
    Ok(())
}

fn print_pending_commit_status(repo: &Repository, status: &Status) -> Result<()> {
    match repo.pending_commit().merge_type() {
        Some(PendingType::Merge) => {
            if status.conflicts.is_empty() {
                println!("All conflicts fixed but you are still merging.");
                println!("  (use 'grit commit' to conclude merge)");
            } else {
                println!("You have unmerged paths.");
                println!("  (fix conflicts and run 'grit commit')");
                println!("  (use 'grit merge --abort' to abort the merge)");
            }
            println!();
        }
        Some(ty @ (PendingType::CherryPick | PendingType::Revert)) => {
            let oid = repo.pending_commit().merge_oid(ty)?;
            let op = ty.op_name();
            println!(
                "You are currently {op}ing commit {}.",
                repo.database.short_oid(&oid)
            );
            if status.conflicts.is_empty() {
                println!("  (all conflicts fixed: run 'grit {op} --continue')");
            } else {
                println!("  (fix conflicts and run 'grit {op} --continue')");
            }
            println!("  (use 'grit {op} --abort' to cancel the {op} operation)");
            println!();
        }
        None => {}
    }
    Ok(())
}

fn print_commit_status(status: &Status) {
    if !status.index_changes.is_empty() {
        return;
    }
    if !status.workspace_changes.is_empty() {
        println!("no changes added to commit");
    } else if !status.untracked.is_empty() {
        println!("nothing added to commit but untracked files present");
    } else {
        println!("nothing to commit, working tree clean");
    }
}
