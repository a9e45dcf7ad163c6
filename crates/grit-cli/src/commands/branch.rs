use anyhow::Result;
use clap::Args;
use grit_ref::RefError;

use super::{open_repo, resolve_revision};
use crate::Cli;

#[derive(Args)]
pub struct BranchArgs {
    /// Show the tip commit of each branch
    #[arg(short, long)]
    verbose: bool,

    /// Delete a branch (with -f, even if unmerged)
    #[arg(short = 'd')]
    delete: bool,

    /// Force: with -d, delete unmerged branches
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// Shorthand for -d -f
    #[arg(short = 'D')]
    delete_force: bool,

    /// Branch name, then optional start point
    args: Vec<String>,
}

pub fn run(args: &BranchArgs, cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;

    let delete = args.delete || args.delete_force;
    let force = args.force || args.delete_force;

    if delete {
        return delete_branches(&repo, &args.args, force);
    }
    if args.args.is_empty() {
        return list_branches(&repo, args.verbose);
    }
    create_branch(&repo, &args.args)
}

fn list_branches(repo: &grit_repository::Repository, verbose: bool) -> Result<i32> {
    let current = repo.refs.current_ref()?;
    let mut branches = repo.refs.list_branches()?;
    branches.sort_by(|a, b| a.path.cmp(&b.path));

    let max_width = branches
        .iter()
        .map(|b| b.short_name(&repo.refs).len())
        .max()
        .unwrap_or(0);

    for branch in branches {
        let short = branch.short_name(&repo.refs);
        let marker = if branch == current { "*" } else { " " };
        let mut line = format!("{marker} {short}");

        if verbose {
            if let Some(oid) = branch.read_oid(&repo.refs)? {
                let commit = repo.database.load_commit(&oid)?;
                let padding = " ".repeat(max_width - short.len());
                line.push_str(&format!(
                    "{padding} {} {}",
                    repo.database.short_oid(&oid),
                    commit.title_line()
                ));
            }
        }
        println!("{line}");
    }
    Ok(0)
}

fn create_branch(repo: &grit_repository::Repository, args: &[String]) -> Result<i32> {
    let branch_name = &args[0];

    let start_oid = match args.get(1) {
        Some(start_point) => match resolve_revision(repo, start_point, 128)? {
            Ok(oid) => oid,
            Err(code) => return Ok(code),
        },
        None => match repo.refs.read_head()? {
            Some(oid) => oid,
            None => {
                eprintln!("fatal: Not a valid object name: '{branch_name}'.");
                return Ok(128);
            }
        },
    };

    match repo.refs.create_branch(branch_name, &start_oid) {
        Ok(()) => Ok(0),
        Err(e @ RefError::InvalidBranch(_)) => {
            eprintln!("fatal: {e}");
            Ok(128)
        }
        Err(e) => Err(e.into()),
    }
}

fn delete_branches(
    repo: &grit_repository::Repository,
    names: &[String],
    force: bool,
) -> Result<i32> {
    for name in names {
        // Without force, refuse to delete branches not merged into HEAD.
        if !force {
            if let (Some(head), Ok(Some(tip))) =
                (repo.refs.read_head()?, repo.refs.read_ref(name))
            {
                if !grit_revwalk::is_fast_forward(&repo.database, tip, head)? {
                    eprintln!(
                        "error: The branch '{name}' is not fully merged."
                    );
                    return Ok(1);
                }
            }
        }

        match repo.refs.delete_branch(name) {
            Ok(oid) => {
                println!(
                    "Deleted branch '{name}' (was {}).",
                    repo.database.short_oid(&oid)
                );
            }
            Err(e @ RefError::InvalidBranch(_)) => {
                eprintln!("error: {e}");
                return Ok(1);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(0)
}
