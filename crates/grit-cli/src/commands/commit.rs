use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use super::open_repo;
use crate::write_commit::{
    current_author, print_commit, read_message, write_commit,
};
use crate::Cli;

#[derive(Args)]
pub struct CommitArgs {
    /// Commit message
    #[arg(short, long)]
    message: Option<String>,

    /// Read the message from a file
    #[arg(short = 'F', long = "file")]
    file: Option<PathBuf>,
}

pub fn run(args: &CommitArgs, cli: &Cli) -> Result<i32> {
    let mut repo = open_repo(cli)?;
    repo.index.load()?;

    // Concluding a pending merge/cherry-pick/revert takes priority.
    if let Some(ty) = repo.pending_commit().merge_type() {
        return match crate::write_commit::resume_merge(&mut repo, ty) {
            Ok(code) => Ok(code),
            Err(e) => {
                eprintln!("fatal: {e}");
                Ok(128)
            }
        };
    }

    let Some(message) = read_message(&args.message, &args.file)? else {
        eprintln!("Aborting commit due to empty commit message.");
        return Ok(1);
    };

    let parent = repo.refs.read_head()?;
    let author = current_author(&repo)?;
    let (oid, commit) = write_commit(
        &mut repo,
        parent.into_iter().collect(),
        author.clone(),
        author,
        message.as_ref(),
    )?;

    print_commit(&repo, &oid, &commit)?;
    Ok(0)
}
