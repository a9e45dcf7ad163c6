use anyhow::Result;
use bstr::BString;
use clap::Args;
use grit_hash::ObjectId;
use grit_merge::{MergeInputs, Sequencer};
use grit_repository::{PendingType, Repository};

use super::open_repo;
use crate::sequencing::{
    commit_sequence, fail_on_conflict, resolve_merge, run_sequencing, select_parent,
    SequencingCommand, SequencingMode,
};
use crate::write_commit::{current_author, print_commit, write_commit};
use crate::Cli;

#[derive(Args)]
pub struct RevertArgs {
    /// Revert the change relative to the given parent of a merge
    #[arg(short = 'm', long)]
    mainline: Option<u32>,

    /// Resume after resolving conflicts
    #[arg(long = "continue", conflicts_with_all = ["abort", "quit"])]
    continue_: bool,

    /// Abort and return to the pre-sequence state
    #[arg(long)]
    abort: bool,

    /// Forget the in-progress operation but keep HEAD
    #[arg(long)]
    quit: bool,

    /// Commits to revert
    revisions: Vec<String>,
}

struct Revert;

impl SequencingCommand for Revert {
    fn pending_type(&self) -> PendingType {
        PendingType::Revert
    }

    fn store_commit_sequence(
        &self,
        repo: &Repository,
        sequencer: &mut Sequencer,
        revs: &[String],
    ) -> Result<()> {
        for oid in commit_sequence(repo, revs)? {
            sequencer.revert(oid);
        }
        Ok(())
    }

    fn apply(
        &self,
        repo: &mut Repository,
        sequencer: &mut Sequencer,
        oid: ObjectId,
    ) -> Result<Option<i32>> {
        let commit = repo.database.load_commit(&oid)?;
        let mainline = sequencer.get_mainline();

        // Reverting swaps the roles: the commit itself is the base and its
        // parent is the side being applied.
        let parent = match select_parent(&commit, &oid, mainline)? {
            Ok(parent) => parent,
            Err(code) => return Ok(Some(code)),
        };
        let Some(parent) = parent else {
            return Ok(Some(1));
        };

        let left_oid = repo
            .refs
            .read_head()?
            .ok_or_else(|| anyhow::anyhow!("revert with no HEAD"))?;
        let short = repo.database.short_oid(&oid);
        let inputs = MergeInputs::pick(
            "HEAD",
            format!("parent of {short}... {}", commit.title_line()),
            left_oid,
            parent,
            vec![oid],
        );

        let message = revert_message(&commit, &oid);
        resolve_merge(repo, &inputs)?;

        if repo.index.is_conflict() {
            let code = fail_on_conflict(repo, sequencer, &inputs, PendingType::Revert, &message)?;
            return Ok(Some(code));
        }

        let author = current_author(repo)?;
        let (new_oid, reverted) = write_commit(
            repo,
            vec![inputs.left_oid],
            author.clone(),
            author,
            message.as_ref(),
        )?;
        print_commit(repo, &new_oid, &reverted)?;
        Ok(None)
    }
}

fn revert_message(commit: &grit_object::Commit, oid: &ObjectId) -> BString {
    BString::from(format!(
        "Revert \"{}\"\n\nThis reverts commit {}.\n",
        commit.title_line(),
        oid.to_hex()
    ))
}

pub fn run(args: &RevertArgs, cli: &Cli) -> Result<i32> {
    let mut repo = open_repo(cli)?;

    let mode = if args.continue_ {
        SequencingMode::Continue
    } else if args.abort {
        SequencingMode::Abort
    } else if args.quit {
        SequencingMode::Quit
    } else {
        SequencingMode::Run
    };

    run_sequencing(&Revert, &mut repo, mode, args.mainline, &args.revisions)
}
