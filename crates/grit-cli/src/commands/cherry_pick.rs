use anyhow::Result;
use clap::Args;
use grit_hash::ObjectId;
use grit_merge::{MergeInputs, Sequencer};
use grit_object::Commit;
use grit_repository::{PendingType, Repository};

use super::open_repo;
use crate::sequencing::{
    commit_sequence, fail_on_conflict, resolve_merge, run_sequencing, select_parent,
    SequencingCommand, SequencingMode,
};
use crate::write_commit::{current_author, print_commit, write_commit};
use crate::Cli;

#[derive(Args)]
pub struct CherryPickArgs {
    /// Pick the change relative to the given parent of a merge
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

    /// Commits to pick
    revisions: Vec<String>,
}

struct CherryPick;

impl SequencingCommand for CherryPick {
    fn pending_type(&self) -> PendingType {
        PendingType::CherryPick
    }

    fn store_commit_sequence(
        &self,
        repo: &Repository,
        sequencer: &mut Sequencer,
        revs: &[String],
    ) -> Result<()> {
        for oid in commit_sequence(repo, revs)? {
            sequencer.pick(oid);
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
        let inputs = match pick_merge_inputs(repo, sequencer, &commit, &oid)? {
            Ok(inputs) => inputs,
            Err(code) => return Ok(Some(code)),
        };

        resolve_merge(repo, &inputs)?;

        if repo.index.is_conflict() {
            let code = fail_on_conflict(
                repo,
                sequencer,
                &inputs,
                PendingType::CherryPick,
                &commit.message,
            )?;
            return Ok(Some(code));
        }

        let committer = current_author(repo)?;
        let (new_oid, picked) = write_commit(
            repo,
            vec![inputs.left_oid],
            commit.author.clone(),
            committer,
            commit.message.as_ref(),
        )?;
        print_commit(repo, &new_oid, &picked)?;
        Ok(None)
    }
}

fn pick_merge_inputs(
    repo: &Repository,
    sequencer: &Sequencer,
    commit: &Commit,
    oid: &ObjectId,
) -> Result<std::result::Result<MergeInputs, i32>> {
    let mainline = sequencer.get_mainline();
    let parent = match select_parent(commit, oid, mainline)? {
        Ok(parent) => parent,
        Err(code) => return Ok(Err(code)),
    };

    let left_oid = repo
        .refs
        .read_head()?
        .ok_or_else(|| anyhow::anyhow!("cherry-pick with no HEAD"))?;
    let short = repo.database.short_oid(oid);
    let right_name = format!("{short}... {}", commit.title_line());

    Ok(Ok(MergeInputs::pick(
        "HEAD",
        right_name,
        left_oid,
        *oid,
        parent.into_iter().collect(),
    )))
}

pub fn run(args: &CherryPickArgs, cli: &Cli) -> Result<i32> {
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

    run_sequencing(&CherryPick, &mut repo, mode, args.mainline, &args.revisions)
}
