//! The shared driver for cherry-pick and revert: option handling, the
//! sequencer loop, and conflict/abort/continue plumbing.

use anyhow::{anyhow, Result};
use bstr::{BString, ByteVec};
use grit_hash::ObjectId;
use grit_merge::{MergeInputs, Resolve, Sequencer};
use grit_object::Commit;
use grit_repository::{PendingType, Repository};
use grit_revwalk::{RevList, RevListOptions};

use crate::write_commit;

pub const CONFLICT_NOTES: &[&str] = &[
    "after resolving the conflicts, mark the corrected paths",
    "with 'grit add <paths>' or 'grit rm <paths>'",
    "and commit the result with 'grit commit'",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencingMode {
    Run,
    Continue,
    Abort,
    Quit,
}

/// What distinguishes cherry-pick from revert inside the shared loop.
pub trait SequencingCommand {
    fn pending_type(&self) -> PendingType;

    /// Queue the commits named on the command line.
    fn store_commit_sequence(
        &self,
        repo: &Repository,
        sequencer: &mut Sequencer,
        revs: &[String],
    ) -> Result<()>;

    /// Apply one queued commit; `Ok(None)` means success, `Ok(Some(code))`
    /// is a controlled exit.
    fn apply(
        &self,
        repo: &mut Repository,
        sequencer: &mut Sequencer,
        oid: ObjectId,
    ) -> Result<Option<i32>>;
}

pub fn run_sequencing(
    command: &dyn SequencingCommand,
    repo: &mut Repository,
    mode: SequencingMode,
    mainline: Option<u32>,
    revs: &[String],
) -> Result<i32> {
    let mut sequencer = Sequencer::new(repo);

    match mode {
        SequencingMode::Continue => return handle_continue(command, repo, &mut sequencer),
        SequencingMode::Abort => return handle_abort(command, repo, &mut sequencer),
        SequencingMode::Quit => return handle_quit(command, repo, &mut sequencer),
        SequencingMode::Run => {}
    }

    sequencer.start(repo, mainline).map_err(|e| anyhow!("{e}"))?;
    command.store_commit_sequence(repo, &mut sequencer, revs)?;
    resume_sequencer(command, repo, &mut sequencer)
}

fn resume_sequencer(
    command: &dyn SequencingCommand,
    repo: &mut Repository,
    sequencer: &mut Sequencer,
) -> Result<i32> {
    while let Some((_, oid)) = sequencer.next_command() {
        if let Some(code) = command.apply(repo, sequencer, oid)? {
            return Ok(code);
        }
        sequencer.drop_command(repo).map_err(|e| anyhow!("{e}"))?;
    }
    sequencer.quit().map_err(|e| anyhow!("{e}"))?;
    Ok(0)
}

fn handle_continue(
    command: &dyn SequencingCommand,
    repo: &mut Repository,
    sequencer: &mut Sequencer,
) -> Result<i32> {
    repo.index.load()?;

    if repo.pending_commit().merge_type() == Some(command.pending_type()) {
        match write_commit::resume_merge(repo, command.pending_type()) {
            Ok(0) => {}
            Ok(code) => return Ok(code),
            Err(e) => {
                eprintln!("fatal: {e}");
                return Ok(128);
            }
        }
    }

    sequencer.load(repo).map_err(|e| anyhow!("{e}"))?;
    sequencer.drop_command(repo).map_err(|e| anyhow!("{e}"))?;
    resume_sequencer(command, repo, sequencer)
}

fn handle_abort(
    command: &dyn SequencingCommand,
    repo: &mut Repository,
    sequencer: &mut Sequencer,
) -> Result<i32> {
    let pending = repo.pending_commit();
    if pending.merge_type() == Some(command.pending_type()) {
        pending.clear(command.pending_type())?;
    }

    repo.index.load_for_update()?;
    if let Err(e) = sequencer.abort(repo) {
        eprintln!("warning: {e}");
    }
    repo.index.write_updates()?;
    Ok(0)
}

fn handle_quit(
    command: &dyn SequencingCommand,
    repo: &mut Repository,
    sequencer: &mut Sequencer,
) -> Result<i32> {
    let pending = repo.pending_commit();
    if pending.merge_type() == Some(command.pending_type()) {
        pending.clear(command.pending_type())?;
    }
    sequencer.quit().map_err(|e| anyhow!("{e}"))?;
    Ok(0)
}

/// The commits named on the command line, oldest first, without walking
/// ancestry (ranges still expand).
pub fn commit_sequence(repo: &Repository, revs: &[String]) -> Result<Vec<ObjectId>> {
    let reversed: Vec<String> = revs.iter().rev().cloned().collect();
    let mut list = RevList::new(repo, &reversed, RevListOptions::default())?;
    let mut oids: Vec<ObjectId> = list.collect_items()?.into_iter().map(|i| i.oid).collect();
    oids.reverse();
    Ok(oids)
}

/// The parent to diff against: the sole parent, or the `--mainline` choice
/// for merges.
pub fn select_parent(
    commit: &Commit,
    oid: &ObjectId,
    mainline: Option<u32>,
) -> Result<std::result::Result<Option<ObjectId>, i32>> {
    if commit.is_merge() {
        match mainline {
            Some(n) if n >= 1 && (n as usize) <= commit.parents.len() => {
                Ok(Ok(Some(commit.parents[n as usize - 1])))
            }
            Some(n) => {
                eprintln!(
                    "error: commit {} does not have parent {n}",
                    oid.to_hex()
                );
                Ok(Err(1))
            }
            None => {
                eprintln!(
                    "error: commit {} is a merge but no -m option was given",
                    oid.to_hex()
                );
                Ok(Err(1))
            }
        }
    } else if mainline.is_some() {
        eprintln!(
            "error: mainline was specified but commit {} is not a merge",
            oid.to_hex()
        );
        Ok(Err(1))
    } else {
        Ok(Ok(commit.first_parent()))
    }
}

/// Merge one commit's changes into the worktree, reporting progress lines.
pub fn resolve_merge(repo: &mut Repository, inputs: &MergeInputs) -> Result<()> {
    repo.index.load_for_update()?;
    let mut resolve = Resolve::new(repo, inputs);
    resolve.execute().map_err(|e| anyhow!("{e}"))?;
    for line in resolve.log.clone() {
        println!("{line}");
    }
    repo.index.write_updates()?;
    Ok(())
}

/// Record the failed step, store the message for `--continue`, print the
/// hint block, and exit 1.
pub fn fail_on_conflict(
    repo: &mut Repository,
    sequencer: &mut Sequencer,
    inputs: &MergeInputs,
    ty: PendingType,
    message: &[u8],
) -> Result<i32> {
    sequencer.dump(repo).map_err(|e| anyhow!("{e}"))?;
    repo.pending_commit().start(&inputs.right_oid, ty)?;

    let mut stored = BString::from(message);
    stored.push_str("\n# Conflicts:\n");
    for path in repo.index.conflict_paths() {
        stored.push_str("#\t");
        stored.extend_from_slice(&path);
        stored.push(b'\n');
    }
    repo.pending_commit().set_merge_message(&stored)?;

    eprintln!("error: could not apply {}", inputs.right_name);
    for line in CONFLICT_NOTES {
        eprintln!("hint: {line}");
    }
    Ok(1)
}
