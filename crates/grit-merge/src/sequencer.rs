//! Durable sequencing state for cherry-pick and revert.
//!
//! `.git/sequencer/` holds the remaining `todo` commands, the HEAD the
//! operation started from, and an `abort-safety` file updated after every
//! completed step. `--abort` refuses to rewind if HEAD moved since the
//! last recorded step.

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use grit_config::ConfigFile;
use grit_hash::ObjectId;
use grit_repository::Repository;
use grit_utils::LockFile;
use regex::Regex;

use crate::MergeError;

pub const UNSAFE_MESSAGE: &str = "You seem to have moved HEAD. Not rewinding, check your HEAD!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerAction {
    Pick,
    Revert,
}

impl SequencerAction {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Pick => "pick",
            Self::Revert => "revert",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "pick" => Some(Self::Pick),
            "revert" => Some(Self::Revert),
            _ => None,
        }
    }
}

fn todo_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\S+) (\S+) (.*)$").unwrap())
}

pub struct Sequencer {
    path: PathBuf,
    todo_path: PathBuf,
    abort_path: PathBuf,
    head_path: PathBuf,
    commands: Vec<(SequencerAction, ObjectId)>,
    todo_lock: Option<LockFile>,
    options_path: PathBuf,
}

impl Sequencer {
    pub fn new(repo: &Repository) -> Self {
        let path = repo.git_path().join("sequencer");
        Self {
            todo_path: path.join("todo"),
            abort_path: path.join("abort-safety"),
            head_path: path.join("head"),
            options_path: path.join("opts"),
            commands: Vec::new(),
            todo_lock: None,
            path,
        }
    }

    /// Begin a new sequence; fails if one is already underway.
    pub fn start(&mut self, repo: &Repository, mainline: Option<u32>) -> Result<(), MergeError> {
        fs::create_dir(&self.path).map_err(|_| {
            MergeError::Sequencer("a cherry-pick or revert is already in progress".into())
        })?;

        if let Some(mainline) = mainline {
            let mut config = ConfigFile::new(&self.options_path);
            config.open_for_update().map_err(grit_repository::RepoError::from)?;
            config
                .set(&["options", "mainline"], i64::from(mainline).into())
                .map_err(grit_repository::RepoError::from)?;
            config.save().map_err(grit_repository::RepoError::from)?;
        }

        let head_oid = repo.refs.read_head().map_err(grit_repository::RepoError::from)?;
        self.write_file(&self.head_path.clone(), head_oid)?;
        self.write_file(&self.abort_path.clone(), head_oid)?;

        self.open_todo_file()?;
        Ok(())
    }

    pub fn get_mainline(&self) -> Option<u32> {
        let mut config = ConfigFile::new(&self.options_path);
        config.open().ok()?;
        config
            .get(&["options", "mainline"])
            .and_then(|v| v.as_int())
            .map(|n| n as u32)
    }

    pub fn pick(&mut self, oid: ObjectId) {
        self.commands.push((SequencerAction::Pick, oid));
    }

    pub fn revert(&mut self, oid: ObjectId) {
        self.commands.push((SequencerAction::Revert, oid));
    }

    pub fn next_command(&self) -> Option<(SequencerAction, ObjectId)> {
        self.commands.first().copied()
    }

    /// Mark the current command done and checkpoint HEAD for abort safety.
    pub fn drop_command(&mut self, repo: &Repository) -> Result<(), MergeError> {
        if !self.commands.is_empty() {
            self.commands.remove(0);
        }
        let head_oid = repo.refs.read_head().map_err(grit_repository::RepoError::from)?;
        self.write_file(&self.abort_path.clone(), head_oid)?;
        Ok(())
    }

    /// Persist the remaining commands for a later `--continue`.
    pub fn dump(&mut self, repo: &Repository) -> Result<(), MergeError> {
        let Some(mut lock) = self.todo_lock.take() else {
            return Ok(());
        };

        for (action, oid) in &self.commands {
            let commit = repo
                .database
                .load_commit(oid)
                .map_err(grit_repository::RepoError::from)?;
            let line = format!(
                "{} {} {}\n",
                action.as_str(),
                repo.database.short_oid(oid),
                commit.title_line()
            );
            lock.write_all(line.as_bytes())
                .map_err(grit_repository::RepoError::from)?;
        }
        lock.commit().map_err(grit_repository::RepoError::from)?;
        Ok(())
    }

    /// Reload the remaining commands from the todo file.
    pub fn load(&mut self, repo: &Repository) -> Result<(), MergeError> {
        self.open_todo_file()?;

        let Ok(content) = fs::read_to_string(&self.todo_path) else {
            return Ok(());
        };

        for line in content.lines() {
            let Some(caps) = todo_line().captures(line) else {
                continue;
            };
            let action = SequencerAction::parse(caps.get(1).unwrap().as_str())
                .ok_or_else(|| MergeError::Sequencer(format!("unknown action in todo: {line}")))?;
            let prefix = caps.get(2).unwrap().as_str();

            let oids = repo
                .database
                .prefix_match(prefix)
                .map_err(grit_repository::RepoError::from)?;
            let oid = oids.first().copied().ok_or_else(|| {
                MergeError::Sequencer(format!("unresolvable commit in todo: {prefix}"))
            })?;
            self.commands.push((action, oid));
        }
        Ok(())
    }

    /// Throw the sequencing state away.
    pub fn quit(&mut self) -> Result<(), MergeError> {
        if let Some(lock) = self.todo_lock.take() {
            let _ = lock.rollback();
        }
        if self.path.exists() {
            fs::remove_dir_all(&self.path).map_err(grit_repository::RepoError::from)?;
        }
        Ok(())
    }

    /// Wind the repository back to where the sequence started, refusing if
    /// HEAD moved outside the sequencer's control.
    pub fn abort(&mut self, repo: &mut Repository) -> Result<(), MergeError> {
        let head_oid = read_oid_file(&self.head_path);
        let expected = read_oid_file(&self.abort_path);
        let actual = repo.refs.read_head().map_err(grit_repository::RepoError::from)?;

        self.quit()?;

        if actual != expected {
            return Err(MergeError::Sequencer(UNSAFE_MESSAGE.to_string()));
        }

        let Some(head_oid) = head_oid else {
            return Ok(());
        };

        repo.hard_reset(head_oid)?;
        let orig = repo
            .refs
            .update_head(&head_oid)
            .map_err(grit_repository::RepoError::from)?;
        if let Some(orig) = orig {
            repo.refs
                .update_ref(grit_ref::ORIG_HEAD, &orig)
                .map_err(grit_repository::RepoError::from)?;
        }
        Ok(())
    }

    fn open_todo_file(&mut self) -> Result<(), MergeError> {
        if !self.path.is_dir() {
            return Ok(());
        }
        self.todo_lock =
            Some(LockFile::acquire(&self.todo_path).map_err(grit_repository::RepoError::from)?);
        Ok(())
    }

    fn write_file(&self, path: &PathBuf, oid: Option<ObjectId>) -> Result<(), MergeError> {
        let mut lock = LockFile::acquire(path).map_err(grit_repository::RepoError::from)?;
        if let Some(oid) = oid {
            lock.write_all(oid.to_hex().as_bytes())
                .map_err(grit_repository::RepoError::from)?;
        }
        lock.write_all(b"\n").map_err(grit_repository::RepoError::from)?;
        lock.commit().map_err(grit_repository::RepoError::from)?;
        Ok(())
    }
}

fn read_oid_file(path: &PathBuf) -> Option<ObjectId> {
    let text = fs::read_to_string(path).ok()?;
    ObjectId::from_hex(text.trim()).ok()
}
