//! Shared commit-writing helpers used by commit, merge, cherry-pick, and
//! revert.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use bstr::{BStr, BString, ByteSlice};
use grit_hash::ObjectId;
use grit_object::{Commit, Object};
use grit_repository::{PendingType, Repository};
use grit_utils::date::{GitDate, Signature};

pub const CONFLICT_MESSAGE: &str = "\
hint: Fix them up in the work tree, and then use 'grit add/rm <file>'
hint: as appropriate to mark resolution and make a commit.
fatal: Exiting because of an unresolved conflict.";

/// Author identity: environment first, then `user.*` config.
pub fn current_author(repo: &Repository) -> Result<Signature> {
    let name = std::env::var("GIT_AUTHOR_NAME")
        .ok()
        .or_else(|| repo.config.get_str(&["user", "name"]))
        .ok_or_else(|| anyhow!("empty ident name not allowed; set user.name"))?;
    let email = std::env::var("GIT_AUTHOR_EMAIL")
        .ok()
        .or_else(|| repo.config.get_str(&["user", "email"]))
        .ok_or_else(|| anyhow!("empty ident email not allowed; set user.email"))?;

    let date = match std::env::var("GIT_AUTHOR_DATE") {
        Ok(raw) => GitDate::parse(BStr::new(raw.as_bytes())).unwrap_or_else(|_| GitDate::now()),
        Err(_) => GitDate::now(),
    };
    Ok(Signature::new(name, email, date))
}

/// The message from `-m` (newline appended) or `-F`.
pub fn read_message(message: &Option<String>, file: &Option<PathBuf>) -> Result<Option<BString>> {
    if let Some(message) = message {
        let mut out = BString::from(message.as_str());
        if !out.ends_with(b"\n") {
            out.push(b'\n');
        }
        return Ok(Some(out));
    }
    if let Some(file) = file {
        return Ok(Some(BString::from(fs::read(file)?)));
    }
    Ok(None)
}

/// Drop commented lines from a stored message file.
pub fn strip_comments(message: &BStr) -> BString {
    let mut out = BString::from("");
    for line in message.split_inclusive(|&b| b == b'\n') {
        if line.first() == Some(&b'#') {
            continue;
        }
        out.extend_from_slice(line);
    }
    out
}

/// Snapshot the index, write the commit, and advance HEAD.
pub fn write_commit(
    repo: &mut Repository,
    parents: Vec<ObjectId>,
    author: Signature,
    committer: Signature,
    message: &BStr,
) -> Result<(ObjectId, Commit)> {
    if message.trim().is_empty() {
        eprintln!("Aborting commit due to empty commit message.");
        return Err(anyhow!("empty commit message"));
    }

    let tree = repo.write_index_tree()?;
    let commit = Commit::new(parents, tree, author, committer, BString::from(message));
    let oid = repo.database.store(&Object::Commit(commit.clone()))?;
    repo.refs.update_head(&oid)?;
    Ok((oid, commit))
}

/// `[branch (root-commit) abc1234] title` announcement.
pub fn print_commit(repo: &Repository, oid: &ObjectId, commit: &Commit) -> Result<()> {
    let current = repo.refs.current_ref()?;
    let mut info = if current.is_head() {
        "detached HEAD".to_string()
    } else {
        current.short_name(&repo.refs)
    };

    if commit.is_root() {
        info.push_str(" (root-commit)");
    }
    info.push_str(&format!(" {}", repo.database.short_oid(oid)));

    println!("[{info}] {}", commit.title_line());
    Ok(())
}

/// Refuse to commit while unmerged paths remain. Returns the exit code to
/// use, or `None` to proceed.
pub fn handle_conflicted_index(repo: &Repository) -> Option<i32> {
    if !repo.index.is_conflict() {
        return None;
    }
    eprintln!("error: Committing is not possible because you have unmerged files.");
    eprintln!("{CONFLICT_MESSAGE}");
    Some(128)
}

/// Conclude a pending merge/cherry-pick/revert from `grit commit` or the
/// operation's own `--continue`.
pub fn resume_merge(repo: &mut Repository, ty: PendingType) -> Result<i32> {
    if let Some(code) = handle_conflicted_index(repo) {
        return Ok(code);
    }

    let pending = repo.pending_commit();
    let message = strip_comments(BString::from(pending.merge_message()?).as_ref());

    match ty {
        PendingType::Merge => {
            let head = repo
                .refs
                .read_head()?
                .ok_or_else(|| anyhow!("merge with no HEAD"))?;
            let merge_oid = pending.merge_oid(PendingType::Merge)?;
            let author = current_author(repo)?;
            let (oid, commit) = write_commit(
                repo,
                vec![head, merge_oid],
                author.clone(),
                author,
                message.as_ref(),
            )?;
            repo.pending_commit().clear(PendingType::Merge)?;
            print_commit(repo, &oid, &commit)?;
        }
        PendingType::CherryPick => {
            let head = repo
                .refs
                .read_head()?
                .ok_or_else(|| anyhow!("cherry-pick with no HEAD"))?;
            let pick_oid = pending.merge_oid(PendingType::CherryPick)?;
            let picked = repo.database.load_commit(&pick_oid)?;
            let committer = current_author(repo)?;
            let (oid, commit) = write_commit(
                repo,
                vec![head],
                picked.author.clone(),
                committer,
                message.as_ref(),
            )?;
            repo.pending_commit().clear(PendingType::CherryPick)?;
            print_commit(repo, &oid, &commit)?;
        }
        PendingType::Revert => {
            let head = repo
                .refs
                .read_head()?
                .ok_or_else(|| anyhow!("revert with no HEAD"))?;
            let author = current_author(repo)?;
            let (oid, commit) =
                write_commit(repo, vec![head], author.clone(), author, message.as_ref())?;
            repo.pending_commit().clear(PendingType::Revert)?;
            print_commit(repo, &oid, &commit)?;
        }
    }
    Ok(0)
}
