use anyhow::Result;
use bstr::{BStr, BString};
use clap::Args;
use grit_repository::{Inspector, Repository};

use super::open_repo;
use crate::Cli;

const BOTH_CHANGED: &str = "staged content different from both the file and the HEAD";
const INDEX_CHANGED: &str = "changes staged in the index";
const WORKSPACE_CHANGED: &str = "local modifications";

#[derive(Args)]
pub struct RmArgs {
    /// Only remove from the index
    #[arg(long)]
    cached: bool,

    /// Override safety checks
    #[arg(short, long)]
    force: bool,

    /// Remove directories recursively
    #[arg(short)]
    recursive: bool,

    #[arg(value_name = "file", required = true)]
    files: Vec<String>,
}

pub fn run(args: &RmArgs, cli: &Cli) -> Result<i32> {
    let mut repo = open_repo(cli)?;
    repo.index.load_for_update()?;

    let head_oid = repo.refs.read_head()?;

    // Expand tracked directories (with -r) and validate pathspecs.
    let mut paths: Vec<BString> = Vec::new();
    for file in &args.files {
        let path = BString::from(file.as_str());
        match expand_path(&repo, path.as_ref(), args.recursive) {
            Ok(expanded) => paths.extend(expanded),
            Err(message) => {
                repo.index.release_lock()?;
                eprintln!("fatal: {message}");
                return Ok(128);
            }
        }
    }

    // Plan: refuse removals that would lose staged or local changes.
    let mut both_changed = Vec::new();
    let mut uncommitted = Vec::new();
    let mut unstaged = Vec::new();

    if !args.force {
        for path in &paths {
            let meta = repo.workspace.stat_file(path.as_ref());
            if meta.as_ref().map(|m| m.is_dir()).unwrap_or(false) {
                repo.index.release_lock()?;
                eprintln!("fatal: grit rm: '{path}': Operation not permitted");
                return Ok(128);
            }

            let item = repo.load_tree_entry(head_oid, Some(path.as_ref()))?;
            let entry = repo.index.entry_for_path(path.as_ref()).cloned();

            let inspector = Inspector::new(&repo);
            let staged = inspector.compare_tree_to_index(item.as_ref(), entry.as_ref());
            let unstaged_change = match meta {
                Some(meta) => {
                    inspector.compare_index_to_workspace(entry.as_ref(), Some(&meta))?
                }
                None => None,
            };

            match (staged.is_some(), unstaged_change.is_some()) {
                (true, true) => both_changed.push(path.clone()),
                (true, false) if !args.cached => uncommitted.push(path.clone()),
                (false, true) if !args.cached => unstaged.push(path.clone()),
                _ => {}
            }
        }
    }

    if !(both_changed.is_empty() && uncommitted.is_empty() && unstaged.is_empty()) {
        print_errors(&both_changed, BOTH_CHANGED);
        print_errors(&uncommitted, INDEX_CHANGED);
        print_errors(&unstaged, WORKSPACE_CHANGED);
        repo.index.release_lock()?;
        return Ok(1);
    }

    for path in &paths {
        repo.index.remove(path.as_ref());
        if !args.cached {
            repo.workspace.remove(path.as_ref())?;
        }
        println!("rm '{path}'");
    }

    repo.index.write_updates()?;
    Ok(0)
}

fn expand_path(
    repo: &Repository,
    path: &BStr,
    recursive: bool,
) -> std::result::Result<Vec<BString>, String> {
    if repo.index.is_tracked_directory(path) {
        if recursive {
            return Ok(repo.index.child_paths(path));
        }
        return Err(format!("not removing '{path}' recursively without -r"));
    }

    if repo.index.is_tracked_file(path) {
        return Ok(vec![BString::from(path)]);
    }

    Err(format!("pathspec '{path}' did not match any files"))
}

fn print_errors(paths: &[BString], message: &str) {
    if paths.is_empty() {
        return;
    }
    let files_have = if paths.len() == 1 {
        "file has"
    } else {
        "files have"
    };
    eprintln!("error: the following {files_have} {message}:");
    for path in paths {
        eprintln!("    {path}");
    }
}
