use anyhow::Result;
use bstr::BString;
use clap::Args;
use grit_index::IndexError;
use grit_object::ObjectType;
use grit_repository::WorkspaceError;

use super::{expanded_path, handle_locked_index, open_repo};
use crate::Cli;

#[derive(Args)]
pub struct AddArgs {
    /// Files to add
    #[arg(value_name = "pathspec", required = true)]
    files: Vec<String>,
}

pub fn run(args: &AddArgs, cli: &Cli) -> Result<i32> {
    let mut repo = open_repo(cli)?;

    match repo.index.load_for_update() {
        Ok(()) => {}
        Err(e @ IndexError::LockDenied(_)) => return Ok(handle_locked_index(&e)),
        Err(e) => return Err(e.into()),
    }

    let mut paths: Vec<BString> = Vec::new();
    for pathspec in &args.files {
        let start = expanded_path(pathspec)?;
        match repo.workspace.list_files(&start) {
            Ok(found) => paths.extend(found),
            Err(e @ WorkspaceError::MissingFile(_)) => {
                eprintln!("fatal: {e}");
                repo.index.release_lock()?;
                return Ok(128);
            }
            Err(e) => return Err(e.into()),
        }
    }

    for path in paths {
        let data = match repo.workspace.read_file(path.as_ref()) {
            Ok(data) => data,
            Err(e @ WorkspaceError::NoPermission(_)) => {
                eprintln!("error: {e}");
                eprintln!("fatal: adding files failed");
                repo.index.release_lock()?;
                return Ok(128);
            }
            Err(e) => return Err(e.into()),
        };

        let oid = repo.database.store_raw(ObjectType::Blob, &data)?;
        let Some(meta) = repo.workspace.stat_file(path.as_ref()) else {
            continue;
        };
        repo.index.add(path.as_ref(), oid, &meta);
    }

    repo.index.write_updates()?;
    Ok(0)
}
