use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::Cli;

#[derive(Args)]
pub struct InitArgs {
    /// Directory to create the repository in
    directory: Option<PathBuf>,
}

pub fn run(args: &InitArgs, _cli: &Cli) -> Result<i32> {
    let root = match &args.directory {
        Some(dir) => std::env::current_dir()?.join(dir),
        None => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&root)?;

    let repo = grit_repository::init::init(&root)?;
    println!(
        "Initialized empty grit repository in {}",
        repo.git_path().display()
    );
    Ok(0)
}
