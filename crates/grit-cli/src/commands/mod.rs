pub mod add;
pub mod branch;
pub mod checkout;
pub mod cherry_pick;
pub mod commit;
pub mod config;
pub mod fetch;
pub mod init;
pub mod merge;
pub mod push;
pub mod receive_pack;
pub mod remote;
pub mod reset;
pub mod revert;
pub mod rm;
pub mod status;
pub mod upload_pack;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Subcommand;
use grit_index::IndexError;
use grit_repository::Repository;
use grit_revwalk::Revision;

use crate::Cli;

#[derive(Subcommand)]
pub enum Commands {
    Init(init::InitArgs),
    Add(add::AddArgs),
    Rm(rm::RmArgs),
    Status(status::StatusArgs),
    Commit(commit::CommitArgs),
    Branch(branch::BranchArgs),
    Checkout(checkout::CheckoutArgs),
    Reset(reset::ResetArgs),
    Merge(merge::MergeArgs),
    #[command(name = "cherry-pick")]
    CherryPick(cherry_pick::CherryPickArgs),
    Revert(revert::RevertArgs),
    Config(config::ConfigArgs),
    Remote(remote::RemoteArgs),
    Fetch(fetch::FetchArgs),
    Push(push::PushArgs),
    #[command(name = "upload-pack")]
    UploadPack(upload_pack::UploadPackArgs),
    #[command(name = "receive-pack")]
    ReceivePack(receive_pack::ReceivePackArgs),
}

pub fn run(cli: Cli) -> Result<i32> {
    match &cli.command {
        Commands::Init(args) => init::run(args, &cli),
        Commands::Add(args) => add::run(args, &cli),
        Commands::Rm(args) => rm::run(args, &cli),
        Commands::Status(args) => status::run(args, &cli),
        Commands::Commit(args) => commit::run(args, &cli),
        Commands::Branch(args) => branch::run(args, &cli),
        Commands::Checkout(args) => checkout::run(args, &cli),
        Commands::Reset(args) => reset::run(args, &cli),
        Commands::Merge(args) => merge::run(args, &cli),
        Commands::CherryPick(args) => cherry_pick::run(args, &cli),
        Commands::Revert(args) => revert::run(args, &cli),
        Commands::Config(args) => config::run(args, &cli),
        Commands::Remote(args) => remote::run(args, &cli),
        Commands::Fetch(args) => fetch::run(args, &cli),
        Commands::Push(args) => push::run(args, &cli),
        Commands::UploadPack(args) => upload_pack::run(args, &cli),
        Commands::ReceivePack(args) => receive_pack::run(args, &cli),
    }
}

/// Find the repository containing the current directory.
pub fn open_repo(_cli: &Cli) -> Result<Repository> {
    let cwd = std::env::current_dir()?;
    for dir in cwd.ancestors() {
        let git = dir.join(".git");
        if git.join("HEAD").exists() {
            return Ok(Repository::new(git));
        }
    }
    Err(anyhow!(
        "not a grit repository (or any of the parent directories): .git"
    ))
}

/// Expand a command-line pathspec to an absolute path.
pub fn expanded_path(path: &str) -> Result<PathBuf> {
    Ok(std::env::current_dir()?.join(path))
}

/// The standard stuck-lock advice; exits 128.
pub fn handle_locked_index(e: &IndexError) -> i32 {
    eprintln!("fatal: {e}\n");
    eprintln!(
        "Another grit process seems to be running in this repository.\n\
         Please make sure all processes are terminated then try again.\n\
         If it still fails, a grit process may have crashed in this\n\
         repository earlier: remove the file manually to continue."
    );
    128
}

/// Resolve a revision expression, printing its accumulated errors and
/// returning the exit code on failure.
pub fn resolve_revision(
    repo: &Repository,
    expr: &str,
    code_on_error: i32,
) -> Result<std::result::Result<grit_hash::ObjectId, i32>> {
    let mut revision = Revision::new(repo, expr);
    match revision.resolve_commit() {
        Ok(oid) => Ok(Ok(oid)),
        Err(grit_revwalk::RevisionError::InvalidObject(_)) => {
            for err in &revision.errors {
                eprintln!("error: {}", err.message);
                for line in &err.hint {
                    eprintln!("hint: {line}");
                }
            }
            eprintln!("fatal: Not a valid object name: '{expr}'.");
            Ok(Err(code_on_error))
        }
        Err(e) => Err(e.into()),
    }
}
