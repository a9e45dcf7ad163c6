use anyhow::Result;
use clap::Args;
use grit_repository::RepoError;

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct RemoteArgs {
    /// Show fetch and push URLs
    #[arg(short, long)]
    verbose: bool,

    /// Track only the given branches
    #[arg(short = 't', value_name = "branch")]
    tracked: Vec<String>,

    /// Subcommand (`add`/`remove`) and its arguments
    args: Vec<String>,
}

pub fn run(args: &RemoteArgs, cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;

    match args.args.first().map(String::as_str) {
        Some("add") => {
            let (Some(name), Some(url)) = (args.args.get(1), args.args.get(2)) else {
                eprintln!("error: usage: grit remote add <name> <url>");
                return Ok(129);
            };
            match repo.remotes().add(name, url, &args.tracked) {
                Ok(()) => Ok(0),
                Err(e @ RepoError::InvalidRemote(_)) => {
                    eprintln!("fatal: {e}");
                    Ok(128)
                }
                Err(e) => Err(e.into()),
            }
        }
        Some("remove") => {
            let Some(name) = args.args.get(1) else {
                eprintln!("error: usage: grit remote remove <name>");
                return Ok(129);
            };
            match repo.remotes().remove(name) {
                Ok(()) => Ok(0),
                Err(e @ RepoError::InvalidRemote(_)) => {
                    eprintln!("fatal: {e}");
                    Ok(128)
                }
                Err(e) => Err(e.into()),
            }
        }
        _ => {
            for name in repo.remotes().list() {
                if args.verbose {
                    if let Some(remote) = repo.remotes().get(&name) {
                        let fetch = remote.fetch_url().unwrap_or_default();
                        let push = remote.push_url().unwrap_or_default();
                        println!("{name}\t{fetch} (fetch)");
                        println!("{name}\t{push} (push)");
                    }
                } else {
                    println!("{name}");
                }
            }
            Ok(0)
        }
    }
}
