use anyhow::Result;
use clap::Args;
use grit_config::{ConfigError, Value};

use super::open_repo;
use crate::Cli;

#[derive(Args)]
pub struct ConfigArgs {
    /// Append a value to a multi-valued key
    #[arg(long, value_name = "key")]
    add: Option<String>,

    /// Print every value of a key
    #[arg(long = "get-all", value_name = "key")]
    get_all: Option<String>,

    /// Remove a single-valued key
    #[arg(long, value_name = "key")]
    unset: Option<String>,

    /// Remove every value of a key
    #[arg(long = "unset-all", value_name = "key")]
    unset_all: Option<String>,

    /// Remove an entire section
    #[arg(long = "remove-section", value_name = "section")]
    remove_section: Option<String>,

    /// Key, then optional value to set
    args: Vec<String>,
}

pub fn run(args: &ConfigArgs, cli: &Cli) -> Result<i32> {
    let repo = open_repo(cli)?;

    if let Some(key) = &args.add {
        let Some(parts) = split_key(key) else {
            return key_error(key);
        };
        let value = args.args.first().cloned().unwrap_or_default();
        return edit(&repo, |config| {
            config.add(&as_refs(&parts), Value::parse(&value));
            Ok(())
        });
    }

    if let Some(key) = &args.get_all {
        let Some(parts) = split_key(key) else {
            return key_error(key);
        };
        return read(&repo, |config| config.get_all(&as_refs(&parts)));
    }

    if let Some(key) = &args.unset {
        let Some(parts) = split_key(key) else {
            return key_error(key);
        };
        return edit(&repo, |config| config.unset(&as_refs(&parts)));
    }

    if let Some(key) = &args.unset_all {
        let Some(parts) = split_key(key) else {
            return key_error(key);
        };
        return edit(&repo, |config| config.unset_all(&as_refs(&parts), |_| Ok(())));
    }

    if let Some(section) = &args.remove_section {
        let parts: Vec<String> = section.splitn(2, '.').map(String::from).collect();
        return edit(&repo, |config| {
            config.remove_section(&as_refs(&parts));
            Ok(())
        });
    }

    let Some(key) = args.args.first() else {
        eprintln!("error: you must specify a key");
        return Ok(2);
    };
    let Some(parts) = split_key(key) else {
        return key_error(key);
    };

    match args.args.get(1) {
        Some(value) => edit(&repo, |config| {
            config.set(&as_refs(&parts), Value::parse(value))
        }),
        None => read(&repo, |config| {
            config.get(&as_refs(&parts)).into_iter().collect()
        }),
    }
}

/// `section.sub.name` → components; needs at least a section and a name.
fn split_key(key: &str) -> Option<Vec<String>> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    // Middle components collapse into one subsection name.
    let mut out = vec![parts[0].to_string()];
    if parts.len() > 2 {
        out.push(parts[1..parts.len() - 1].join("."));
    }
    out.push(parts[parts.len() - 1].to_string());
    Some(out)
}

fn as_refs(parts: &[String]) -> Vec<&str> {
    parts.iter().map(String::as_str).collect()
}

fn key_error(key: &str) -> Result<i32> {
    eprintln!("error: key does not contain a section: {key}");
    Ok(2)
}

fn read(
    repo: &grit_repository::Repository,
    get: impl FnOnce(&mut grit_config::ConfigFile) -> Vec<Value>,
) -> Result<i32> {
    let mut local = repo.config.local();
    match local.open() {
        Ok(()) => {}
        Err(e @ ConfigError::Parse { .. }) => {
            eprintln!("error: {e}");
            return Ok(3);
        }
        Err(e) => return Err(e.into()),
    }

    let values = get(&mut local);
    if values.is_empty() {
        return Ok(1);
    }
    for value in values {
        println!("{value}");
    }
    Ok(0)
}

fn edit(
    repo: &grit_repository::Repository,
    apply: impl FnOnce(&mut grit_config::ConfigFile) -> std::result::Result<(), ConfigError>,
) -> Result<i32> {
    let mut local = repo.config.local();
    match local.open_for_update() {
        Ok(()) => {}
        Err(e @ ConfigError::Parse { .. }) => {
            eprintln!("error: {e}");
            return Ok(3);
        }
        Err(e) => return Err(e.into()),
    }

    match apply(&mut local) {
        Ok(()) => {
            local.save()?;
            Ok(0)
        }
        Err(e @ ConfigError::Conflict(_)) => {
            local.rollback()?;
            eprintln!("error: {e}");
            Ok(5)
        }
        Err(e) => {
            local.rollback()?;
            Err(e.into())
        }
    }
}
