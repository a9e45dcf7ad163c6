//! Repository creation.

use std::fs;
use std::path::Path;

use crate::{RepoError, Repository};

pub const DEFAULT_BRANCH: &str = "master";

/// Create `.git` under `root_path` and return the opened repository.
/// Re-running against an existing repository is harmless.
pub fn init(root_path: &Path) -> Result<Repository, RepoError> {
    let git_path = root_path.join(".git");

    for dir in ["objects", "refs/heads"] {
        fs::create_dir_all(git_path.join(dir))?;
    }

    {
        let mut config = grit_config::ConfigFile::new(git_path.join("config"));
        config.open_for_update()?;
        config.set(&["core", "bare"], false.into())?;
        config.save()?;
    }

    let head = git_path.join("HEAD");
    if !head.exists() {
        fs::write(&head, format!("ref: refs/heads/{DEFAULT_BRANCH}\n"))?;
    }

    Ok(Repository::new(git_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_expected_layout() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();

        let git = dir.path().join(".git");
        assert!(git.join("objects").is_dir());
        assert!(git.join("refs/heads").is_dir());
        assert_eq!(
            fs::read_to_string(git.join("HEAD")).unwrap(),
            "ref: refs/heads/master\n"
        );
        assert_eq!(repo.config.get_bool(&["core", "bare"]), Some(false));
        assert!(repo.refs.read_head().unwrap().is_none());
    }

    #[test]
    fn reinit_preserves_head() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path()).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/other\n").unwrap();

        init(dir.path()).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join(".git/HEAD")).unwrap(),
            "ref: refs/heads/other\n"
        );
    }
}
