//! Remote definitions and upstream configuration, stored in the local
//! config file.

use grit_config::{ConfigStack, Value};

use crate::refspec::Refspec;
use crate::RepoError;

pub const DEFAULT_REMOTE: &str = "origin";

pub struct Remotes<'a> {
    config: &'a ConfigStack,
}

impl<'a> Remotes<'a> {
    pub fn new(config: &'a ConfigStack) -> Self {
        Self { config }
    }

    /// Register a remote with a fetch spec per requested branch pattern
    /// (`*` when none given).
    pub fn add(&self, name: &str, url: &str, branches: &[String]) -> Result<(), RepoError> {
        let branches = if branches.is_empty() {
            vec!["*".to_string()]
        } else {
            branches.to_vec()
        };

        let mut local = self.config.local();
        local.open_for_update()?;

        if local.get(&["remote", name, "url"]).is_some() {
            local.rollback()?;
            return Err(RepoError::InvalidRemote(format!(
                "remote {name} already exists."
            )));
        }

        local.set(&["remote", name, "url"], url.into())?;
        for branch in &branches {
            let spec = Refspec::new(
                format!("refs/heads/{branch}"),
                format!("refs/remotes/{name}/{branch}"),
                true,
            );
            local.add(&["remote", name, "fetch"], spec.to_string().into());
        }
        local.save()?;
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<(), RepoError> {
        let mut local = self.config.local();
        local.open_for_update()?;
        let existed = local.remove_section(&["remote", name]);
        local.save()?;

        if existed {
            Ok(())
        } else {
            Err(RepoError::InvalidRemote(format!("No such remote: {name}")))
        }
    }

    pub fn list(&self) -> Vec<String> {
        let _ = self.config.open_local();
        self.config.local().subsections("remote")
    }

    pub fn get(&self, name: &str) -> Option<Remote<'_>> {
        let _ = self.config.open_local();
        if !self.config.local().section_exists(&["remote", name]) {
            return None;
        }
        Some(Remote {
            config: self.config,
            name: name.to_string(),
        })
    }

    /// The remote-tracking ref configured as `branch`'s upstream, resolved
    /// through the remote's fetch specs.
    pub fn get_upstream(&self, branch: &str) -> Option<String> {
        let remote_name = self.config.get_str(&["branch", branch, "remote"])?;
        let remote = self.get(&remote_name)?;
        remote.get_upstream(branch)
    }

    /// Configure `branch` to track `upstream` (a remote-tracking ref),
    /// searching every remote's fetch specs for one that produces it.
    pub fn set_upstream(&self, branch: &str, upstream: &str) -> Result<(String, String), RepoError> {
        for name in self.list() {
            if let Some(remote) = self.get(&name) {
                if let Some(merge) = remote.set_upstream(branch, upstream)? {
                    return Ok((name, merge));
                }
            }
        }
        Err(RepoError::InvalidRemote(format!(
            "Cannot setup tracking information; starting point '{upstream}' is not a branch"
        )))
    }

    pub fn unset_upstream(&self, branch: &str) -> Result<(), RepoError> {
        let mut local = self.config.local();
        local.open_for_update()?;
        local.unset(&["branch", branch, "remote"])?;
        local.unset(&["branch", branch, "merge"])?;
        local.save()?;
        Ok(())
    }
}

pub struct Remote<'a> {
    config: &'a ConfigStack,
    name: String,
}

impl Remote<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fetch_url(&self) -> Option<String> {
        self.config.get_str(&["remote", &self.name, "url"])
    }

    pub fn push_url(&self) -> Option<String> {
        self.config
            .get_str(&["remote", &self.name, "pushurl"])
            .or_else(|| self.fetch_url())
    }

    pub fn fetch_specs(&self) -> Vec<String> {
        self.config
            .get_all(&["remote", &self.name, "fetch"])
            .into_iter()
            .map(|v| v.to_display())
            .collect()
    }

    pub fn push_specs(&self) -> Vec<String> {
        self.config
            .get_all(&["remote", &self.name, "push"])
            .into_iter()
            .map(|v| v.to_display())
            .collect()
    }

    pub fn uploader(&self) -> Option<String> {
        self.config.get_str(&["remote", &self.name, "uploadpack"])
    }

    pub fn receiver(&self) -> Option<String> {
        self.config.get_str(&["remote", &self.name, "receivepack"])
    }

    /// The tracking ref for `branch`, expanded from the configured merge
    /// ref through this remote's fetch specs.
    pub fn get_upstream(&self, branch: &str) -> Option<String> {
        let merge = self.config.get_str(&["branch", branch, "merge"])?;
        let targets = Refspec::expand(&self.fetch_specs(), &[merge]);
        targets.keys().next().cloned()
    }

    fn set_upstream(&self, branch: &str, upstream: &str) -> Result<Option<String>, RepoError> {
        let Some(merge) = Refspec::invert(&self.fetch_specs(), upstream) else {
            return Ok(None);
        };

        let mut local = self.config.local();
        local.open_for_update()?;
        local.set(
            &["branch", branch, "remote"],
            Value::Str(self.name.clone()),
        )?;
        local.set(&["branch", branch, "merge"], Value::Str(merge.clone()))?;
        local.save()?;
        Ok(Some(merge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Repository;

    fn setup() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let git = dir.path().join(".git");
        std::fs::create_dir_all(git.join("objects")).unwrap();
        (dir, Repository::new(git))
    }

    #[test]
    fn add_writes_url_and_fetch_spec() {
        let (_dir, repo) = setup();
        repo.remotes().add("origin", "/tmp/remote.git", &[]).unwrap();

        let remotes = repo.remotes();
        let remote = remotes.get("origin").unwrap();
        assert_eq!(remote.fetch_url().as_deref(), Some("/tmp/remote.git"));
        assert_eq!(
            remote.fetch_specs(),
            vec!["+refs/heads/*:refs/remotes/origin/*"]
        );
        assert_eq!(repo.remotes().list(), vec!["origin"]);
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let (_dir, repo) = setup();
        repo.remotes().add("origin", "/a", &[]).unwrap();
        assert!(matches!(
            repo.remotes().add("origin", "/b", &[]),
            Err(RepoError::InvalidRemote(_))
        ));
    }

    #[test]
    fn remove_unknown_remote_fails() {
        let (_dir, repo) = setup();
        assert!(matches!(
            repo.remotes().remove("upstream"),
            Err(RepoError::InvalidRemote(_))
        ));
    }

    #[test]
    fn upstream_roundtrip() {
        let (_dir, repo) = setup();
        repo.remotes().add("origin", "/tmp/remote.git", &[]).unwrap();

        let (name, merge) = repo
            .remotes()
            .set_upstream("master", "refs/remotes/origin/master")
            .unwrap();
        assert_eq!(name, "origin");
        assert_eq!(merge, "refs/heads/master");

        let upstream = repo.remotes().get_upstream("master");
        assert_eq!(upstream.as_deref(), Some("refs/remotes/origin/master"));

        repo.remotes().unset_upstream("master").unwrap();
        assert_eq!(repo.remotes().get_upstream("master"), None);
    }
}
