//! The config stack.
//!
//! Lookups layer system and global files under the repository's own
//! `.git/config`, later files winning. Only the local file is ever
//! written; the outer layers are a read-only facade.

use std::cell::{RefCell, RefMut};
use std::path::{Path, PathBuf};

use crate::{ConfigError, ConfigFile, Value};

pub struct ConfigStack {
    system: RefCell<ConfigFile>,
    global: RefCell<ConfigFile>,
    local: RefCell<ConfigFile>,
}

impl ConfigStack {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        let global_path = std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".gitconfig"))
            .unwrap_or_else(|| PathBuf::from(".gitconfig"));

        Self {
            system: RefCell::new(ConfigFile::new("/etc/gitconfig")),
            global: RefCell::new(ConfigFile::new(global_path)),
            local: RefCell::new(ConfigFile::new(git_dir.as_ref().join("config"))),
        }
    }

    /// The writable repository-local file.
    pub fn local(&self) -> RefMut<'_, ConfigFile> {
        self.local.borrow_mut()
    }

    /// Last value across system → global → local.
    pub fn get(&self, key: &[&str]) -> Option<Value> {
        self.get_all(key).pop()
    }

    /// Every value in stack order.
    pub fn get_all(&self, key: &[&str]) -> Vec<Value> {
        let mut values = Vec::new();
        for file in [&self.system, &self.global, &self.local] {
            let mut file = file.borrow_mut();
            // Unreadable outer layers are simply absent.
            if file.open().is_ok() {
                values.extend(file.get_all(key));
            }
        }
        values
    }

    pub fn get_bool(&self, key: &[&str]) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_int(&self, key: &[&str]) -> Option<i64> {
        self.get(key).and_then(|v| v.as_int())
    }

    pub fn get_str(&self, key: &[&str]) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(String::from))
    }

    /// Open the local file for reading, propagating parse errors.
    pub fn open_local(&self) -> Result<(), ConfigError> {
        self.local.borrow_mut().open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_overrides_when_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config"),
            "[user]\n\tname = Local Name\n[fetch]\n\tunpackLimit = 5\n",
        )
        .unwrap();

        let stack = ConfigStack::new(dir.path());
        assert_eq!(
            stack.get_str(&["user", "name"]).as_deref(),
            Some("Local Name")
        );
        assert_eq!(stack.get_int(&["fetch", "unpackLimit"]), Some(5));
        assert_eq!(stack.get(&["user", "missing"]), None);
    }

    #[test]
    fn updates_go_through_the_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let stack = ConfigStack::new(dir.path());

        {
            let mut local = stack.local();
            local.open_for_update().unwrap();
            local.set(&["core", "bare"], false.into()).unwrap();
            local.save().unwrap();
        }

        assert_eq!(stack.get_bool(&["core", "bare"]), Some(false));
    }
}
