//! Shared harness for grit end-to-end tests: a process runner with pinned
//! identity and clocks, plus repo scaffolding helpers.

#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn assert_code(&self, expected: i32) -> &Self {
        assert_eq!(
            self.exit_code, expected,
            "exit code mismatch\nstdout:\n{}\nstderr:\n{}",
            self.stdout, self.stderr
        );
        self
    }
}

/// Run `grit` in `dir` with pinned author identity.
pub fn grit(dir: &Path, args: &[&str]) -> CommandResult {
    let output = Command::new(env!("CARGO_BIN_EXE_grit"))
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "A. U. Thor")
        .env("GIT_AUTHOR_EMAIL", "author@example.com")
        .env("PATH", bin_path())
        .output()
        .expect("failed to run grit");

    CommandResult {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    }
}

/// PATH with the grit binary's directory first, so remote agents spawned
/// as `grit upload-pack` resolve to the build under test.
fn bin_path() -> String {
    let bin = Path::new(env!("CARGO_BIN_EXE_grit"));
    let bin_dir = bin.parent().unwrap().display().to_string();
    match std::env::var("PATH") {
        Ok(path) => format!("{bin_dir}:{path}"),
        Err(_) => bin_dir,
    }
}

pub fn write_file(dir: &Path, path: &str, content: &str) {
    let full = dir.join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(full, content).unwrap();
}

pub fn read_file(dir: &Path, path: &str) -> String {
    std::fs::read_to_string(dir.join(path)).unwrap()
}

/// Initialize a repo and make one commit per `(message, files)` entry.
pub fn commit_all(dir: &Path, message: &str) {
    grit(dir, &["add", "."]).assert_code(0);
    grit(dir, &["commit", "-m", message]).assert_code(0);
}

pub fn init_repo(dir: &Path) {
    grit(dir, &["init"]).assert_code(0);
}
