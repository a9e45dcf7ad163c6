//! `.git/config` access.
//!
//! The file is kept as parsed lines grouped by section so edits rewrite
//! only what changed and preserve comments, ordering, and unrecognized
//! content. Keys are case-insensitive except subsection names. Writes go
//! through the shared lock file protocol.

pub mod stack;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use grit_utils::{LockError, LockFile, UtilError};
use regex::Regex;

pub use stack::ConfigStack;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("bad config line {line} in file {file}")]
    Parse { file: PathBuf, line: usize },

    #[error("{0}")]
    Conflict(String),

    #[error("Unable to lock config: {0}")]
    LockDenied(LockError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<UtilError> for ConfigError {
    fn from(e: UtilError) -> Self {
        match e {
            UtilError::Lock(lock) => Self::LockDenied(lock),
            UtilError::Io(io) => Self::Io(io),
            other => Self::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// A typed config value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    /// `yes`/`on`/`true` and `no`/`off`/`false` are booleans; bare decimal
    /// integers are numbers; everything else is a string with escaped
    /// newlines folded away.
    pub fn parse(raw: &str) -> Self {
        static INTEGER: OnceLock<Regex> = OnceLock::new();
        let integer = INTEGER.get_or_init(|| Regex::new(r"^-?[1-9][0-9]*$").unwrap());

        match raw.to_ascii_lowercase().as_str() {
            "yes" | "on" | "true" => return Self::Bool(true),
            "no" | "off" | "false" => return Self::Bool(false),
            _ => {}
        }
        if integer.is_match(raw) {
            if let Ok(n) = raw.parse() {
                return Self::Int(n);
            }
        }
        Self::Str(raw.replace("\\\n", ""))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The string form used both for display and reserialization.
    pub fn to_display(&self) -> String {
        match self {
            Self::Bool(true) => "true".to_string(),
            Self::Bool(false) => "false".to_string(),
            Self::Int(n) => n.to_string(),
            Self::Str(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

fn section_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)^\s*\[([a-z0-9-]+)( "(.+)")?\]\s*(?:$|[#;])"#).unwrap()
    })
}

fn variable_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)^\s*([a-z][a-z0-9-]*)\s*=\s*(.*?)\s*(?:$|[#;])").unwrap()
    })
}

fn blank_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*(?:$|[#;])").unwrap())
}

/// Normalized `(section, subsection)` lookup key.
type SectionKey = (String, String);

fn normalize(name: &[&str]) -> SectionKey {
    let head = name.first().map(|s| s.to_ascii_lowercase()).unwrap_or_default();
    let tail = name[1.min(name.len())..].join(".");
    (head, tail)
}

/// One logical line (including continuations) as read or created.
#[derive(Debug, Clone)]
struct Line {
    text: String,
    variable: Option<(String, Value)>,
}

impl Line {
    fn normal_name(&self) -> Option<String> {
        self.variable
            .as_ref()
            .map(|(name, _)| name.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone)]
struct SectionBlock {
    key: SectionKey,
    lines: Vec<Line>,
}

pub struct ConfigFile {
    path: PathBuf,
    sections: Vec<SectionBlock>,
    lock: Option<LockFile>,
    loaded: bool,
}

impl ConfigFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sections: Vec::new(),
            lock: None,
            loaded: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the file if it has not been read yet.
    pub fn open(&mut self) -> Result<(), ConfigError> {
        if !self.loaded {
            self.read_config_file()?;
            self.loaded = true;
        }
        Ok(())
    }

    /// Take the lock and re-read, so edits apply to fresh content.
    pub fn open_for_update(&mut self) -> Result<(), ConfigError> {
        self.lock = Some(LockFile::acquire(&self.path).map_err(ConfigError::from)?);
        self.read_config_file()?;
        self.loaded = true;
        Ok(())
    }

    /// Serialize every retained line and commit the lock.
    pub fn save(&mut self) -> Result<(), ConfigError> {
        let mut lock = self.lock.take().expect("config not opened for update");
        for section in &self.sections {
            for line in &section.lines {
                lock.write_all(line.text.as_bytes()).map_err(ConfigError::from)?;
            }
        }
        lock.commit().map_err(ConfigError::from)?;
        Ok(())
    }

    /// Drop the lock without writing.
    pub fn rollback(&mut self) -> Result<(), ConfigError> {
        if let Some(lock) = self.lock.take() {
            lock.rollback().map_err(ConfigError::from)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries. `key` is section components plus the variable name last,
    // e.g. `["remote", "origin", "url"]`.

    pub fn get(&self, key: &[&str]) -> Option<Value> {
        self.get_all(key).pop()
    }

    pub fn get_all(&self, key: &[&str]) -> Vec<Value> {
        let (section_key, var) = split_key(key);
        let Some(section) = self.find_section(&section_key) else {
            return Vec::new();
        };
        section
            .lines
            .iter()
            .filter(|line| line.normal_name().as_deref() == Some(var.as_str()))
            .filter_map(|line| line.variable.as_ref().map(|(_, value)| value.clone()))
            .collect()
    }

    pub fn section_exists(&self, name: &[&str]) -> bool {
        self.find_section(&normalize(name)).is_some()
    }

    /// Subsection names under `name`, in file order.
    pub fn subsections(&self, name: &str) -> Vec<String> {
        let head = name.to_ascii_lowercase();
        self.sections
            .iter()
            .filter(|s| s.key.0 == head && !s.key.1.is_empty())
            .map(|s| s.key.1.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Edits (require `open_for_update`)

    /// Append a value, keeping existing ones (multi-valued keys).
    pub fn add(&mut self, key: &[&str], value: Value) {
        let (section_key, var) = split_key(key);
        let section_name: Vec<&str> = key[..key.len() - 1].to_vec();
        let idx = self.find_or_add_section(&section_key, &section_name);
        self.sections[idx].lines.push(variable_entry(&var, value));
    }

    /// Set a single-valued key; setting over multiple values is an error.
    pub fn set(&mut self, key: &[&str], value: Value) -> Result<(), ConfigError> {
        let (section_key, var) = split_key(key);
        let section_name: Vec<&str> = key[..key.len() - 1].to_vec();
        let idx = self.find_or_add_section(&section_key, &section_name);

        let matches: Vec<usize> = matching_lines(&self.sections[idx], &var);
        match matches.len() {
            0 => self.sections[idx].lines.push(variable_entry(&var, value)),
            1 => {
                let line = &mut self.sections[idx].lines[matches[0]];
                line.text = serialize_variable(&var, &value);
                line.variable = Some((var, value));
            }
            _ => {
                return Err(ConfigError::Conflict(
                    "cannot overwrite multiple values with a single value".into(),
                ))
            }
        }
        Ok(())
    }

    /// Remove a single-valued key; removing a multi-valued key is an error.
    pub fn unset(&mut self, key: &[&str]) -> Result<(), ConfigError> {
        self.unset_all(key, |count| {
            if count > 1 {
                Err(ConfigError::Conflict(format!(
                    "{} has multiple values",
                    key.join(".")
                )))
            } else {
                Ok(())
            }
        })
    }

    /// Remove every value of a key; `check` sees how many values exist
    /// before anything is touched. Dropping the last variable drops the
    /// whole section.
    pub fn unset_all(
        &mut self,
        key: &[&str],
        check: impl FnOnce(usize) -> Result<(), ConfigError>,
    ) -> Result<(), ConfigError> {
        let (section_key, var) = split_key(key);
        let Some(idx) = self.find_section_index(&section_key) else {
            return check(0);
        };

        let matches = matching_lines(&self.sections[idx], &var);
        check(matches.len())?;

        let section = &mut self.sections[idx];
        let keep: Vec<Line> = section
            .lines
            .iter()
            .filter(|line| line.normal_name().as_deref() != Some(var.as_str()))
            .cloned()
            .collect();
        section.lines = keep;

        if self.sections[idx].lines.len() == 1 {
            self.sections.remove(idx);
        }
        Ok(())
    }

    /// Remove an entire section. Returns whether it existed.
    pub fn remove_section(&mut self, name: &[&str]) -> bool {
        let key = normalize(name);
        let before = self.sections.len();
        self.sections.retain(|s| s.key != key);
        self.sections.len() != before
    }

    // ------------------------------------------------------------------

    fn find_section(&self, key: &SectionKey) -> Option<&SectionBlock> {
        self.sections.iter().find(|s| &s.key == key)
    }

    fn find_section_index(&self, key: &SectionKey) -> Option<usize> {
        self.sections.iter().position(|s| &s.key == key)
    }

    fn find_or_add_section(&mut self, key: &SectionKey, name: &[&str]) -> usize {
        if let Some(idx) = self.find_section_index(key) {
            return idx;
        }
        self.sections.push(SectionBlock {
            key: key.clone(),
            lines: vec![Line {
                text: heading_line(name),
                variable: None,
            }],
        });
        self.sections.len() - 1
    }

    fn read_config_file(&mut self) -> Result<(), ConfigError> {
        self.sections = Vec::new();

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut current = SectionBlock {
            key: normalize(&[]),
            lines: Vec::new(),
        };
        let mut started = false;
        let mut line_number = 0usize;

        for raw in logical_lines(&content) {
            line_number += raw.matches('\n').count().max(1);

            if let Some(caps) = section_line().captures(&raw) {
                if started || !current.lines.is_empty() {
                    self.push_section(current);
                }
                let head = caps.get(1).unwrap().as_str();
                let sub = caps.get(3).map(|m| m.as_str()).unwrap_or("");
                current = SectionBlock {
                    key: (head.to_ascii_lowercase(), sub.to_string()),
                    lines: vec![Line {
                        text: raw,
                        variable: None,
                    }],
                };
                started = true;
            } else if let Some(caps) = variable_line().captures(&raw) {
                let name = caps.get(1).unwrap().as_str().to_string();
                let value = Value::parse(caps.get(2).unwrap().as_str());
                current.lines.push(Line {
                    text: raw,
                    variable: Some((name, value)),
                });
            } else if blank_line().is_match(&raw) {
                current.lines.push(Line {
                    text: raw,
                    variable: None,
                });
            } else {
                return Err(ConfigError::Parse {
                    file: self.path.clone(),
                    line: line_number,
                });
            }
        }

        if started || !current.lines.is_empty() {
            self.push_section(current);
        }
        Ok(())
    }

    /// Reparsing may see the same section heading twice; merge bodies so
    /// lookups behave, keeping text in file order.
    fn push_section(&mut self, section: SectionBlock) {
        if let Some(existing) = self.sections.iter_mut().find(|s| s.key == section.key) {
            existing.lines.extend(section.lines);
        } else {
            self.sections.push(section);
        }
    }
}

fn split_key(key: &[&str]) -> (SectionKey, String) {
    let (var, section) = key.split_last().expect("config key with variable name");
    (normalize(section), var.to_ascii_lowercase())
}

fn matching_lines(section: &SectionBlock, var: &str) -> Vec<usize> {
    section
        .lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.normal_name().as_deref() == Some(var))
        .map(|(i, _)| i)
        .collect()
}

fn serialize_variable(name: &str, value: &Value) -> String {
    format!("\t{} = {}\n", name, value.to_display())
}

fn variable_entry(name: &str, value: Value) -> Line {
    Line {
        text: serialize_variable(name, &value),
        variable: Some((name.to_string(), value)),
    }
}

fn heading_line(name: &[&str]) -> String {
    let mut line = format!("[{}", name.first().copied().unwrap_or_default());
    if name.len() > 1 {
        line.push_str(&format!(" \"{}\"", name[1..].join(".")));
    }
    line.push_str("]\n");
    line
}

/// Split into logical lines, folding backslash-newline continuations.
fn logical_lines(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut buffer = String::new();

    for segment in content.split_inclusive('\n') {
        buffer.push_str(segment);
        if buffer.ends_with("\\\n") {
            continue;
        }
        out.push(std::mem::take(&mut buffer));
    }
    if !buffer.is_empty() {
        out.push(buffer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(content: &str) -> (tempfile::TempDir, ConfigFile) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, content).unwrap();
        let mut config = ConfigFile::new(&path);
        config.open().unwrap();
        (dir, config)
    }

    #[test]
    fn parses_sections_and_values() {
        let (_dir, config) = config_with(
            "[core]\n\tbare = false\n\teditor = vim\n[remote \"origin\"]\n\turl = /tmp/repo\n",
        );

        assert_eq!(config.get(&["core", "bare"]), Some(Value::Bool(false)));
        assert_eq!(
            config.get(&["core", "editor"]),
            Some(Value::Str("vim".into()))
        );
        assert_eq!(
            config.get(&["remote", "origin", "url"]),
            Some(Value::Str("/tmp/repo".into()))
        );
        assert!(config.section_exists(&["remote", "origin"]));
        assert_eq!(config.subsections("remote"), vec!["origin"]);
    }

    #[test]
    fn keys_are_case_insensitive_subsections_not() {
        let (_dir, config) = config_with("[Core]\n\tBare = true\n[branch \"Topic\"]\n\tremote = origin\n");

        assert_eq!(config.get(&["core", "bare"]), Some(Value::Bool(true)));
        assert_eq!(
            config.get(&["branch", "Topic", "remote"]),
            Some(Value::Str("origin".into()))
        );
        assert_eq!(config.get(&["branch", "topic", "remote"]), None);
    }

    #[test]
    fn value_typing() {
        let (_dir, config) = config_with(
            "[a]\n\tb = yes\n\tc = off\n\td = 42\n\te = -7\n\tf = hello world\n",
        );
        assert_eq!(config.get(&["a", "b"]), Some(Value::Bool(true)));
        assert_eq!(config.get(&["a", "c"]), Some(Value::Bool(false)));
        assert_eq!(config.get(&["a", "d"]), Some(Value::Int(42)));
        assert_eq!(config.get(&["a", "e"]), Some(Value::Int(-7)));
        assert_eq!(
            config.get(&["a", "f"]),
            Some(Value::Str("hello world".into()))
        );
    }

    #[test]
    fn comments_and_continuations() {
        let (_dir, config) = config_with(
            "# leading comment\n[a] ; trailing\n\tb = value ; ignored\n\tc = one\\\ntwo\n",
        );
        assert_eq!(config.get(&["a", "b"]), Some(Value::Str("value".into())));
        assert_eq!(config.get(&["a", "c"]), Some(Value::Str("onetwo".into())));
    }

    #[test]
    fn bad_line_reports_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, "[a]\n\tnot a variable\n").unwrap();
        let mut config = ConfigFile::new(&path);
        match config.open() {
            Err(ConfigError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn set_add_unset_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");

        let mut config = ConfigFile::new(&path);
        config.open_for_update().unwrap();
        config.set(&["user", "name"], "A. U. Thor".into()).unwrap();
        config.add(&["remote", "origin", "fetch"], "+refs/heads/*:refs/remotes/origin/*".into());
        config.add(&["remote", "origin", "fetch"], "+refs/tags/*:refs/tags/*".into());
        config.save().unwrap();

        let mut reread = ConfigFile::new(&path);
        reread.open().unwrap();
        assert_eq!(
            reread.get(&["user", "name"]),
            Some(Value::Str("A. U. Thor".into()))
        );
        assert_eq!(reread.get_all(&["remote", "origin", "fetch"]).len(), 2);

        // Setting over two values must refuse.
        let mut editing = ConfigFile::new(&path);
        editing.open_for_update().unwrap();
        assert!(matches!(
            editing.set(&["remote", "origin", "fetch"], "x".into()),
            Err(ConfigError::Conflict(_))
        ));
        editing.rollback().unwrap();
    }

    #[test]
    fn unset_last_variable_drops_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");

        let mut config = ConfigFile::new(&path);
        config.open_for_update().unwrap();
        config.set(&["branch", "topic", "remote"], "origin".into()).unwrap();
        config.save().unwrap();

        let mut editing = ConfigFile::new(&path);
        editing.open_for_update().unwrap();
        editing.unset(&["branch", "topic", "remote"]).unwrap();
        editing.save().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.trim().is_empty());
    }

    #[test]
    fn edits_preserve_unrelated_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, "# keep me\n[core]\n\tbare = false\n").unwrap();

        let mut config = ConfigFile::new(&path);
        config.open_for_update().unwrap();
        config.set(&["user", "email"], "a@b.com".into()).unwrap();
        config.save().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# keep me\n[core]\n\tbare = false\n"));
        assert!(content.contains("[user]\n\temail = a@b.com\n"));
    }

    #[test]
    fn remove_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, "[remote \"origin\"]\n\turl = /r\n[core]\n\tbare = true\n").unwrap();

        let mut config = ConfigFile::new(&path);
        config.open_for_update().unwrap();
        assert!(config.remove_section(&["remote", "origin"]));
        assert!(!config.remove_section(&["remote", "upstream"]));
        config.save().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("origin"));
        assert!(content.contains("[core]"));
    }
}
