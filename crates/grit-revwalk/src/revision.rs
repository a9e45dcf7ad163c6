//! Revision expressions.
//!
//! Grammar (suffix operators, longest match):
//!
//! ```text
//! rev := ref ( '^' N? | '~' N | '@{u[pstream]}' )*
//! ref := HEAD | @ | <name> | <hex prefix>
//! ```
//!
//! Resolution failures accumulate user-facing errors (with hints for the
//! ambiguous-prefix case) and surface as a terminal `InvalidObject`.

use std::sync::OnceLock;

use grit_hash::ObjectId;
use grit_object::{Object, ObjectType};
use grit_repository::Repository;
use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum RevisionError {
    #[error("Not a valid object name: '{0}'.")]
    InvalidObject(String),

    #[error(transparent)]
    Repo(#[from] grit_repository::RepoError),
}

impl From<grit_odb::OdbError> for RevisionError {
    fn from(e: grit_odb::OdbError) -> Self {
        Self::Repo(e.into())
    }
}

impl From<grit_ref::RefError> for RevisionError {
    fn from(e: grit_ref::RefError) -> Self {
        Self::Repo(e.into())
    }
}

/// An error with optional `hint:` lines for the user.
#[derive(Debug, Clone)]
pub struct HintedError {
    pub message: String,
    pub hint: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rev {
    Ref { name: String },
    Parent { rev: Box<Rev>, n: usize },
    Ancestor { rev: Box<Rev>, n: usize },
    Upstream { rev: Box<Rev> },
}

fn parent_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.+)\^(\d*)$").unwrap())
}

fn ancestor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.+)~(\d+)$").unwrap())
}

fn upstream_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^(.*)@\{u(pstream)?\}$").unwrap())
}

fn parse(expr: &str) -> Option<Rev> {
    if let Some(caps) = parent_pattern().captures(expr) {
        let rev = parse(caps.get(1).unwrap().as_str())?;
        let n = match caps.get(2).unwrap().as_str() {
            "" => 1,
            digits => digits.parse().ok()?,
        };
        return Some(Rev::Parent {
            rev: Box::new(rev),
            n,
        });
    }

    if let Some(caps) = upstream_pattern().captures(expr) {
        let rev = parse_ref_alias(caps.get(1).unwrap().as_str())?;
        return Some(Rev::Upstream { rev: Box::new(rev) });
    }

    if let Some(caps) = ancestor_pattern().captures(expr) {
        let rev = parse(caps.get(1).unwrap().as_str())?;
        let n = caps.get(2).unwrap().as_str().parse().ok()?;
        return Some(Rev::Ancestor {
            rev: Box::new(rev),
            n,
        });
    }

    parse_ref_alias(expr)
}

fn parse_ref_alias(expr: &str) -> Option<Rev> {
    let name = match expr {
        "" | "@" => "HEAD",
        other => other,
    };
    if name == "HEAD" || grit_ref::name::is_valid(name) {
        Some(Rev::Ref {
            name: name.to_string(),
        })
    } else {
        None
    }
}

/// Is `expr` usable as a plain ref name?
pub fn valid_ref(expr: &str) -> bool {
    grit_ref::name::is_valid(expr)
}

pub struct Revision<'a> {
    repo: &'a Repository,
    expr: String,
    query: Option<Rev>,
    pub errors: Vec<HintedError>,
}

impl<'a> Revision<'a> {
    pub fn new(repo: &'a Repository, expr: &str) -> Self {
        Self {
            repo,
            expr: expr.to_string(),
            query: parse(expr),
            errors: Vec::new(),
        }
    }

    /// Resolve to any object.
    pub fn resolve(&mut self) -> Result<ObjectId, RevisionError> {
        self.resolve_typed(None)
    }

    /// Resolve and require a commit.
    pub fn resolve_commit(&mut self) -> Result<ObjectId, RevisionError> {
        self.resolve_typed(Some(ObjectType::Commit))
    }

    fn resolve_typed(&mut self, ty: Option<ObjectType>) -> Result<ObjectId, RevisionError> {
        let query = self.query.clone();
        let mut oid = match query {
            Some(query) => self.resolve_query(&query)?,
            None => None,
        };

        if let (Some(found), Some(ty)) = (oid, ty) {
            if self.load_typed_object(&found, ty)?.is_none() {
                oid = None;
            }
        }

        oid.ok_or_else(|| RevisionError::InvalidObject(self.expr.clone()))
    }

    fn resolve_query(&mut self, query: &Rev) -> Result<Option<ObjectId>, RevisionError> {
        match query {
            Rev::Ref { name } => self.read_ref(name),
            Rev::Parent { rev, n } => {
                let oid = self.resolve_query(rev)?;
                self.commit_parent(oid, *n)
            }
            Rev::Ancestor { rev, n } => {
                let mut oid = self.resolve_query(rev)?;
                for _ in 0..*n {
                    oid = self.commit_parent(oid, 1)?;
                }
                Ok(oid)
            }
            Rev::Upstream { rev } => {
                let Rev::Ref { name } = rev.as_ref() else {
                    return Ok(None);
                };
                let Some(upstream) = self.upstream(name)? else {
                    return Ok(None);
                };
                self.read_ref(&upstream)
            }
        }
    }

    /// The remote-tracking ref configured for a branch; `HEAD` means the
    /// currently checked-out branch.
    fn upstream(&self, name: &str) -> Result<Option<String>, RevisionError> {
        let branch = if name == "HEAD" {
            let current = self.repo.refs.current_ref()?;
            current.short_name(&self.repo.refs)
        } else {
            name.to_string()
        };
        Ok(self.repo.remotes().get_upstream(&branch))
    }

    fn commit_parent(
        &mut self,
        oid: Option<ObjectId>,
        n: usize,
    ) -> Result<Option<ObjectId>, RevisionError> {
        let Some(oid) = oid else { return Ok(None) };

        let Some(object) = self.load_typed_object(&oid, ObjectType::Commit)? else {
            return Ok(None);
        };
        let Object::Commit(commit) = object else {
            return Ok(None);
        };

        if n == 0 || n > commit.parents.len() {
            return Ok(None);
        }
        Ok(Some(commit.parents[n - 1]))
    }

    fn load_typed_object(
        &mut self,
        oid: &ObjectId,
        ty: ObjectType,
    ) -> Result<Option<Object>, RevisionError> {
        let object = self.repo.database.load(oid)?;
        if object.object_type() == ty {
            Ok(Some(object))
        } else {
            self.errors.push(HintedError {
                message: format!(
                    "object {} is a {}, not a {}",
                    oid.to_hex(),
                    object.object_type(),
                    ty
                ),
                hint: Vec::new(),
            });
            Ok(None)
        }
    }

    /// A name is first a ref, then an object-ID prefix. A unique prefix
    /// match wins; multiple matches log the candidates as a hint.
    fn read_ref(&mut self, name: &str) -> Result<Option<ObjectId>, RevisionError> {
        if let Some(oid) = self.repo.refs.read_ref(name)? {
            return Ok(Some(oid));
        }

        let candidates = self.repo.database.prefix_match(name)?;
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(Some(candidates[0])),
            _ => {
                self.log_ambiguous_sha1(name, &candidates)?;
                Ok(None)
            }
        }
    }

    fn log_ambiguous_sha1(
        &mut self,
        name: &str,
        candidates: &[ObjectId],
    ) -> Result<(), RevisionError> {
        let mut objects = Vec::new();
        let mut sorted = candidates.to_vec();
        sorted.sort();

        for oid in sorted {
            let object = self.repo.database.load(&oid)?;
            let short = self.repo.database.short_oid(&oid);
            let line = match &object {
                Object::Commit(commit) => format!(
                    "  {short} commit {} - {}",
                    commit.author.date.short_date(),
                    commit.title_line()
                ),
                other => format!("  {short} {}", other.object_type()),
            };
            objects.push(line);
        }

        let mut hint = vec!["The candidates are:".to_string()];
        hint.extend(objects);
        self.errors.push(HintedError {
            message: format!("short SHA1 {name} is ambiguous"),
            hint,
        });
        Ok(())
    }
}
