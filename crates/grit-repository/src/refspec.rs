//! Refspecs: `[+]<src>:<dst>` mappings with `*` wildcards.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

const REFS_DIR: &str = "refs";
const HEADS_DIR: &str = "refs/heads";
const REMOTES_DIR: &str = "refs/remotes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refspec {
    pub source: String,
    pub target: String,
    pub forced: bool,
}

fn refspec_format() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\+?)([^:]*)(:([^:]*))?$").unwrap())
}

impl Refspec {
    pub fn new(source: impl Into<String>, target: impl Into<String>, forced: bool) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            forced,
        }
    }

    /// Parse a refspec, canonicalizing both sides: bare branch names gain
    /// the `refs/heads/` prefix, recognized top-level dirs stay put.
    pub fn parse(spec: &str) -> Self {
        let caps = refspec_format().captures(spec);
        let (forced, source, target) = match &caps {
            Some(caps) => (
                !caps.get(1).map(|m| m.as_str().is_empty()).unwrap_or(true),
                caps.get(2).map(|m| m.as_str()).unwrap_or(""),
                caps.get(4).map(|m| m.as_str()),
            ),
            None => (false, spec, None),
        };

        let source = canonical(source).unwrap_or_default();
        let target = target
            .and_then(canonical)
            .unwrap_or_else(|| source.clone());

        Self {
            source,
            target,
            forced,
        }
    }

    /// Expand specs against a set of existing refs:
    /// target name → (source name, forced).
    pub fn expand(specs: &[String], refs: &[String]) -> BTreeMap<String, (String, bool)> {
        let mut mappings = BTreeMap::new();
        for spec in specs {
            mappings.extend(Self::parse(spec).match_refs(refs));
        }
        mappings
    }

    /// Map a remote-side ref back through the specs (source and target
    /// swapped); used to find the tracking ref for an upstream branch.
    pub fn invert(specs: &[String], ref_name: &str) -> Option<String> {
        let mut mappings = BTreeMap::new();
        for spec in specs {
            let mut parsed = Self::parse(spec);
            std::mem::swap(&mut parsed.source, &mut parsed.target);
            mappings.extend(parsed.match_refs(std::slice::from_ref(&ref_name.to_string())));
        }
        mappings.keys().next().cloned()
    }

    /// Match a source pattern against refs, substituting the wildcard
    /// segment into the target.
    pub fn match_refs(&self, refs: &[String]) -> BTreeMap<String, (String, bool)> {
        if !self.source.contains('*') {
            return BTreeMap::from([(
                self.target.clone(),
                (self.source.clone(), self.forced),
            )]);
        }

        let pattern = format!(
            "^{}$",
            regex::escape(&self.source).replacen(r"\*", "(.*)", 1)
        );
        let matcher = Regex::new(&pattern).expect("refspec wildcard pattern");

        let mut mappings = BTreeMap::new();
        for ref_name in refs {
            let Some(caps) = matcher.captures(ref_name) else {
                continue;
            };
            let wildcard = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let target = if wildcard.is_empty() {
                self.target.clone()
            } else {
                self.target.replacen('*', wildcard, 1)
            };
            mappings.insert(target, (ref_name.clone(), self.forced));
        }
        mappings
    }
}

impl fmt::Display for Refspec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plus = if self.forced { "+" } else { "" };
        write!(f, "{plus}{}:{}", self.source, self.target)
    }
}

/// Give a ref name its full `refs/…` spelling. Invalid names (wildcards
/// aside, e.g. raw OIDs) pass through untouched; an empty name is `None`
/// (deletion specs).
fn canonical(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }

    let check = name.replace('*', "x");
    if !grit_ref::name::is_valid(&check) {
        return Some(name.to_string());
    }

    let first = name.split('/').next().unwrap_or("");
    for dir in [REFS_DIR, HEADS_DIR, REMOTES_DIR] {
        let dir_name = dir.rsplit('/').next().unwrap();
        if first == dir_name {
            let parent = match dir {
                REFS_DIR => "",
                _ => "refs/",
            };
            return Some(format!("{parent}{name}"));
        }
    }
    Some(format!("{HEADS_DIR}/{name}"))
}
