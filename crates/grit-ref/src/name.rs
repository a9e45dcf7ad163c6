//! Ref name validation.

use std::sync::OnceLock;

use regex::Regex;

/// Patterns a ref or branch name may not contain: leading dots, `..`,
/// trailing slashes, `.lock` suffixes, `@{`, and control or glob
/// characters.
fn invalid_name() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\.|/\.|\.\.|/$|\.lock$|@\{|[\x00-\x20*:?\[\\^~\x7f]").unwrap()
    })
}

/// Is `name` acceptable as a ref or branch name?
pub fn is_valid(name: &str) -> bool {
    !name.is_empty() && !invalid_name().is_match(name)
}
