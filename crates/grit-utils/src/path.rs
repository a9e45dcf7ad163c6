//! Helpers for repository-relative paths.
//!
//! Tracked paths are byte strings with `/` separators, independent of the
//! platform path type. Conversion to filesystem paths happens only at the
//! workspace boundary.

use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};

/// Split a repo path into its components: `"a/b/c"` → `["a", "b", "c"]`.
pub fn components(path: &BStr) -> Vec<&BStr> {
    path.split(|&b| b == b'/')
        .filter(|c| !c.is_empty())
        .map(BStr::new)
        .collect()
}

/// All proper ancestor directories, shallowest first:
/// `"a/b/c"` → `["a", "a/b"]`.
pub fn parent_directories(path: &BStr) -> Vec<BString> {
    let mut dirs = Vec::new();
    for (i, &b) in path.iter().enumerate() {
        if b == b'/' {
            dirs.push(BString::from(&path[..i]));
        }
    }
    dirs
}

/// The final component of a path.
pub fn basename(path: &BStr) -> &BStr {
    match path.rfind_byte(b'/') {
        Some(pos) => BStr::new(&path[pos + 1..]),
        None => path,
    }
}

/// Everything before the final component, or `""` for a top-level name.
pub fn dirname(path: &BStr) -> &BStr {
    match path.rfind_byte(b'/') {
        Some(pos) => BStr::new(&path[..pos]),
        None => BStr::new(b""),
    }
}

/// Join two repo paths; either side may be empty.
pub fn join(a: &BStr, b: &BStr) -> BString {
    if a.is_empty() {
        return BString::from(b);
    }
    if b.is_empty() {
        return BString::from(a);
    }
    let mut out = BString::from(a);
    out.push(b'/');
    out.extend_from_slice(b);
    out
}

/// Does `path` live inside directory `dir` (strictly)?
pub fn descends_from(path: &BStr, dir: &BStr) -> bool {
    path.len() > dir.len() && path.starts_with(dir) && path[dir.len()] == b'/'
}

/// Resolve a repo path against a filesystem root.
#[cfg(unix)]
pub fn to_os_path(root: &Path, rel: &BStr) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    root.join(OsStr::from_bytes(rel))
}

/// Resolve a repo path against a filesystem root (non-Unix fallback).
#[cfg(not(unix))]
pub fn to_os_path(root: &Path, rel: &BStr) -> PathBuf {
    root.join(rel.to_str_lossy().as_ref())
}

/// Convert a filesystem path relative to `root` into a repo path.
#[cfg(unix)]
pub fn from_os_path(root: &Path, full: &Path) -> Option<BString> {
    use std::os::unix::ffi::OsStrExt;
    let rel = full.strip_prefix(root).ok()?;
    let mut out = BString::from("");
    for comp in rel.components() {
        if !out.is_empty() {
            out.push(b'/');
        }
        out.extend_from_slice(comp.as_os_str().as_bytes());
    }
    Some(out)
}

/// Convert a filesystem path relative to `root` into a repo path (non-Unix).
#[cfg(not(unix))]
pub fn from_os_path(root: &Path, full: &Path) -> Option<BString> {
    let rel = full.strip_prefix(root).ok()?;
    let mut out = BString::from("");
    for comp in rel.components() {
        if !out.is_empty() {
            out.push(b'/');
        }
        out.extend_from_slice(comp.as_os_str().to_string_lossy().as_bytes());
    }
    Some(out)
}
