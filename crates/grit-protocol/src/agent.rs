//! Server-side (agent) helpers shared by upload-pack and receive-pack.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use grit_repository::Repository;

use crate::{Protocol, ProtocolError, ZERO_OID_HEX};

/// Locate a repository's `.git` directory at or above `start`; `start` may
/// itself be a git directory (a bare layout).
pub fn detect_git_dir(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().ok()?;

    for ancestor in std::iter::once(start.as_path()).chain(start.ancestors().skip(1)) {
        for candidate in [ancestor.to_path_buf(), ancestor.join(".git")] {
            if is_git_repository(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

fn is_git_repository(dirname: &Path) -> bool {
    dirname.join("HEAD").exists()
        && dirname.join("objects").is_dir()
        && dirname.join("refs").is_dir()
}

/// Advertise every ref, sorted by name, ending with a flush. An empty
/// repository sends the zero-OID capabilities placeholder so capabilities
/// still travel.
pub fn send_references<R: Read, W: Write>(
    repo: &Repository,
    conn: &mut Protocol<R, W>,
) -> Result<(), ProtocolError> {
    let mut refs = repo.refs.list_all_refs().map_err(grit_repository::RepoError::from)?;
    refs.sort_by(|a, b| a.path.cmp(&b.path));

    let mut sent = false;
    for symref in refs {
        let Some(oid) = symref
            .read_oid(&repo.refs)
            .map_err(grit_repository::RepoError::from)?
        else {
            continue;
        };
        let line = format!("{} {}", oid.to_hex(), symref.path);
        conn.send_packet(Some(line.as_bytes()))?;
        sent = true;
    }

    if !sent {
        let line = format!("{ZERO_OID_HEX} capabilities^{{}}");
        conn.send_packet(Some(line.as_bytes()))?;
    }

    conn.send_packet(None)?;
    Ok(())
}
