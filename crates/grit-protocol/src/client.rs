//! Client-side helpers shared by fetch and push.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::OnceLock;

use grit_hash::ObjectId;
use regex::bytes::Regex;

use crate::{Protocol, ProtocolError};

fn ref_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([0-9a-f]+) (.*)$").unwrap())
}

/// Read the ref advertisement: `ref name → oid`, zero OIDs (the empty-repo
/// capabilities placeholder) skipped.
pub fn recv_references<R: Read, W: Write>(
    conn: &mut Protocol<R, W>,
) -> Result<BTreeMap<String, ObjectId>, ProtocolError> {
    let mut remote_refs = BTreeMap::new();

    for line in conn.recv_until(None)? {
        let Some(caps) = ref_line().captures(&line) else {
            continue;
        };
        let oid_hex = String::from_utf8_lossy(caps.get(1).unwrap().as_bytes()).to_lowercase();
        let name = String::from_utf8_lossy(caps.get(2).unwrap().as_bytes()).into_owned();

        let Ok(oid) = ObjectId::from_hex(&oid_hex) else {
            continue;
        };
        if oid.is_zero() {
            continue;
        }
        remote_refs.insert(name, oid);
    }

    Ok(remote_refs)
}

/// One formatted per-ref report line for fetch/push output, mirroring
/// git's ` <flag> <summary> <from> -> <to> (<reason>)` shape.
pub fn format_ref_update(
    short_names: (Option<&str>, Option<&str>),
    error: Option<&str>,
    old_oid: Option<ObjectId>,
    new_oid: Option<ObjectId>,
    is_fast_forward: bool,
) -> Option<String> {
    if let Some(error) = error {
        return Some(show_ref_update("!", "[rejected]", short_names, Some(error)));
    }
    if old_oid == new_oid {
        return None;
    }

    match (old_oid, new_oid) {
        (None, Some(_)) => Some(show_ref_update("*", "[new branch]", short_names, None)),
        (Some(_), None) => Some(show_ref_update("-", "[deleted]", short_names, None)),
        (Some(old), Some(new)) => {
            if is_fast_forward {
                let range = format!("{}..{}", old.short(), new.short());
                Some(show_ref_update(" ", &range, short_names, None))
            } else {
                let range = format!("{}...{}", old.short(), new.short());
                Some(show_ref_update("+", &range, short_names, Some("forced update")))
            }
        }
        (None, None) => None,
    }
}

fn show_ref_update(
    flag: &str,
    summary: &str,
    short_names: (Option<&str>, Option<&str>),
    reason: Option<&str>,
) -> String {
    let names: Vec<&str> = [short_names.0, short_names.1].into_iter().flatten().collect();
    let mut line = format!(" {flag} {summary} {}", names.join(" -> "));
    if let Some(reason) = reason {
        line.push_str(&format!(" ({reason})"));
    }
    line
}
