//! Fetch and push over the file transport, with the pack exchange running
//! through real `upload-pack`/`receive-pack` agent processes.

mod common;

use common::{commit_all, grit, init_repo, read_file, write_file};

/// A local repo with `origin` pointing at a second repository that accepts
/// pushes into its checked-out branch.
fn setup_pair(local: &std::path::Path, remote: &std::path::Path) {
    init_repo(remote);
    grit(remote, &["config", "receive.denyCurrentBranch", "false"])
        .assert_code(0);

    init_repo(local);
    grit(local, &["remote", "add", "origin", &remote.display().to_string()])
        .assert_code(0);
}

#[test]
fn push_publishes_commits_and_fetch_mirrors_them() {
    let local_dir = tempfile::tempdir().unwrap();
    let remote_dir = tempfile::tempdir().unwrap();
    let (local, remote) = (local_dir.path(), remote_dir.path());
    setup_pair(local, remote);

    write_file(local, "a.txt", "1\n");
    write_file(local, "out/b.txt", "2\n");
    commit_all(local, "first");
    write_file(local, "out/b.txt", "4\n");
    commit_all(local, "second");

    let result = grit(local, &["push", "origin", "master"]);
    result.assert_code(0);
    assert!(result.stderr.contains("To "));
    assert!(result.stderr.contains("[new branch]"));

    // Remote now holds the same branch tip and all objects.
    let local_tip = read_file(local, ".git/refs/heads/master");
    let remote_tip = read_file(remote, ".git/refs/heads/master");
    assert_eq!(local_tip, remote_tip);

    // The tracking ref mirrors the remote's target ref.
    let tracking = read_file(local, ".git/refs/remotes/origin/master");
    assert_eq!(tracking, remote_tip);

    // A third repository can fetch everything back.
    let clone_dir = tempfile::tempdir().unwrap();
    let clone = clone_dir.path();
    init_repo(clone);
    grit(clone, &["remote", "add", "origin", &remote.display().to_string()])
        .assert_code(0);

    let result = grit(clone, &["fetch"]);
    result.assert_code(0);
    assert!(result.stderr.contains("From "));
    assert_eq!(
        read_file(clone, ".git/refs/remotes/origin/master"),
        remote_tip
    );

    grit(clone, &["checkout", "origin/master"]).assert_code(0);
    assert_eq!(read_file(clone, "a.txt"), "1\n");
    assert_eq!(read_file(clone, "out/b.txt"), "4\n");
}

#[test]
fn non_fast_forward_push_is_rejected_then_forced() {
    let local_dir = tempfile::tempdir().unwrap();
    let remote_dir = tempfile::tempdir().unwrap();
    let (local, remote) = (local_dir.path(), remote_dir.path());
    setup_pair(local, remote);

    write_file(local, "f.txt", "shared\n");
    commit_all(local, "shared");
    grit(local, &["push", "origin", "master"]).assert_code(0);

    // Both sides advance independently.
    write_file(remote, "f.txt", "remote change\n");
    commit_all(remote, "remote-side");

    write_file(local, "f.txt", "local change\n");
    commit_all(local, "local-side");

    let tracking_before = read_file(local, ".git/refs/remotes/origin/master");

    let result = grit(local, &["push", "origin", "master"]);
    result.assert_code(1);
    assert!(result.stderr.contains(" ! [rejected] master -> master (fetch first)"));
    assert_eq!(
        read_file(local, ".git/refs/remotes/origin/master"),
        tracking_before
    );

    // Forced push wins and reports the forced update.
    let result = grit(local, &["push", "-f", "origin", "master"]);
    result.assert_code(0);
    assert!(result.stderr.contains("(forced update)"));
    assert!(result.stderr.contains(" + "));

    assert_eq!(
        read_file(local, ".git/refs/heads/master"),
        read_file(remote, ".git/refs/heads/master")
    );
}

#[test]
fn push_without_changes_is_up_to_date() {
    let local_dir = tempfile::tempdir().unwrap();
    let remote_dir = tempfile::tempdir().unwrap();
    let (local, remote) = (local_dir.path(), remote_dir.path());
    setup_pair(local, remote);

    write_file(local, "f.txt", "x\n");
    commit_all(local, "only");
    grit(local, &["push", "origin", "master"]).assert_code(0);

    let result = grit(local, &["push", "origin", "master"]);
    result.assert_code(0);
    assert!(result.stderr.contains("Everything up-to-date"));
}

#[test]
fn fetch_then_merge_tracks_upstream_changes() {
    let local_dir = tempfile::tempdir().unwrap();
    let remote_dir = tempfile::tempdir().unwrap();
    let (local, remote) = (local_dir.path(), remote_dir.path());
    setup_pair(local, remote);

    write_file(local, "f.txt", "v1\n");
    commit_all(local, "v1");
    grit(local, &["push", "origin", "master"]).assert_code(0);

    write_file(remote, "f.txt", "v2\n");
    commit_all(remote, "v2");

    grit(local, &["fetch", "origin"]).assert_code(0);
    grit(local, &["merge", "origin/master", "-m", "sync"]).assert_code(0);

    assert_eq!(read_file(local, "f.txt"), "v2\n");
    assert_eq!(
        read_file(local, ".git/refs/heads/master"),
        read_file(remote, ".git/refs/heads/master")
    );
}

#[test]
fn fetched_objects_load_from_pack_or_loose_identically() {
    // Two blobs, 512 and 523 bytes, the second extending the first; after
    // a push the receiving database serves both byte-identically.
    let local_dir = tempfile::tempdir().unwrap();
    let remote_dir = tempfile::tempdir().unwrap();
    let (local, remote) = (local_dir.path(), remote_dir.path());
    setup_pair(local, remote);

    let base: String = "x".repeat(512);
    let extended = format!("{base}elevenbytes");
    assert_eq!(extended.len(), 523);

    write_file(local, "base.bin", &base);
    write_file(local, "extended.bin", &extended);
    commit_all(local, "two blobs");
    grit(local, &["push", "origin", "master"]).assert_code(0);

    let repo = grit_repository::Repository::new(remote.join(".git"));
    let head = repo.refs.read_head().unwrap().unwrap();
    let tree = repo.load_tree_list(Some(head)).unwrap();

    let base_entry = tree[&bstr::BString::from("base.bin")];
    let extended_entry = tree[&bstr::BString::from("extended.bin")];

    let loaded = repo.database.load_raw(&base_entry.oid).unwrap().unwrap();
    assert_eq!(loaded.data, base.as_bytes());
    let loaded = repo.database.load_raw(&extended_entry.oid).unwrap().unwrap();
    assert_eq!(loaded.data, extended.as_bytes());

    let info = repo.database.load_info(&base_entry.oid).unwrap().unwrap();
    assert_eq!(info.size, 512);
    let info = repo.database.load_info(&extended_entry.oid).unwrap().unwrap();
    assert_eq!(info.size, 523);
}
