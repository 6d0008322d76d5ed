//! End-to-end runs of the digest pipeline over a temp events directory.
//!
//! Covers the run-level guarantees: idempotent summaries, a roster that only
//! grows with genuinely new users, at-most-once digesting per file, and
//! stable ordering of digests that share an hour.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use event_digest_core::config::DigestConfig;
use event_digest_core::digest::Digest;
use event_digest_core::pipeline::Pipeline;
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

fn write_events(dir: &Path, name: &str, logins: &[&str]) -> PathBuf {
    let body = logins
        .iter()
        .map(|n| format!(r#"{{"type":"PushEvent","actor":{{"login":"{n}"}},"repo":{{"name":"x/y"}}}}"#))
        .collect::<Vec<_>>()
        .join("\n");
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(body.as_bytes()).expect("gzip events");
    let path = dir.join(name);
    fs::write(&path, enc.finish().expect("finish gzip")).expect("write events");
    path
}

fn pipeline(dir: &Path) -> Pipeline {
    Pipeline::new(DigestConfig {
        events_dir: dir.to_path_buf(),
        lock_timeout_ms: 500,
        ..DigestConfig::default()
    })
}

fn read_summary(dir: &Path) -> Vec<Digest> {
    let raw = fs::read_to_string(dir.join("summary.json")).expect("read summary");
    serde_json::from_str(&raw).expect("parse summary")
}

fn roster_lines(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("users.txt"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn second_run_is_idempotent() {
    let tmp = TempDir::new().expect("temp dir");
    write_events(tmp.path(), "2021-03-07-9.json.gz", &["Alice", "bob"]);
    write_events(tmp.path(), "2021-03-07-10.json.gz", &["carol", "alice"]);

    let first = pipeline(tmp.path()).run().expect("first run");
    assert_eq!(first.computed, 2);
    assert_eq!(first.new_users, 3);
    let summary_1 = fs::read(tmp.path().join("summary.json")).expect("summary");
    let roster_1 = roster_lines(tmp.path());

    let second = pipeline(tmp.path()).run().expect("second run");
    assert_eq!(second.cached, 2);
    assert_eq!(second.computed, 0);
    assert_eq!(second.new_users, 0);

    assert_eq!(fs::read(tmp.path().join("summary.json")).expect("summary"), summary_1);
    assert_eq!(roster_lines(tmp.path()), roster_1);
}

#[test]
fn summary_is_sorted_by_hour_not_by_name() {
    let tmp = TempDir::new().expect("temp dir");
    // Lexical order puts -10 before -9; the summary must not.
    write_events(tmp.path(), "2021-03-07-10.json.gz", &["a", "b"]);
    write_events(tmp.path(), "2021-03-07-9.json.gz", &["a"]);
    write_events(tmp.path(), "2021-03-06-23.json.gz", &["c", "d", "e"]);

    pipeline(tmp.path()).run().expect("run");
    let summary = read_summary(tmp.path());

    let rendered: Vec<String> = summary
        .iter()
        .map(|d| format!("{}={}", d.date.format("%d-%H"), d.count))
        .collect();
    assert_eq!(rendered, vec!["06-23=3", "07-09=1", "07-10=2"]);
}

#[test]
fn same_hour_digests_keep_discovery_order() {
    let tmp = TempDir::new().expect("temp dir");
    write_events(tmp.path(), "a-2021-03-07-9.json.gz", &["x"]);
    write_events(tmp.path(), "b-2021-03-07-9.json.gz", &["x", "y"]);
    write_events(tmp.path(), "c-2021-03-07-9.json.gz", &["x", "y", "z"]);

    pipeline(tmp.path()).run().expect("run");
    let counts: Vec<u64> = read_summary(tmp.path()).iter().map(|d| d.count).collect();
    assert_eq!(counts, vec![1, 2, 3]);
}

#[test]
fn case_variants_collapse_in_roster() {
    let tmp = TempDir::new().expect("temp dir");
    write_events(tmp.path(), "2021-03-07-1.json.gz", &["Alice", "ALICE"]);
    write_events(tmp.path(), "2021-03-07-2.json.gz", &["alice", "Bob"]);

    pipeline(tmp.path()).run().expect("run");
    assert_eq!(roster_lines(tmp.path()), vec!["alice", "bob"]);
}

#[test]
fn roster_only_receives_users_absent_from_it() {
    let tmp = TempDir::new().expect("temp dir");
    fs::write(tmp.path().join("users.txt"), "Alice\ndave\n").expect("seed roster");
    write_events(tmp.path(), "2021-03-07-1.json.gz", &["alice", "bob", "DAVE", "erin"]);

    let report = pipeline(tmp.path()).run().expect("run");
    assert_eq!(report.new_users, 2);
    assert_eq!(roster_lines(tmp.path()), vec!["Alice", "dave", "bob", "erin"]);
}

#[test]
fn new_files_are_picked_up_without_recomputing_old_ones() {
    let tmp = TempDir::new().expect("temp dir");
    let old = write_events(tmp.path(), "2021-03-07-1.json.gz", &["alice"]);
    pipeline(tmp.path()).run().expect("first run");

    // If the old file were re-read, its new content would change the count.
    write_events(tmp.path(), "2021-03-07-1.json.gz", &["alice", "zed", "zoe"]);
    assert!(old.exists());
    write_events(tmp.path(), "2021-03-07-2.json.gz", &["bob"]);

    let report = pipeline(tmp.path()).run().expect("second run");
    assert_eq!(report.cached, 1);
    assert_eq!(report.computed, 1);

    let counts: Vec<u64> = read_summary(tmp.path()).iter().map(|d| d.count).collect();
    assert_eq!(counts, vec![1, 1]);
    assert_eq!(roster_lines(tmp.path()), vec!["alice", "bob"]);
}

#[test]
fn empty_events_dir_writes_empty_summary() {
    let tmp = TempDir::new().expect("temp dir");
    let report = pipeline(tmp.path()).run().expect("run");

    assert!(report.files.is_empty());
    assert!(read_summary(tmp.path()).is_empty());
    assert!(roster_lines(tmp.path()).is_empty());
}

#[test]
fn date_is_taken_from_filename() {
    let tmp = TempDir::new().expect("temp dir");
    write_events(tmp.path(), "events-2021-03-07-9.json.gz", &["a"]);

    pipeline(tmp.path()).run().expect("run");
    let raw = fs::read_to_string(tmp.path().join("summary.json")).expect("summary");
    assert_eq!(raw, "[{\"count\":1,\"date\":\"2021-03-07T09:00:00Z\"}]\n");
}

#[test]
fn hand_edited_roster_without_trailing_newline() {
    let tmp = TempDir::new().expect("temp dir");
    fs::write(tmp.path().join("users.txt"), "alice").expect("seed roster");
    write_events(tmp.path(), "2021-03-07-1.json.gz", &["alice", "bob"]);

    let first = pipeline(tmp.path()).run().expect("first run");
    assert_eq!(first.new_users, 1);
    assert_eq!(roster_lines(tmp.path()), vec!["alice", "bob"]);

    let second = pipeline(tmp.path()).run().expect("second run");
    assert_eq!(second.new_users, 0);
    assert_eq!(roster_lines(tmp.path()), vec!["alice", "bob"]);
}

#[test]
fn undecodable_roster_line_does_not_duplicate_known_users() {
    let tmp = TempDir::new().expect("temp dir");
    fs::write(tmp.path().join("users.txt"), b"alice\nbob\n\xff\xfe\n").expect("seed roster");
    write_events(tmp.path(), "2021-03-07-1.json.gz", &["alice", "bob"]);

    let report = pipeline(tmp.path()).run().expect("run");
    assert_eq!(report.new_users, 0);
    assert_eq!(
        fs::read(tmp.path().join("users.txt")).expect("roster"),
        b"alice\nbob\n\xff\xfe\n"
    );
}
