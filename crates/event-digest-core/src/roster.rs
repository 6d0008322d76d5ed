//! The roster: every username ever observed, one per line, append-only.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::users::{Username, UsernameSet};

/// Parse roster content into a set. Blank lines are skipped and every entry
/// is canonicalized, so a hand-edited roster still dedupes by case.
///
/// Lines that are not valid UTF-8 are skipped on their own; the rest of the
/// roster still counts as known.
#[must_use]
pub fn parse_roster(content: impl AsRef<[u8]>) -> UsernameSet {
    let mut undecodable = 0usize;
    let users = content
        .as_ref()
        .split(|b| *b == b'\n')
        .filter_map(|line| {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if let Ok(text) = std::str::from_utf8(line) {
                Username::new(text)
            } else {
                undecodable += 1;
                None
            }
        })
        .collect();

    if undecodable > 0 {
        tracing::warn!(lines = undecodable, "skipped roster lines that are not valid UTF-8");
    }
    users
}

/// Load the roster at `path`.
///
/// A missing or unreadable roster means "no known users yet": it is logged
/// as a warning and an empty set is returned.
#[must_use]
pub fn load_roster(path: &Path) -> UsernameSet {
    match fs::read(path) {
        Ok(content) => parse_roster(content),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read roster; starting empty");
            UsernameSet::new()
        }
    }
}

/// Whether a non-empty `file` lacks a trailing newline.
fn ends_mid_line(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Append `users` to the roster at `path`, one per line, creating it if
/// needed. Existing lines are never rewritten; a final line left without its
/// newline is terminated first so the next entry starts on its own line.
///
/// Returns the number of users written.
///
/// # Errors
///
/// Returns an error if the roster cannot be opened, written or flushed.
pub fn append_roster(path: &Path, users: &UsernameSet) -> Result<usize> {
    let mut file = OpenOptions::new()
        .read(true)
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open roster {}", path.display()))?;

    let unterminated = !users.is_empty()
        && ends_mid_line(&mut file)
            .with_context(|| format!("failed to inspect roster {}", path.display()))?;

    let mut writer = BufWriter::new(file);
    if unterminated {
        writeln!(writer)
            .with_context(|| format!("failed to append to roster {}", path.display()))?;
    }
    for user in users {
        writeln!(writer, "{user}")
            .with_context(|| format!("failed to append to roster {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to flush roster {}", path.display()))?;

    Ok(users.len())
}
