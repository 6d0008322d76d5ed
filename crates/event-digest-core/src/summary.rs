//! Summary aggregation: the sorted digest snapshot plus the roster append.
//!
//! Both writes are fatal on failure. The summary is replaced atomically (synced
//! temp file + rename) so readers never observe a half-written array; the
//! roster is append-only.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use crate::digest::{Digest, sort_digests};
use crate::error::{ErrorCode, Fatal};
use crate::roster::append_roster;
use crate::users::UsernameSet;

/// Counts reported after a summary is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SummaryStats {
    pub digests: usize,
    pub events: u64,
    pub new_users: usize,
}

/// Writes the summary and roster artifacts.
#[derive(Debug, Clone)]
pub struct SummaryWriter {
    summary_path: PathBuf,
    roster_path: PathBuf,
}

impl SummaryWriter {
    pub fn new(summary_path: impl Into<PathBuf>, roster_path: impl Into<PathBuf>) -> Self {
        Self {
            summary_path: summary_path.into(),
            roster_path: roster_path.into(),
        }
    }

    #[must_use]
    pub fn summary_path(&self) -> &Path {
        &self.summary_path
    }

    #[must_use]
    pub fn roster_path(&self) -> &Path {
        &self.roster_path
    }

    /// Sort `digests` by hour (stable), overwrite the summary with the full
    /// array, then append `new_users` to the roster.
    ///
    /// # Errors
    ///
    /// Any serialization or I/O failure. Callers treat this as fatal.
    pub fn summarize(&self, mut digests: Vec<Digest>, new_users: &UsernameSet) -> Result<SummaryStats> {
        sort_digests(&mut digests);
        self.write_summary(&digests)
            .context(Fatal(ErrorCode::SummaryWriteFailed))?;

        tracing::debug!(count = new_users.len(), "writing new users");
        let new_users = append_roster(&self.roster_path, new_users)
            .context(Fatal(ErrorCode::RosterWriteFailed))?;

        Ok(SummaryStats {
            digests: digests.len(),
            events: digests.iter().map(|d| d.count).sum(),
            new_users,
        })
    }

    fn write_summary(&self, digests: &[Digest]) -> Result<()> {
        let dir = self
            .summary_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp summary in {}", dir.display()))?;
        serde_json::to_writer(&mut tmp, digests).context("failed to serialize summary")?;
        tmp.write_all(b"\n")
            .and_then(|()| tmp.as_file().sync_all())
            .with_context(|| format!("failed to write {}", tmp.path().display()))?;

        tmp.persist(&self.summary_path).with_context(|| {
            format!("failed to atomically replace {}", self.summary_path.display())
        })?;

        Ok(())
    }
}
