//! One digest run over an events directory.
//!
//! [`Pipeline::run`] loads the roster, digests every discovered event file
//! through the [`DigestCache`], and hands the collected digests plus the
//! newly observed usernames to the [`SummaryWriter`]. Per-file failures are
//! logged and recorded in the [`RunReport`]; only summary/roster write
//! failures abort the run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use serde::Serialize;

use crate::cache::{DigestCache, DigestSource, FileOutcome, RepairOutcome, SidecarStatus};
use crate::config::DigestConfig;
use crate::digest::Digest;
use crate::error::{ErrorCode, Fatal};
use crate::roster::load_roster;
use crate::summary::{SummaryStats, SummaryWriter};
use crate::users::UsernameSet;

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// Username state owned by a single run.
///
/// `users` grows as files are digested; `baseline` is the roster as loaded,
/// frozen so the run can tell which users are new.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    users: UsernameSet,
    baseline: UsernameSet,
}

impl RunContext {
    /// Seed a context from known users.
    #[must_use]
    pub fn new(known: UsernameSet) -> Self {
        Self {
            baseline: known.clone(),
            users: known,
        }
    }

    /// Seed a context from the roster file (missing roster ⇒ empty).
    #[must_use]
    pub fn from_roster(path: &Path) -> Self {
        let ctx = Self::new(load_roster(path));
        tracing::debug!(count = ctx.baseline.len(), "found existing users");
        ctx
    }

    pub const fn users_mut(&mut self) -> &mut UsernameSet {
        &mut self.users
    }

    #[must_use]
    pub const fn users(&self) -> &UsernameSet {
        &self.users
    }

    #[must_use]
    pub const fn baseline(&self) -> &UsernameSet {
        &self.baseline
    }

    /// Users seen this run that were not in the roster.
    #[must_use]
    pub fn new_users(&self) -> UsernameSet {
        self.users.difference(&self.baseline)
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one input file, flattened for output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    fn from_outcome(path: &Path, outcome: &FileOutcome) -> Self {
        Self {
            path: path.to_path_buf(),
            outcome: outcome.label(),
            digest: outcome.digest().copied(),
            code: outcome.error().map(|e| e.code().code()),
            error: outcome.error().map(ToString::to_string),
        }
    }
}

/// Result of a full [`Pipeline::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub files: Vec<FileReport>,
    pub cached: usize,
    pub computed: usize,
    pub partial: usize,
    pub failed: usize,
    pub digests: usize,
    pub events: u64,
    pub new_users: usize,
}

impl RunReport {
    fn record(&mut self, path: &Path, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Success {
                source: DigestSource::Cache,
                ..
            } => self.cached += 1,
            FileOutcome::Success {
                source: DigestSource::Computed,
                ..
            } => self.computed += 1,
            FileOutcome::Partial { .. } => self.partial += 1,
            FileOutcome::Failure { .. } => self.failed += 1,
        }
        self.files.push(FileReport::from_outcome(path, outcome));
    }

    const fn absorb(&mut self, stats: SummaryStats) {
        self.digests = stats.digests;
        self.events = stats.events;
        self.new_users = stats.new_users;
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Drives discovery, per-file digesting and summary aggregation.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: DigestConfig,
    cache: DigestCache,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: DigestConfig) -> Self {
        let cache = DigestCache::new(config.lock_timeout());
        Self { config, cache }
    }

    #[must_use]
    pub const fn config(&self) -> &DigestConfig {
        &self.config
    }

    /// Event files in the events directory matching the input glob, sorted
    /// by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the glob is invalid or the directory cannot be read.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let matcher = input_matcher(&self.config.input_glob)?;
        let dir = &self.config.events_dir;

        let entries = fs::read_dir(dir).map_err(|e| {
            let missing = e.kind() == io::ErrorKind::NotFound;
            let err = anyhow::Error::new(e).context(format!("read events dir {}", dir.display()));
            if missing {
                err.context(Fatal(ErrorCode::EventsDirMissing))
            } else {
                err
            }
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("read events dir {}", dir.display()))?;
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            if matcher.is_match(entry.file_name()) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Run the whole pipeline once.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails or the summary/roster cannot be
    /// written. Per-file failures are reported in the [`RunReport`] instead.
    pub fn run(&self) -> Result<RunReport> {
        tracing::debug!("event digest started");
        let mut ctx = RunContext::from_roster(&self.config.roster_path());
        let files = self.discover()?;

        let (digests, mut report) = self.digest_all(&files, &mut ctx);

        tracing::debug!("computing difference in users");
        let new_users = ctx.new_users();
        tracing::debug!(count = new_users.len(), "found new users");

        let writer = SummaryWriter::new(self.config.summary_path(), self.config.roster_path());
        let stats = writer
            .summarize(digests, &new_users)
            .context("failed to write digest summary")?;
        report.absorb(stats);

        tracing::info!(
            files = report.files.len(),
            cached = report.cached,
            computed = report.computed,
            partial = report.partial,
            failed = report.failed,
            events = report.events,
            new_users = report.new_users,
            "event digest finished"
        );
        Ok(report)
    }

    /// Digest each file in order, collecting digests from successful and
    /// partial outcomes. Failures are logged and left out of the digests.
    pub fn digest_all(&self, files: &[PathBuf], ctx: &mut RunContext) -> (Vec<Digest>, RunReport) {
        let mut digests = Vec::with_capacity(files.len());
        let mut report = RunReport::default();

        for path in files {
            let outcome = self.cache.compute_or_load(path, ctx.users_mut());
            if let Some(error) = outcome.error() {
                tracing::error!(
                    path = %path.display(),
                    code = error.code().code(),
                    error = %error,
                    outcome = outcome.label(),
                    "could not digest events file"
                );
            }
            if let Some(digest) = outcome.digest() {
                digests.push(*digest);
            }
            report.record(path, &outcome);
            tracing::debug!(count = ctx.users().len(), "now have users");
        }

        (digests, report)
    }

    /// Sidecar state of every discovered file. A sidecar that cannot be read
    /// is reported on its own row.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery fails.
    pub fn status(&self) -> Result<Vec<(PathBuf, SidecarStatus)>> {
        Ok(self
            .discover()?
            .into_iter()
            .map(|path| {
                let status = self.cache.status(&path);
                (path, status)
            })
            .collect())
    }

    /// Quarantine corrupt sidecars for `inputs`.
    ///
    /// # Errors
    ///
    /// Returns an error on the first input that cannot be repaired.
    pub fn repair(&self, inputs: &[PathBuf]) -> Result<Vec<(PathBuf, RepairOutcome)>> {
        inputs
            .iter()
            .map(|path| {
                let outcome = self
                    .cache
                    .repair(path)
                    .with_context(|| format!("repair {}", path.display()))?;
                Ok((path.clone(), outcome))
            })
            .collect()
    }
}

fn input_matcher(pattern: &str) -> Result<GlobMatcher> {
    Ok(Glob::new(pattern)
        .with_context(|| format!("invalid input glob {pattern:?}"))?
        .compile_matcher())
}
