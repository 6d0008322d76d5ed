//! Sidecar digest cache: at-most-once computation per event file.
//!
//! [`DigestCache`] memoizes [`Digest`]s next to their source file as
//! `<input>.digest.json`. The sidecar is the only state, so repeated runs
//! (or a run after a crash) never re-parse a file whose sidecar exists.
//!
//! # Protocol
//!
//! 1. Take the per-input advisory lock (`<input>.digest.lock`), bounded by
//!    the configured timeout.
//! 2. If the sidecar exists, decode it and return it. A sidecar that does not
//!    decode is reported as [`CacheError::Corrupt`]; it is never recomputed
//!    implicitly. [`DigestCache::repair`] is the explicit way out.
//! 3. Otherwise digest the source, write the result to a temp file in the same
//!    directory, fsync, and publish it with a no-clobber link. The sidecar
//!    therefore only ever appears fully written.
//! 4. A stream that fails part-way yields a partial digest that is returned
//!    to the caller but not published, so the next run retries the file.
//!
//! The lock keeps racing processes from digesting the same file twice; the
//! no-clobber publish keeps the sidecar valid even if the lock is bypassed.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::digest::{DateError, Digest, StreamError, date_from_filename, digest_file};
use crate::error::ErrorCode;
use crate::lock::{LockError, SidecarLock};
use crate::users::UsernameSet;

/// Suffix appended to an input path to name its sidecar.
pub const SIDECAR_SUFFIX: &str = ".digest.json";

/// Suffix appended to an input path to name its advisory lock file.
pub const LOCK_SUFFIX: &str = ".digest.lock";

/// Suffix appended to a sidecar when it is quarantined by [`DigestCache::repair`].
pub const QUARANTINE_SUFFIX: &str = ".corrupt";

/// Default bound on waiting for another process holding a sidecar lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Per-file failures reported by the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Date(#[from] DateError),

    #[error(transparent)]
    Lock(#[from] LockError),

    /// The sidecar exists but does not decode as a digest.
    #[error("corrupt digest sidecar {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Reading, writing or publishing the sidecar failed.
    #[error("digest sidecar I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Stream(e) => e.code(),
            Self::Date(e) => e.code(),
            Self::Lock(e) => e.code(),
            Self::Corrupt { .. } => ErrorCode::CacheCorrupt,
            Self::Io { .. } => ErrorCode::CacheWriteFailed,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Where a successful digest came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestSource {
    /// Decoded from an existing sidecar; the source was not read.
    Cache,
    /// Computed from the source and published in this call.
    Computed,
}

/// Result of [`DigestCache::compute_or_load`] for one input file.
#[derive(Debug)]
pub enum FileOutcome {
    /// A complete digest, persisted in the sidecar.
    Success { digest: Digest, source: DigestSource },
    /// The stream failed part-way. `digest.count` covers the records decoded
    /// before `error`. Nothing was persisted.
    Partial { digest: Digest, error: CacheError },
    /// No digest could be produced.
    Failure { error: CacheError },
}

impl FileOutcome {
    /// The digest to include in the summary, if any.
    #[must_use]
    pub const fn digest(&self) -> Option<&Digest> {
        match self {
            Self::Success { digest, .. } | Self::Partial { digest, .. } => Some(digest),
            Self::Failure { .. } => None,
        }
    }

    #[must_use]
    pub const fn error(&self) -> Option<&CacheError> {
        match self {
            Self::Success { .. } => None,
            Self::Partial { error, .. } | Self::Failure { error } => Some(error),
        }
    }

    /// Short stable label for reports.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success {
                source: DigestSource::Cache,
                ..
            } => "cached",
            Self::Success {
                source: DigestSource::Computed,
                ..
            } => "computed",
            Self::Partial { .. } => "partial",
            Self::Failure { .. } => "failed",
        }
    }
}

/// Sidecar state of one input, as reported by [`DigestCache::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidecarStatus {
    Missing,
    Valid(Digest),
    Corrupt(String),
    /// The sidecar exists but could not be read at all.
    Unreadable(String),
}

/// What [`DigestCache::repair`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// No sidecar; the next run computes the file.
    Missing,
    /// The sidecar decodes; it was left alone.
    Intact(Digest),
    /// The sidecar was corrupt and moved aside to `backup`.
    Quarantined { backup: PathBuf },
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Sidecar path for an input file: `<input>.digest.json`.
#[must_use]
pub fn sidecar_path(input: &Path) -> PathBuf {
    with_suffix(input, SIDECAR_SUFFIX)
}

/// Lock file path for an input file: `<input>.digest.lock`.
#[must_use]
pub fn lock_path(input: &Path) -> PathBuf {
    with_suffix(input, LOCK_SUFFIX)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

// ---------------------------------------------------------------------------
// Sidecar I/O
// ---------------------------------------------------------------------------

/// Read a sidecar. `Ok(None)` means it does not exist.
///
/// # Errors
///
/// Returns [`CacheError::Corrupt`] if the file is empty or does not decode,
/// and [`CacheError::Io`] for other read failures.
pub fn read_sidecar(path: &Path) -> Result<Option<Digest>, CacheError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };

    serde_json::from_reader(BufReader::new(file))
        .map(Some)
        .map_err(|e| {
            if e.is_io() {
                CacheError::io(path, e.into())
            } else {
                CacheError::Corrupt {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        })
}

/// Publish `digest` at `path` only if nothing is there yet.
///
/// Returns `false` when another writer published first.
fn publish_sidecar(path: &Path, digest: &Digest) -> Result<bool, CacheError> {
    let mut tmp =
        NamedTempFile::new_in(parent_dir(path)).map_err(|e| CacheError::io(path, e))?;

    serde_json::to_writer(&mut tmp, digest)
        .map_err(|e| CacheError::io(path, io::Error::other(e)))?;
    tmp.write_all(b"\n")
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| CacheError::io(path, e))?;

    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(CacheError::io(path, e.error)),
    }
}

// ---------------------------------------------------------------------------
// DigestCache
// ---------------------------------------------------------------------------

/// Filesystem-backed memoization of per-file digests.
///
/// ```rust,no_run
/// use event_digest_core::cache::DigestCache;
/// use event_digest_core::users::UsernameSet;
/// use std::path::Path;
///
/// let cache = DigestCache::default();
/// let mut users = UsernameSet::new();
/// let outcome = cache.compute_or_load(Path::new("2021-03-07-9.json.gz"), &mut users);
/// println!("{}", outcome.label());
/// ```
#[derive(Debug, Clone)]
pub struct DigestCache {
    lock_timeout: Duration,
}

impl Default for DigestCache {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl DigestCache {
    #[must_use]
    pub const fn new(lock_timeout: Duration) -> Self {
        Self { lock_timeout }
    }

    /// Return the digest for `input`, computing it at most once.
    ///
    /// Usernames seen while computing are added to `users`; a digest loaded
    /// from the sidecar contributes none (they were recorded by the run that
    /// computed it).
    pub fn compute_or_load(&self, input: &Path, users: &mut UsernameSet) -> FileOutcome {
        match self.try_compute_or_load(input, users) {
            Ok(outcome) => outcome,
            Err(error) => FileOutcome::Failure { error },
        }
    }

    fn try_compute_or_load(
        &self,
        input: &Path,
        users: &mut UsernameSet,
    ) -> Result<FileOutcome, CacheError> {
        let sidecar = sidecar_path(input);
        let _lock = SidecarLock::acquire(&lock_path(input), self.lock_timeout)?;

        if let Some(digest) = read_sidecar(&sidecar)? {
            tracing::debug!(path = %input.display(), count = digest.count, "digest loaded from sidecar");
            return Ok(FileOutcome::Success {
                digest,
                source: DigestSource::Cache,
            });
        }

        let date = date_from_filename(input)?;
        let count = match digest_file(input, users) {
            Ok(count) => count,
            Err(e) => {
                let Some(count) = e.partial_count() else {
                    return Err(e.into());
                };
                tracing::warn!(
                    path = %input.display(),
                    count,
                    error = %e,
                    "event stream truncated; partial digest not persisted"
                );
                return Ok(FileOutcome::Partial {
                    digest: Digest::new(count, date),
                    error: e.into(),
                });
            }
        };

        let digest = Digest::new(count, date);
        if publish_sidecar(&sidecar, &digest)? {
            tracing::debug!(path = %input.display(), count, date = %date, "digest computed");
            return Ok(FileOutcome::Success {
                digest,
                source: DigestSource::Computed,
            });
        }

        // Lost a publish race with a writer that bypassed the lock; its
        // sidecar wins.
        tracing::warn!(path = %sidecar.display(), "sidecar published concurrently; using existing");
        let existing = read_sidecar(&sidecar)?.ok_or_else(|| {
            CacheError::io(
                &sidecar,
                io::Error::new(io::ErrorKind::NotFound, "sidecar vanished after publish race"),
            )
        })?;
        Ok(FileOutcome::Success {
            digest: existing,
            source: DigestSource::Cache,
        })
    }

    /// Report the sidecar state of `input` without computing anything.
    #[must_use]
    pub fn status(&self, input: &Path) -> SidecarStatus {
        match read_sidecar(&sidecar_path(input)) {
            Ok(None) => SidecarStatus::Missing,
            Ok(Some(digest)) => SidecarStatus::Valid(digest),
            Err(CacheError::Corrupt { reason, .. }) => SidecarStatus::Corrupt(reason),
            Err(e) => SidecarStatus::Unreadable(e.to_string()),
        }
    }

    /// Quarantine a corrupt sidecar so the next run recomputes `input`.
    ///
    /// The corrupt file is renamed to `<sidecar>.corrupt` (or
    /// `<sidecar>.corrupt.N` if that exists), never deleted. Valid sidecars
    /// are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken or the rename fails.
    pub fn repair(&self, input: &Path) -> Result<RepairOutcome, CacheError> {
        let sidecar = sidecar_path(input);
        let _lock = SidecarLock::acquire(&lock_path(input), self.lock_timeout)?;

        match read_sidecar(&sidecar) {
            Ok(None) => Ok(RepairOutcome::Missing),
            Ok(Some(digest)) => Ok(RepairOutcome::Intact(digest)),
            Err(CacheError::Corrupt { reason, .. }) => {
                let backup = quarantine_path(&sidecar);
                fs::rename(&sidecar, &backup).map_err(|e| CacheError::io(&sidecar, e))?;
                tracing::warn!(
                    path = %sidecar.display(),
                    backup = %backup.display(),
                    %reason,
                    "quarantined corrupt digest sidecar"
                );
                Ok(RepairOutcome::Quarantined { backup })
            }
            Err(e) => Err(e),
        }
    }
}

fn quarantine_path(sidecar: &Path) -> PathBuf {
    let first = with_suffix(sidecar, QUARANTINE_SUFFIX);
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| with_suffix(sidecar, &format!("{QUARANTINE_SUFFIX}.{n}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
