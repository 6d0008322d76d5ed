//! Hour bucket derivation from event filenames.
//!
//! Event files embed a `YYYY-MM-DD-H` token (hour may be one or two digits)
//! anywhere in their basename, e.g. `events-2021-03-07-9.json.gz`. The
//! digest date comes from this token only, never from record contents.

use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;

use crate::error::ErrorCode;

static FILENAME_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{4})-([0-9]{2})-([0-9]{2})-([0-9]{1,2})")
        .expect("filename date pattern is valid")
});

/// Errors returned when a filename does not carry a usable hour bucket.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateError {
    /// The basename has no `YYYY-MM-DD-H` token.
    #[error("no YYYY-MM-DD-H date token in {0:?}")]
    Missing(String),

    /// The token matched but is not a real UTC hour (e.g. month 13, hour 24).
    #[error("date token {token:?} in {name:?} is not a valid UTC hour")]
    OutOfRange { name: String, token: String },
}

impl DateError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Missing(_) => ErrorCode::FilenameDateMissing,
            Self::OutOfRange { .. } => ErrorCode::FilenameDateInvalid,
        }
    }
}

/// Derive the hour bucket for an event file from its basename.
///
/// # Errors
///
/// Returns [`DateError::Missing`] when no token is present and
/// [`DateError::OutOfRange`] when the token does not name a valid hour.
pub fn date_from_filename(path: &Path) -> Result<DateTime<Utc>, DateError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let Some(caps) = FILENAME_DATE.captures(&name) else {
        return Err(DateError::Missing(name.clone()));
    };

    let out_of_range = || DateError::OutOfRange {
        name: name.clone(),
        token: caps[0].to_string(),
    };

    // All groups are ASCII digits of bounded width, so parsing only fails on
    // values chrono would reject anyway.
    let year: i32 = caps[1].parse().map_err(|_| out_of_range())?;
    let month: u32 = caps[2].parse().map_err(|_| out_of_range())?;
    let day: u32 = caps[3].parse().map_err(|_| out_of_range())?;
    let hour: u32 = caps[4].parse().map_err(|_| out_of_range())?;

    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .ok_or_else(out_of_range)
}
