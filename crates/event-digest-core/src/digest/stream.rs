//! Streaming digest of a single event file.
//!
//! The byte pipeline is fixed: raw file → gzip decode → NUL sanitizing →
//! JSON record-sequence decode. Records are back-to-back JSON objects with no
//! enclosing array; whitespace between them is optional.
//!
//! Decoding is best-effort. The first malformed record stops the stream, but
//! the number of records decoded before it is kept in the error so the caller
//! can still report a partial count.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::digest::record::EventRecord;
use crate::error::ErrorCode;
use crate::sanitize::ByteReplacer;
use crate::users::UsernameSet;

/// Errors raised while digesting an event stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The source file could not be opened.
    #[error("failed to open event file {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The source is not a gzip stream (bad header or undecodable first block).
    #[error("event file {} is not valid gzip: {source}", path.display())]
    InvalidGzip {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A record could not be decoded. `count` records were decoded before it.
    #[error("malformed event record after {count} records: {source}")]
    Malformed {
        count: u64,
        #[source]
        source: serde_json::Error,
    },
}

impl StreamError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::SourceUnreadable { .. } => ErrorCode::SourceUnreadable,
            Self::InvalidGzip { .. } => ErrorCode::InvalidGzip,
            Self::Malformed { .. } => ErrorCode::MalformedRecord,
        }
    }

    /// Records successfully decoded before the failure, when decoding started.
    #[must_use]
    pub const fn partial_count(&self) -> Option<u64> {
        match self {
            Self::Malformed { count, .. } => Some(*count),
            Self::SourceUnreadable { .. } | Self::InvalidGzip { .. } => None,
        }
    }
}

/// Decode a record-sequence stream, counting records and collecting actors.
///
/// Each decoded record increments the count; its lowercased `actor.login`
/// (if any) is added to `users`. Usernames from records decoded before a
/// failure stay in `users`.
///
/// # Errors
///
/// Returns [`StreamError::Malformed`] carrying the partial count on the
/// first record that fails to decode.
pub fn digest_stream<R: Read>(reader: R, users: &mut UsernameSet) -> Result<u64, StreamError> {
    let mut count: u64 = 0;
    let records = serde_json::Deserializer::from_reader(reader).into_iter::<EventRecord>();

    for record in records {
        let record = record.map_err(|source| StreamError::Malformed { count, source })?;
        count += 1;
        if let Some(login) = record.username() {
            users.add_raw(login);
        }
    }

    Ok(count)
}

/// Digest one gzip-compressed event file.
///
/// # Errors
///
/// Returns [`StreamError::SourceUnreadable`] if the file cannot be opened,
/// [`StreamError::InvalidGzip`] if the first decompressed read fails, and
/// [`StreamError::Malformed`] (with a partial count) for bad records.
pub fn digest_file(path: &Path, users: &mut UsernameSet) -> Result<u64, StreamError> {
    let file = File::open(path).map_err(|source| StreamError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let decoded = MultiGzDecoder::new(file);
    let mut reader = BufReader::new(ByteReplacer::nul_to_space(decoded));

    // Pull the first block eagerly so a bad header is reported as such rather
    // than as a malformed first record.
    reader
        .fill_buf()
        .map_err(|source| StreamError::InvalidGzip {
            path: path.to_path_buf(),
            source,
        })?;

    let count = digest_stream(reader, users)?;
    tracing::debug!(path = %path.display(), count, "digested event file");
    Ok(count)
}
