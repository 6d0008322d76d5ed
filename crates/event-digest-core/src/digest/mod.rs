//! Per-file digests: event count plus the hour bucket the file covers.
//!
//! # Module layout
//!
//! - [`record`]: the slice of an event record the digester reads.
//! - [`date`]: hour bucket derivation from the event filename.
//! - [`stream`]: decompress → sanitize → decode pipeline over one file.

pub mod date;
pub mod record;
pub mod stream;

pub use date::{DateError, date_from_filename};
pub use record::{ActorRecord, EventRecord};
pub use stream::{StreamError, digest_file, digest_stream};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate data for one hourly event file.
///
/// Serialized as `{"count": <int>, "date": <RFC3339>}` both in the sidecar
/// cache and in the summary array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    /// Number of records decoded from the file.
    pub count: u64,
    /// Hour bucket, taken from the filename.
    pub date: DateTime<Utc>,
}

impl Digest {
    #[must_use]
    pub const fn new(count: u64, date: DateTime<Utc>) -> Self {
        Self { count, date }
    }
}

/// Sort digests ascending by hour bucket.
///
/// The sort is stable: digests sharing a bucket keep their relative order.
pub fn sort_digests(digests: &mut [Digest]) {
    digests.sort_by_key(|d| d.date);
}
