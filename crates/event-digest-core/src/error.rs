use std::fmt;

/// Machine-readable error codes for per-file outcomes and fatal run errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    EventsDirMissing,
    SourceUnreadable,
    InvalidGzip,
    MalformedRecord,
    FilenameDateMissing,
    FilenameDateInvalid,
    CacheCorrupt,
    CacheWriteFailed,
    LockContention,
    SummaryWriteFailed,
    RosterWriteFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::EventsDirMissing => "E1002",
            Self::SourceUnreadable => "E2001",
            Self::InvalidGzip => "E2002",
            Self::MalformedRecord => "E2003",
            Self::FilenameDateMissing => "E2004",
            Self::FilenameDateInvalid => "E2005",
            Self::CacheCorrupt => "E3001",
            Self::CacheWriteFailed => "E3002",
            Self::LockContention => "E3003",
            Self::SummaryWriteFailed => "E5001",
            Self::RosterWriteFailed => "E5002",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::EventsDirMissing => "Events directory not found",
            Self::SourceUnreadable => "Event file unreadable",
            Self::InvalidGzip => "Event file is not valid gzip",
            Self::MalformedRecord => "Malformed event record",
            Self::FilenameDateMissing => "Event filename has no date token",
            Self::FilenameDateInvalid => "Event filename date is out of range",
            Self::CacheCorrupt => "Digest sidecar is corrupt",
            Self::CacheWriteFailed => "Digest sidecar write failed",
            Self::LockContention => "Lock contention",
            Self::SummaryWriteFailed => "Summary write failed",
            Self::RosterWriteFailed => "Roster write failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in the config file and retry."),
            Self::EventsDirMissing => Some("Set GHC_EVENTS_PATH to an existing directory."),
            Self::SourceUnreadable | Self::CacheWriteFailed => {
                Some("Check file permissions and free disk space.")
            }
            Self::InvalidGzip | Self::MalformedRecord => None,
            Self::FilenameDateMissing | Self::FilenameDateInvalid => {
                Some("Event files must be named like `2021-03-07-9.json.gz`.")
            }
            Self::CacheCorrupt => {
                Some("Run `event-digest repair <file>` to quarantine the sidecar and recompute.")
            }
            Self::LockContention => {
                Some("Retry after the other `event-digest` process finishes this file.")
            }
            Self::SummaryWriteFailed | Self::RosterWriteFailed => {
                Some("Check disk space and write permissions on the events directory.")
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Run-level failure class attached to an `anyhow` chain.
///
/// Fatal paths add it with `.context(Fatal(code))`; the CLI recovers the code
/// with [`Fatal::find`] to print the message and hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{}: {}", .0.code(), .0.message())]
pub struct Fatal(pub ErrorCode);

impl Fatal {
    /// The code tagged anywhere in `err`'s context chain.
    #[must_use]
    pub fn find(err: &anyhow::Error) -> Option<ErrorCode> {
        err.downcast_ref::<Self>().map(|fatal| fatal.0)
    }
}
