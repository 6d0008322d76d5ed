use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use event_digest_core::cache::SidecarStatus;
use event_digest_core::digest::Digest;
use event_digest_core::pipeline::Pipeline;
use serde::Serialize;

use crate::output::{OutputMode, render};

#[derive(Debug, Serialize)]
struct StatusRow {
    path: PathBuf,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    digest: Option<Digest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl From<(PathBuf, SidecarStatus)> for StatusRow {
    fn from((path, status): (PathBuf, SidecarStatus)) -> Self {
        match status {
            SidecarStatus::Missing => Self {
                path,
                state: "missing",
                digest: None,
                reason: None,
            },
            SidecarStatus::Valid(digest) => Self {
                path,
                state: "valid",
                digest: Some(digest),
                reason: None,
            },
            SidecarStatus::Corrupt(reason) => Self {
                path,
                state: "corrupt",
                digest: None,
                reason: Some(reason),
            },
            SidecarStatus::Unreadable(reason) => Self {
                path,
                state: "unreadable",
                digest: None,
                reason: Some(reason),
            },
        }
    }
}

/// Print the sidecar state of every discovered event file.
///
/// # Errors
///
/// Returns an error when discovery fails.
pub fn run_status(pipeline: &Pipeline, output: OutputMode) -> Result<()> {
    let rows: Vec<StatusRow> = pipeline.status()?.into_iter().map(StatusRow::from).collect();
    render(output, &rows, |rows, w| render_human(rows, w))
}

fn render_human(rows: &[StatusRow], w: &mut dyn Write) -> io::Result<()> {
    for row in rows {
        match (&row.digest, &row.reason) {
            (Some(d), _) => writeln!(
                w,
                "{:<10} {} ({} events @ {})",
                row.state,
                row.path.display(),
                d.count,
                d.date.to_rfc3339()
            )?,
            (None, Some(reason)) => {
                writeln!(w, "{:<10} {} ({reason})", row.state, row.path.display())?;
            }
            (None, None) => writeln!(w, "{:<10} {}", row.state, row.path.display())?,
        }
    }
    Ok(())
}
