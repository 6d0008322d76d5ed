use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use event_digest_core::cache::RepairOutcome;
use event_digest_core::pipeline::Pipeline;
use serde::Serialize;

use crate::output::{OutputMode, render};

#[derive(Debug, Serialize)]
struct RepairRow {
    path: PathBuf,
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    backup: Option<PathBuf>,
}

/// Resolve a user-supplied input against the events directory when it does
/// not exist as given.
fn resolve_input(events_dir: &Path, file: &Path) -> PathBuf {
    if file.is_relative() && !file.exists() {
        events_dir.join(file)
    } else {
        file.to_path_buf()
    }
}

/// Quarantine corrupt sidecars for the given event files.
///
/// # Errors
///
/// Returns an error when a lock cannot be taken or a rename fails.
pub fn run_repair(pipeline: &Pipeline, files: &[PathBuf], output: OutputMode) -> Result<()> {
    let events_dir = &pipeline.config().events_dir;
    let inputs: Vec<PathBuf> = files.iter().map(|f| resolve_input(events_dir, f)).collect();

    let rows: Vec<RepairRow> = pipeline
        .repair(&inputs)?
        .into_iter()
        .map(|(path, outcome)| match outcome {
            RepairOutcome::Missing => RepairRow {
                path,
                action: "none",
                backup: None,
            },
            RepairOutcome::Intact(_) => RepairRow {
                path,
                action: "intact",
                backup: None,
            },
            RepairOutcome::Quarantined { backup } => RepairRow {
                path,
                action: "quarantined",
                backup: Some(backup),
            },
        })
        .collect();

    render(output, &rows, |rows, w| render_human(rows, w))
}

fn render_human(rows: &[RepairRow], w: &mut dyn Write) -> io::Result<()> {
    for row in rows {
        match &row.backup {
            Some(backup) => writeln!(
                w,
                "{:<12} {} -> {}",
                row.action,
                row.path.display(),
                backup.display()
            )?,
            None => writeln!(w, "{:<12} {}", row.action, row.path.display())?,
        }
    }
    Ok(())
}
