use std::io::{self, Write};

use anyhow::Result;
use event_digest_core::pipeline::{Pipeline, RunReport};

use crate::output::{OutputMode, pretty_kv, pretty_section, render};

/// Run the digest pipeline once and print the run report.
///
/// # Errors
///
/// Returns an error when the summary or roster cannot be written, or the
/// events directory cannot be listed. Per-file failures are only reported.
pub fn run_digest(pipeline: &Pipeline, output: OutputMode) -> Result<()> {
    let report = pipeline.run()?;
    render(output, &report, render_human)
}

fn render_human(report: &RunReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, "Event digest")?;
    pretty_kv(w, "files", report.files.len().to_string())?;
    pretty_kv(w, "cached", report.cached.to_string())?;
    pretty_kv(w, "computed", report.computed.to_string())?;
    pretty_kv(w, "partial", report.partial.to_string())?;
    pretty_kv(w, "failed", report.failed.to_string())?;
    pretty_kv(w, "events", report.events.to_string())?;
    pretty_kv(w, "new users", report.new_users.to_string())?;

    for file in report.files.iter().filter(|f| f.error.is_some()) {
        writeln!(
            w,
            "{:<8} {} [{}] {}",
            file.outcome.to_uppercase(),
            file.path.display(),
            file.code.unwrap_or("-"),
            file.error.as_deref().unwrap_or_default()
        )?;
    }
    Ok(())
}
