#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use event_digest_core::config::{DigestConfig, resolve_config};
use event_digest_core::pipeline::Pipeline;
use output::{CliError, OutputMode};
use std::env;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info, info_span};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "event-digest: cached hourly digests of gzip event logs",
    long_about = None
)]
struct Cli {
    /// Read settings from a TOML file before applying environment overrides.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the events directory.
    #[arg(long, global = true)]
    events_dir: Option<PathBuf>,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    const fn output_mode(&self) -> OutputMode {
        OutputMode::from_json_flag(self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Digest every event file and write the summary and roster",
        after_help = "EXAMPLES:\n    # Digest the configured events directory\n    event-digest run\n\n    # Point at another directory and emit JSON\n    event-digest --events-dir /srv/events run --json"
    )]
    Run,

    #[command(
        about = "Show the sidecar state of every event file",
        after_help = "EXAMPLES:\n    # Which files are cached, missing, or corrupt\n    event-digest status"
    )]
    Status,

    #[command(
        about = "Quarantine corrupt sidecars so the next run recomputes them",
        after_help = "EXAMPLES:\n    # Repair one file by name\n    event-digest repair 2021-03-07-9.json.gz"
    )]
    Repair {
        /// Event files whose sidecars should be checked.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Move `path` to `<path>.1` once it has reached `max_bytes`, replacing any
/// previous backup. Returns whether a rotation happened.
fn rotate_if_oversized(path: &Path, max_bytes: u64) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() >= max_bytes => {
            let mut backup = path.as_os_str().to_owned();
            backup.push(".1");
            fs::rename(path, PathBuf::from(backup))?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Build the log writer: append to `log_path` (rotated once it exceeds the
/// configured size), or stderr if it cannot be opened.
fn log_writer(config: &DigestConfig) -> BoxMakeWriter {
    if let Some(parent) = config.log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let _ = fs::create_dir_all(parent);
    }

    if let Some(max_bytes) = config.log_max_bytes() {
        if let Err(err) = rotate_if_oversized(&config.log_path, max_bytes) {
            eprintln!(
                "event-digest: cannot rotate log {}: {err}",
                config.log_path.display()
            );
        }
    }

    match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    {
        Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
        Err(err) => {
            eprintln!(
                "event-digest: cannot open log {}: {err}; logging to stderr",
                config.log_path.display()
            );
            BoxMakeWriter::new(std::io::stderr)
        }
    }
}

fn init_tracing(config: &DigestConfig) {
    let filter = EnvFilter::try_from_env("EVENT_DIGEST_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "event_digest=debug,info"
        } else {
            "event_digest=info,warn"
        })
    });

    let format = env::var("EVENT_DIGEST_LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let writer = log_writer(config);

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "compact" => {
            registry
                .with(fmt::layer().compact().with_ansi(false).with_writer(writer))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(writer))
                .init();
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let output = cli.output_mode();
    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(dir) = &cli.events_dir {
        config.events_dir.clone_from(dir);
    }

    init_tracing(&config);
    let _root = info_span!("event_digest", env = %config.environment).entered();

    let pipeline = Pipeline::new(config);

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd::run::run_digest(&pipeline, output),
        Commands::Status => cmd::status::run_status(&pipeline, output),
        Commands::Repair { files } => cmd::repair::run_repair(&pipeline, &files, output),
    };

    match &result {
        Ok(()) => info!("event-digest finished"),
        Err(err) => error!(error = %format!("{err:#}"), "event-digest aborted"),
    }
    result
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = cli.output_mode();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if output::render_error(output, &CliError::from(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_defaults_to_none() {
        let cli = Cli::parse_from(["event-digest"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.output_mode(), OutputMode::Human);
    }

    #[test]
    fn json_flag_after_subcommand() {
        let cli = Cli::parse_from(["event-digest", "status", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Some(Commands::Status)));
        assert_eq!(cli.output_mode(), OutputMode::Json);
    }

    #[test]
    fn events_dir_is_global() {
        let cli = Cli::parse_from(["event-digest", "run", "--events-dir", "/srv/events"]);
        assert_eq!(cli.events_dir, Some(PathBuf::from("/srv/events")));
        assert!(matches!(cli.command, Some(Commands::Run)));
    }

    #[test]
    fn repair_requires_files() {
        assert!(Cli::try_parse_from(["event-digest", "repair"]).is_err());

        let cli = Cli::parse_from(["event-digest", "repair", "a.json.gz", "b.json.gz"]);
        let Some(Commands::Repair { files }) = cli.command else {
            panic!("expected repair");
        };
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn log_writer_falls_back_when_log_dir_is_a_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let config = DigestConfig {
            log_path: blocker.join("digest.log"),
            ..DigestConfig::default()
        };
        // Must not panic; stderr is used instead.
        let _ = log_writer(&config);
        assert!(!blocker.join("digest.log").exists());
    }

    #[test]
    fn oversized_log_is_rotated_once() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = tmp.path().join("digest.log");
        fs::write(&log, b"0123456789").unwrap();
        fs::write(tmp.path().join("digest.log.1"), b"older").unwrap();

        assert!(!rotate_if_oversized(&log, 11).unwrap());
        assert!(rotate_if_oversized(&log, 10).unwrap());

        assert!(!log.exists());
        assert_eq!(fs::read(tmp.path().join("digest.log.1")).unwrap(), b"0123456789");
        assert!(!rotate_if_oversized(&log, 10).unwrap());
    }

    #[test]
    fn log_writer_starts_fresh_file_after_rotation() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = tmp.path().join("digest.log");
        fs::write(&log, vec![b'x'; 1024 * 1024]).unwrap();
        let config = DigestConfig {
            log_path: log.clone(),
            log_max_megabytes: 1,
            ..DigestConfig::default()
        };

        let _ = log_writer(&config);
        assert_eq!(fs::metadata(&log).unwrap().len(), 0);
        assert_eq!(
            fs::metadata(tmp.path().join("digest.log.1")).unwrap().len(),
            1024 * 1024
        );
    }
}
