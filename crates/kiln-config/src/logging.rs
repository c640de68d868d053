//! `tracing` setup for the `kiln` binary.
//!
//! Logs go to stderr, to an optional append-only file, or both. A bare level
//! in `[logging] level` applies to the `kiln.*` targets only; other crates
//! stay at `warn` unless a full filter directive is given.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use serde::{Deserialize, Serialize};
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

const KILN_TARGET: &str = "kiln";
const OTHER_TARGETS_LEVEL: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `trace`..`error` (or `warning`), or a full `EnvFilter` directive.
    pub level: String,
    /// One JSON object per event instead of the human format.
    pub json: bool,
    pub stderr: bool,
    /// Appended to; created when missing.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            stderr: true,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Filter directives for `level`, with `rust_log` appended so it can
    /// raise or lower individual targets.
    pub fn directives(&self, rust_log: Option<&str>) -> String {
        let level = self.level.trim();
        let base = match bare_level(level) {
            Some(level) => format!("{OTHER_TARGETS_LEVEL},{KILN_TARGET}={level}"),
            None if level.is_empty() => format!("{OTHER_TARGETS_LEVEL},{KILN_TARGET}=info"),
            None => level.to_string(),
        };
        match rust_log.map(str::trim).filter(|v| !v.is_empty()) {
            Some(extra) => format!("{base},{extra}"),
            None => base,
        }
    }

    /// The effective filter. Invalid directives fall back to the default
    /// level with a note on stderr, since no subscriber exists yet.
    pub fn env_filter(&self) -> EnvFilter {
        let rust_log = std::env::var("RUST_LOG").ok();
        let directives = self.directives(rust_log.as_deref());
        EnvFilter::try_new(&directives).unwrap_or_else(|err| {
            eprintln!("kiln: ignoring invalid log filter `{directives}`: {err}");
            EnvFilter::new(LoggingConfig::default().directives(None))
        })
    }
}

fn bare_level(level: &str) -> Option<&'static str> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" => Some("error"),
        "off" => Some("off"),
        _ => None,
    }
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn fmt_layer<S, W>(json: bool, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

static TRACING_INIT: Once = Once::new();

/// Install the global subscriber. Only the first call in a process has an
/// effect; a log file that cannot be opened is reported and skipped.
pub fn init_tracing(config: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let (file, file_error) = match config.file.as_deref().map(open_log_file) {
            Some(Ok(file)) => (Some(file), None),
            Some(Err(err)) => (None, Some(err)),
            None => (None, None),
        };

        let stderr_layer = config.stderr.then(|| fmt_layer(config.json, io::stderr));
        let file_layer = file.map(|file| fmt_layer(config.json, Mutex::new(file)));

        let installed = tracing_subscriber::registry()
            .with(config.env_filter())
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .is_ok();

        if let (true, Some(err), Some(path)) = (installed, file_error, &config.file) {
            tracing::warn!(
                target: "kiln.config",
                path = %path.display(),
                error = %err,
                "cannot open log file; file logging is disabled"
            );
        }
    });
}
