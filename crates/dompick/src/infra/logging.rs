//! Tracing subscriber setup.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use dirs_next::cache_dir;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};
use tracing_tree::HierarchicalLayer;

const LOG_FILE: &str = "dompick/dompick.log";

/// Where log records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Append to a file; used while the terminal belongs to the interactive UI.
    File(PathBuf),
}

impl LogTarget {
    /// Log file under the user cache directory, falling back to the working directory.
    pub fn default_file() -> Self {
        let path = cache_dir()
            .map(|dir| dir.join(LOG_FILE))
            .unwrap_or_else(|| PathBuf::from("dompick.log"));
        LogTarget::File(path)
    }
}

/// Default filter directive for a `-v` count. `RUST_LOG` takes precedence when set.
pub fn directive_for(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("warn,dompick={level}")
}

/// Install the global subscriber.
///
/// Stderr output is compact below `-vv` and switches to an indented span tree above it.
pub fn init(verbosity: u8, target: LogTarget) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive_for(verbosity)));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match target {
        LogTarget::Stderr if verbosity >= 2 => registry
            .with(
                HierarchicalLayer::new(2)
                    .with_targets(true)
                    .with_indent_lines(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogTarget::Stderr => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogTarget::File(path) => {
            let file = open_log_file(&path)?;
            registry
                .with(
                    fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()
        }
    };
    installed.context("failed to install tracing subscriber")
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}
