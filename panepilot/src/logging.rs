//! Diagnostic tracing.
//!
//! The chat pane belongs to the conversation, so tracing goes to a file when
//! `log_file` is configured and to stderr otherwise. Per-turn transcripts
//! (`io/transcript`) are separate and unaffected by `RUST_LOG`.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn`, or `debug` for panepilot itself when
/// `debug` is set.
///
/// # Example
/// ```bash
/// RUST_LOG=panepilot=debug panepilot
/// ```
pub fn init(log_file: Option<&Path>, debug: bool) -> Result<()> {
    let default = if debug { "warn,panepilot=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                .try_init()
                .context("install tracing subscriber")?;
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr).compact())
                .try_init()
                .context("install tracing subscriber")?;
        }
    }
    Ok(())
}
