//! panepilot: a chat assistant living in a tmux pane.
//!
//! Started inside tmux, it takes over the current pane as the chat pane and
//! works on the other panes of the window. Started outside tmux, it opens a
//! new session and re-launches itself there.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use panepilot::exit_codes;
use panepilot::io::config::{PilotConfig, default_config_path, load_config, write_config};
use panepilot::io::confirm::TerminalConfirmer;
use panepilot::io::console::TerminalConsole;
use panepilot::io::interrupt::CancelScope;
use panepilot::io::model::OpenRouterClient;
use panepilot::io::tmux::{self, TmuxController};
use panepilot::logging;
use panepilot::repl;
use panepilot::turn::{Collaborators, Orchestrator};

#[derive(Debug, Parser)]
#[command(
    name = "panepilot",
    version,
    about = "Chat assistant that reads and drives the panes of your tmux window"
)]
struct Cli {
    /// Initial request, sent before the prompt opens.
    request: Vec<String>,

    /// Read the initial request from a file (appended after REQUEST).
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Config file; defaults to `<config_dir>/panepilot/config.toml`.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write a config file with default values and exit.
    #[arg(long)]
    init_config: bool,
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };

    if cli.init_config {
        init_config(&config_path)?;
        return Ok(exit_codes::OK);
    }

    let mut config = load_config(&config_path)?;
    config.apply_env();
    logging::init(config.log_file.as_deref(), config.debug)?;
    info!(config = %config_path.display(), "config loaded");

    let Some(chat_pane_id) = tmux::current_pane_id() else {
        return relaunch();
    };

    let request = initial_request(&cli.request, cli.file.as_deref())?;
    let mut orchestrator = start(config, &config_path, chat_pane_id)?;
    if let Some(request) = request {
        let outcome = orchestrator.submit(&request);
        debug!(?outcome, "initial request finished");
    }
    repl::run(&mut orchestrator)?;
    Ok(exit_codes::OK)
}

fn init_config(path: &Path) -> Result<()> {
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    write_config(path, &PilotConfig::default())?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn start(config: PilotConfig, config_path: &Path, chat_pane_id: String) -> Result<Orchestrator> {
    let cancel = CancelScope::new();
    cancel.listen_for_ctrl_c()?;
    let collaborators = Collaborators {
        panes: Box::new(TmuxController),
        model: Box::new(OpenRouterClient::new(&config.model)?),
        confirmer: Box::new(TerminalConfirmer::new()?),
        console: Box::new(TerminalConsole),
    };

    let debug = config.debug;
    let mut orchestrator = Orchestrator::new(config, chat_pane_id, collaborators, cancel);
    if debug {
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        info!(root = %root.display(), "writing transcripts");
        orchestrator = orchestrator.with_transcript(root);
    }
    orchestrator
        .init_exec_pane()
        .context("select exec pane")?;
    Ok(orchestrator)
}

/// REQUEST words joined by spaces, then the file content.
fn initial_request(words: &[String], file: Option<&Path>) -> Result<Option<String>> {
    let mut parts = Vec::new();
    if !words.is_empty() {
        parts.push(words.join(" "));
    }
    if let Some(path) = file {
        let content =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        parts.push(content.trim().to_string());
    }
    let request = parts.join("\n\n");
    Ok((!request.trim().is_empty()).then_some(request))
}

fn relaunch() -> Result<i32> {
    let command_line = std::env::args()
        .map(|arg| shell_quote(&arg))
        .collect::<Vec<_>>()
        .join(" ");
    info!(command_line = %command_line, "not inside tmux, starting a new session");
    match tmux::relaunch_in_new_session(&command_line) {
        Ok(()) => Ok(exit_codes::OK),
        Err(err) => {
            eprintln!("{err:#}");
            Ok(exit_codes::NO_TMUX)
        }
    }
}

/// Single-quote `arg` unless it is made of shell-safe characters only.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
