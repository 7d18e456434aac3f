//! Slash-command execution.

use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use tracing::{info, instrument, warn};

use crate::core::budget;
use crate::core::command::{HELP, SlashCommand};
use crate::squash::Squashed;
use crate::turn::Orchestrator;

const LABEL_WIDTH: usize = 18;

/// Whether the REPL keeps reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

fn section(title: &str) -> String {
    title.bold().underline().to_string()
}

fn line(label: &str, value: impl std::fmt::Display) -> String {
    format!("{}  {value}", format!("{label:<LABEL_WIDTH$}").cyan())
}

/// `[#####.....] 50.0%`
fn usage_bar(percent: f64, width: usize) -> String {
    let filled = ((percent / 100.0) * width as f64).round().clamp(0.0, width as f64) as usize;
    format!(
        "[{}{}] {percent:.1}%",
        "#".repeat(filled),
        ".".repeat(width - filled)
    )
}

impl Orchestrator {
    #[instrument(skip(self))]
    pub fn execute(&mut self, command: SlashCommand) -> Result<Flow> {
        match command {
            SlashCommand::Help => self.console.plain(HELP),
            SlashCommand::Info => self.show_info()?,
            SlashCommand::Clear => {
                self.messages.clear();
                self.pending_files = None;
                self.panes.clear(self.workspace.chat_pane_id())?;
            }
            SlashCommand::Reset => self.reset()?,
            SlashCommand::Exit => {
                info!("exit requested");
                return Ok(Flow::Exit);
            }
            SlashCommand::Squash => {
                let token = self.cancel.fresh();
                match self.squash_history(&token) {
                    Squashed::Summarized { before, after } => {
                        self.say(&format!("Squashed {before} messages into {after}."));
                    }
                    Squashed::Trimmed { dropped } => {
                        self.say(&format!("Dropped {dropped} older messages."));
                    }
                    Squashed::Unchanged => self.say("Nothing to squash."),
                }
            }
            SlashCommand::Prepare { pane_id } => self.prepare(pane_id.as_deref()),
            SlashCommand::Watch { description } => {
                let end = self.watch(&description);
                info!(?end, "watch ended");
            }
            SlashCommand::WatchUsage => self.say("Usage: /watch <description>"),
            SlashCommand::ShowConfig => self.show_config(),
            SlashCommand::SetConfig { key, value } => match self.overrides.set(key, &value) {
                Ok(shown) => self.say(&format!("Set {key} = {shown}")),
                Err(err) => self.say(&err.to_string()),
            },
            SlashCommand::InvalidConfigKey(err) => self.say(&err.to_string()),
            SlashCommand::Unknown(input) => self.say(&format!(
                "Unknown command: {input}. Type '/help' to see available commands."
            )),
        }
        Ok(Flow::Continue)
    }

    /// Forget the conversation, clear every pane and pick the exec pane again.
    fn reset(&mut self) -> Result<()> {
        self.state.reset();
        self.messages.clear();
        self.pending_files = None;
        let chat = self.workspace.chat_pane_id().to_string();
        self.panes.clear(&chat)?;
        for pane in self.workspace.list(self.panes.as_ref())? {
            if pane.id != chat {
                self.panes.clear(&pane.id)?;
            }
        }
        self.workspace.reset();
        self.init_exec_pane()
    }

    fn prepare(&mut self, pane_id: Option<&str>) {
        let settings = self.settings();
        let settle = Duration::from_millis(self.config.settle_delay_ms);
        match self.workspace.prepare(
            self.panes.as_ref(),
            pane_id,
            settings.max_capture_lines,
            settle,
        ) {
            Ok(outcome) => {
                if outcome.prepared {
                    self.say(&format!("Pane {} prepared successfully.", outcome.pane.id));
                } else {
                    self.say(&format!(
                        "Sent the prompt setup to pane {}, but the marker prompt is not visible yet.",
                        outcome.pane.id
                    ));
                }
                let history = self.workspace.exec_history().len();
                self.console.plain(&format!(
                    "{} ({}, shell {}), {history} commands in exec history",
                    outcome.pane.id, outcome.pane.current_command, outcome.pane.shell
                ));
            }
            Err(err) => {
                warn!(err = %err, "prepare failed");
                self.say(&format!("Error: {err:#}"));
            }
        }
    }

    fn show_info(&mut self) -> Result<()> {
        let settings = self.settings();
        let tokens = budget::estimate_history(&self.messages);
        let percent = budget::usage_percent(tokens, settings.max_context_size);

        let mut out = vec![
            section("General"),
            line("Version", env!("CARGO_PKG_VERSION")),
            line("Model", &settings.model),
            line("Max Capture Lines", settings.max_capture_lines),
            line("Wait Interval", format!("{}s", settings.wait_interval_secs)),
            line("Status", self.state.status()),
            line("Watch Mode", self.state.watch_mode()),
            String::new(),
            section("Context"),
            line("Messages", self.messages.len()),
            line("Context Size~", format!("{tokens} tokens")),
            line("", usage_bar(percent, 10)),
            line("Max Size", format!("{} tokens", settings.max_context_size)),
            String::new(),
            section("Tmux Window Panes"),
        ];

        let chat = self.workspace.chat_pane_id().to_string();
        let exec = self.workspace.exec_pane_id().map(str::to_string);
        let panes = self.workspace.list(self.panes.as_ref())?;
        for pane in panes {
            let role = if pane.id == chat {
                "chat"
            } else if Some(&pane.id) == exec.as_ref() {
                "exec"
            } else {
                "read-only"
            };
            let content = self
                .panes
                .capture(&pane.id, settings.max_capture_lines)
                .unwrap_or_default();
            let prepared = crate::core::exec_history::is_prepared(&content);
            out.push(line(
                &format!("{} [{role}]", pane.id),
                format!(
                    "{}{}{}",
                    pane.current_command,
                    if pane.is_active { ", active" } else { "" },
                    if prepared { ", prepared" } else { "" },
                ),
            ));
        }
        self.console.plain(&out.join("\n"));
        Ok(())
    }

    fn show_config(&self) {
        let entries = self.settings().entries();
        let lines: Vec<String> = entries
            .into_iter()
            .map(|(key, value)| {
                let marker = if self.overrides.is_set(key) { " (session)" } else { "" };
                format!("{key}: {value}{marker}")
            })
            .collect();
        self.console.plain(&lines.join("\n"));
    }
}
