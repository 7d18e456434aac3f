//! Executes the actions of a validated model response.
//!
//! Order within one response: pane creation, commands, keys, pastes, file
//! reads. A declined confirmation stops the dispatch; nothing already sent is
//! rolled back.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::exec_history;
use crate::core::overrides::Settings;
use crate::core::types::{
    ExecCommand, ExecHistoryEntry, PaneDetails, ParsedResponse, PasteContent, ReadFileRequest,
    SendKeys,
};
use crate::io::confirm::Confirmer;
use crate::io::console::Console;
use crate::io::read_file::{self, ReadFileError};
use crate::io::tmux::PaneController;
use crate::workspace::Workspace;

/// Poll interval while a prepared pane runs a command.
const EXEC_POLL: Duration = Duration::from_millis(500);

/// Why dispatch stopped before running every action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// The user declined a confirmation.
    Declined,
    /// Ctrl-C while waiting on a prepared pane.
    Cancelled,
}

/// Outcome of one `<ReadFile>`.
#[derive(Debug)]
pub struct FileRead {
    pub path: String,
    pub result: Result<String, ReadFileError>,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub stop: Option<Stop>,
    pub files: Vec<FileRead>,
}

impl DispatchReport {
    fn stopped(stop: Stop) -> Self {
        Self {
            stop: Some(stop),
            files: Vec::new(),
        }
    }

    /// Message carrying file contents back to the model, if any were read.
    pub fn file_message(&self) -> Option<String> {
        if self.files.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .files
            .iter()
            .map(|file| match &file.result {
                Ok(content) => format!(
                    "Content of file {}:\n```\n{}\n```",
                    file.path,
                    content.trim_end()
                ),
                Err(err) => format!("Failed to read file {}: {err}", file.path),
            })
            .collect();
        Some(parts.join("\n\n"))
    }
}

pub struct Dispatcher<'a> {
    pub panes: &'a dyn PaneController,
    pub confirmer: &'a mut dyn Confirmer,
    pub console: &'a dyn Console,
    pub workspace: &'a mut Workspace,
    pub settings: &'a Settings,
    pub settle: Duration,
    pub cwd: &'a Path,
    pub cancel: &'a CancellationToken,
    pub glyph: &'static str,
}

impl Dispatcher<'_> {
    #[instrument(skip_all, fields(response = %response))]
    pub fn dispatch(&mut self, response: &ParsedResponse) -> Result<DispatchReport> {
        if response.create_exec_pane {
            let pane = self.workspace.create_exec_pane(self.panes)?;
            let id = pane.id.clone();
            self.say(&format!("Created new exec pane {id}."));
        }

        for command in &response.exec_commands {
            if let Some(stop) = self.exec_command(command)? {
                return Ok(DispatchReport::stopped(stop));
            }
        }

        if !response.send_keys.is_empty()
            && let Some(stop) = self.send_keys(&response.send_keys)?
        {
            return Ok(DispatchReport::stopped(stop));
        }

        for paste in &response.paste_contents {
            if let Some(stop) = self.paste(paste)? {
                return Ok(DispatchReport::stopped(stop));
            }
        }

        let files = response
            .read_files
            .iter()
            .map(|request| self.read_file(request))
            .collect::<Result<Vec<_>>>()?;
        Ok(DispatchReport { stop: None, files })
    }

    fn say(&self, text: &str) {
        self.console.status(self.glyph, text);
    }

    fn resolve(&mut self, pane_id: Option<&str>) -> Result<Option<PaneDetails>> {
        let pane = self.workspace.resolve(self.panes, pane_id)?;
        if pane.is_none() {
            let id = pane_id.unwrap_or_default();
            warn!(pane = %id, "target pane not found");
            self.say(&format!("Error: Could not find target pane with ID {id}"));
        }
        Ok(pane)
    }

    fn exec_command(&mut self, request: &ExecCommand) -> Result<Option<Stop>> {
        self.console.code(&request.command);
        let Some(mut target) = self.resolve(request.pane_id.as_deref())? else {
            return Ok(None);
        };

        let command = if self.settings.exec_confirm {
            let answer = self
                .confirmer
                .confirm(&request.command, "Execute this command?", true)?;
            if !answer.confirmed {
                info!("command declined");
                return Ok(Some(Stop::Declined));
            }
            answer.text
        } else {
            request.command.clone()
        };
        self.say(&format!("Executing command: {command}"));

        target.content = self
            .panes
            .capture(&target.id, self.settings.max_capture_lines)?;
        if exec_history::is_prepared(&target.content) {
            return self.exec_wait(&target, &command);
        }
        self.panes.send_keys(&target.id, &command, true)?;
        thread::sleep(self.settle);
        Ok(None)
    }

    /// Run `command` in a prepared pane and block until its prompt returns.
    fn exec_wait(&mut self, target: &PaneDetails, command: &str) -> Result<Option<Stop>> {
        let before = exec_history::prompt_count(&target.content);
        self.panes.send_keys(&target.id, command, true)?;
        loop {
            let capture = self
                .panes
                .capture(&target.id, self.settings.max_capture_lines)?;
            if exec_history::prompt_count(&capture) > before && exec_history::is_idle(&capture) {
                let entry = exec_history::parse(&capture)
                    .pop()
                    .unwrap_or_else(|| ExecHistoryEntry {
                        command: command.to_string(),
                        output: String::new(),
                        exit_code: 0,
                    });
                self.workspace.record(entry);
                return Ok(None);
            }
            if self.cancel.is_cancelled() {
                debug!(pane = %target.id, "exec wait cancelled");
                return Ok(Some(Stop::Cancelled));
            }
            thread::sleep(EXEC_POLL);
        }
    }

    /// Every pane's keys are confirmed before any pane receives one.
    fn send_keys(&mut self, requests: &[SendKeys]) -> Result<Option<Stop>> {
        let mut groups: Vec<(String, Vec<&str>)> = Vec::new();
        for request in requests {
            let Some(target) = self.resolve(request.pane_id.as_deref())? else {
                continue;
            };
            match groups.iter_mut().find(|(id, _)| *id == target.id) {
                Some((_, keys)) => keys.push(&request.keys),
                None => groups.push((target.id, vec![&request.keys])),
            }
        }

        for (id, keys) in &groups {
            self.say(&format!("Keys to send to pane {id}:"));
            self.console.code(&keys.join("\n"));
            if !self.settings.send_keys_confirm {
                continue;
            }
            let question = if keys.len() == 1 {
                format!("Send this key to pane {id}?")
            } else {
                format!("Send these keys to pane {id}?")
            };
            if !self.confirmer.confirm("keys shown above", &question, false)?.confirmed {
                info!(pane = %id, "keys declined");
                return Ok(Some(Stop::Declined));
            }
        }

        for (id, keys) in &groups {
            for key in keys {
                self.say(&format!("Sending to {id}: {key}"));
                self.panes.send_keys(id, key, false)?;
                thread::sleep(self.settle);
            }
        }
        Ok(None)
    }

    fn paste(&mut self, request: &PasteContent) -> Result<Option<Stop>> {
        let Some(target) = self.resolve(request.pane_id.as_deref())? else {
            return Ok(None);
        };
        self.say(&format!("Content to paste into pane {}:", target.id));
        self.console.code(&request.content);
        if self.settings.paste_multiline_confirm {
            let question = format!("Paste this content into pane {}?", target.id);
            if !self.confirmer.confirm(&request.content, &question, false)?.confirmed {
                info!(pane = %target.id, "paste declined");
                return Ok(Some(Stop::Declined));
            }
        }
        self.say("Pasting...");
        self.panes.paste(&target.id, &request.content)?;
        thread::sleep(self.settle);
        Ok(None)
    }

    /// Read failures, a declined confirmation included, become text for the
    /// model rather than stopping the dispatch.
    fn read_file(&mut self, request: &ReadFileRequest) -> Result<FileRead> {
        let result = match read_file::inspect(
            &request.path,
            self.cwd,
            self.settings.max_read_file_size,
        ) {
            Err(err) => Err(err),
            Ok(candidate) => {
                let confirmed = !self.settings.read_file_confirm || {
                    let question = format!(
                        "Read file {} ({} bytes)?",
                        candidate.path.display(),
                        candidate.size
                    );
                    self.confirmer.confirm("", &question, false)?.confirmed
                };
                if confirmed {
                    read_file::read(&candidate)
                } else {
                    Err(ReadFileError::Cancelled)
                }
            }
        };
        if let Err(err) = &result {
            self.say(&format!("Could not read {}: {err}", request.path));
        }
        Ok(FileRead {
            path: request.path.clone(),
            result,
        })
    }
}
