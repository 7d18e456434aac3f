//! Shared deterministic types for the conversation core.
//!
//! These types define the contracts between the tag scanner, the guideline
//! validator, the dispatcher and the orchestrator. They carry no I/O.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    pub from_user: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            from_user: true,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            from_user: false,
            timestamp: Utc::now(),
        }
    }
}

/// `<ExecCommand>`: run a shell command in a pane.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecCommand {
    pub command: String,
    /// Target pane; `None` addresses the primary exec pane.
    pub pane_id: Option<String>,
}

/// `<TmuxSendKeys>`: raw keystrokes, whitespace preserved.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendKeys {
    pub keys: String,
    pub pane_id: Option<String>,
}

/// `<PasteMultilineContent>`: a block pasted through a tmux buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PasteContent {
    pub content: String,
    pub pane_id: Option<String>,
}

/// `<ReadFile>`: a file whose content is sent back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadFileRequest {
    pub path: String,
    pub pane_id: Option<String>,
}

/// Structured result of scanning one model reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedResponse {
    /// Reply text with every recognized tag removed.
    pub message: String,
    pub exec_commands: Vec<ExecCommand>,
    pub send_keys: Vec<SendKeys>,
    pub paste_contents: Vec<PasteContent>,
    pub read_files: Vec<ReadFileRequest>,
    pub request_accomplished: bool,
    pub exec_pane_seems_busy: bool,
    pub waiting_for_user_response: bool,
    pub no_comment: bool,
    pub create_exec_pane: bool,
}

impl ParsedResponse {
    /// True for responses that must not be recorded in history.
    pub fn is_transient(&self) -> bool {
        self.exec_pane_seems_busy || self.no_comment
    }
}

impl fmt::Display for ParsedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exec={} keys={} paste={} read={} accomplished={} busy={} waiting={} no_comment={} create_pane={}",
            self.exec_commands.len(),
            self.send_keys.len(),
            self.paste_contents.len(),
            self.read_files.len(),
            self.request_accomplished,
            self.exec_pane_seems_busy,
            self.waiting_for_user_response,
            self.no_comment,
            self.create_exec_pane,
        )
    }
}

/// A command observed in a prepared pane together with its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecHistoryEntry {
    pub command: String,
    pub output: String,
    pub exit_code: i32,
}

/// Snapshot of one multiplexer pane.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PaneDetails {
    pub id: String,
    pub is_active: bool,
    pub pid: u32,
    pub current_command: String,
    pub args: String,
    pub history_size: u64,
    pub history_limit: u64,
    /// The pane runs something other than a plain login shell (ssh, a REPL, ...).
    pub is_sub_shell: bool,
    pub shell: String,
    pub os: String,
    /// Captured visible content; empty until refreshed.
    pub content: String,
}
