//! Scripted collaborators for driving the conversation loop in tests.
//!
//! Each fake is a cheap handle over shared state: give one clone to the
//! orchestrator and keep another to script replies and inspect effects.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use anyhow::{Result, anyhow};
use tokio_util::sync::CancellationToken;

use crate::core::types::{ChatMessage, PaneDetails};
use crate::io::config::PilotConfig;
use crate::io::confirm::{Confirmation, Confirmer};
use crate::io::console::{Console, Progress};
use crate::io::model::{ModelClient, ModelError};
use crate::io::tmux::PaneController;

const SHELLS: &[&str] = &["bash", "zsh", "fish", "sh"];

/// Config with confirmations off and no delays.
pub fn quiet_config() -> PilotConfig {
    PilotConfig {
        exec_confirm: false,
        send_keys_confirm: false,
        paste_multiline_confirm: false,
        read_file_confirm: false,
        settle_delay_ms: 0,
        wait_interval_secs: 1,
        ..PilotConfig::default()
    }
}

fn pane(id: &str, command: &str, active: bool) -> PaneDetails {
    let shell = SHELLS.contains(&command);
    PaneDetails {
        id: id.to_string(),
        is_active: active,
        current_command: command.to_string(),
        shell: if shell { command.to_string() } else { String::new() },
        is_sub_shell: !shell,
        os: "linux".to_string(),
        ..PaneDetails::default()
    }
}

#[derive(Debug, Default)]
struct PaneState {
    panes: Vec<PaneDetails>,
    next_id: usize,
    /// Mutations in call order: `send`, `paste`, `split`, `kill`, `clear`.
    events: Vec<String>,
    sent: BTreeMap<String, Vec<String>>,
    pasted: BTreeMap<String, Vec<String>>,
    splits: Vec<(String, String)>,
    after_send: BTreeMap<String, VecDeque<String>>,
}

/// In-memory tmux window.
#[derive(Debug, Clone, Default)]
pub struct FakePanes {
    state: Rc<RefCell<PaneState>>,
}

impl FakePanes {
    /// Panes as `(id, current_command)`; the first one is active.
    pub fn new(panes: &[(&str, &str)]) -> Self {
        let panes: Vec<PaneDetails> = panes
            .iter()
            .enumerate()
            .map(|(i, (id, command))| pane(id, command, i == 0))
            .collect();
        let next_id = panes.len();
        Self {
            state: Rc::new(RefCell::new(PaneState {
                panes,
                next_id,
                ..PaneState::default()
            })),
        }
    }

    pub fn set_content(&self, id: &str, content: &str) {
        let mut state = self.state.borrow_mut();
        if let Some(pane) = state.panes.iter_mut().find(|pane| pane.id == id) {
            pane.content = content.to_string();
        }
    }

    /// Replace the pane's content after the next send to it.
    pub fn respond_to_send(&self, id: &str, content: &str) {
        self.state
            .borrow_mut()
            .after_send
            .entry(id.to_string())
            .or_default()
            .push_back(content.to_string());
    }

    pub fn sent(&self, id: &str) -> Vec<String> {
        self.state.borrow().sent.get(id).cloned().unwrap_or_default()
    }

    pub fn pasted(&self, id: &str) -> Vec<String> {
        self.state.borrow().pasted.get(id).cloned().unwrap_or_default()
    }

    /// `(target, args joined by spaces)` per split.
    pub fn splits(&self) -> Vec<(String, String)> {
        self.state.borrow().splits.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.state.borrow().events.clone()
    }

    pub fn pane_ids(&self) -> Vec<String> {
        self.state.borrow().panes.iter().map(|pane| pane.id.clone()).collect()
    }
}

impl PaneController for FakePanes {
    fn list_panes(&self, _pane_id: &str) -> Result<Vec<PaneDetails>> {
        Ok(self
            .state
            .borrow()
            .panes
            .iter()
            .map(|pane| PaneDetails {
                content: String::new(),
                ..pane.clone()
            })
            .collect())
    }

    fn capture(&self, pane_id: &str, _max_lines: usize) -> Result<String> {
        self.state
            .borrow()
            .panes
            .iter()
            .find(|pane| pane.id == pane_id)
            .map(|pane| pane.content.trim().to_string())
            .ok_or_else(|| anyhow!("can't find pane: {pane_id}"))
    }

    fn send_keys(&self, pane_id: &str, text: &str, _auto_enter: bool) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.events.push(format!("send {pane_id} {text}"));
        state
            .sent
            .entry(pane_id.to_string())
            .or_default()
            .push(text.to_string());
        let next = state
            .after_send
            .get_mut(pane_id)
            .and_then(VecDeque::pop_front);
        if let Some(content) = next
            && let Some(pane) = state.panes.iter_mut().find(|pane| pane.id == pane_id)
        {
            pane.content = content;
        }
        Ok(())
    }

    fn paste(&self, pane_id: &str, text: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.events.push(format!("paste {pane_id} {text}"));
        state
            .pasted
            .entry(pane_id.to_string())
            .or_default()
            .push(text.to_string());
        Ok(())
    }

    fn split(&self, target: &str, args: &[&str]) -> Result<String> {
        let mut state = self.state.borrow_mut();
        let id = format!("%{}", state.next_id);
        state.next_id += 1;
        state.events.push(format!("split {target}"));
        state.splits.push((target.to_string(), args.join(" ")));
        state.panes.push(pane(&id, "zsh", false));
        Ok(id)
    }

    fn kill(&self, pane_id: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.events.push(format!("kill {pane_id}"));
        state.panes.retain(|pane| pane.id != pane_id);
        Ok(())
    }

    fn clear(&self, pane_id: &str) -> Result<()> {
        self.state.borrow_mut().events.push(format!("clear {pane_id}"));
        Ok(())
    }
}

#[derive(Debug)]
enum Reply {
    Text(String),
    Fail(String),
    Cancelled,
}

#[derive(Debug, Default)]
struct ModelState {
    replies: VecDeque<Reply>,
    requests: Vec<Vec<ChatMessage>>,
    models: Vec<String>,
}

/// Model that answers from a queue and records every request.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    state: Rc<RefCell<ModelState>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, text: &str) -> &Self {
        self.push(Reply::Text(text.to_string()))
    }

    pub fn fail(&self, message: &str) -> &Self {
        self.push(Reply::Fail(message.to_string()))
    }

    pub fn cancel(&self) -> &Self {
        self.push(Reply::Cancelled)
    }

    fn push(&self, reply: Reply) -> &Self {
        self.state.borrow_mut().replies.push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.state.borrow().requests.clone()
    }

    /// Last message of each request, i.e. the current-turn message.
    pub fn turn_texts(&self) -> Vec<String> {
        self.state
            .borrow()
            .requests
            .iter()
            .filter_map(|request| request.last().map(|message| message.content.clone()))
            .collect()
    }

    pub fn models(&self) -> Vec<String> {
        self.state.borrow().models.clone()
    }

    pub fn remaining(&self) -> usize {
        self.state.borrow().replies.len()
    }
}

impl ModelClient for ScriptedModel {
    fn send(
        &self,
        messages: &[ChatMessage],
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ModelError> {
        let mut state = self.state.borrow_mut();
        state.requests.push(messages.to_vec());
        state.models.push(model.to_string());
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }
        match state.replies.pop_front() {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(message)) => Err(ModelError::Other(anyhow!(message))),
            Some(Reply::Cancelled) => Err(ModelError::Cancelled),
            None => Err(ModelError::Other(anyhow!("scripted model has no reply left"))),
        }
    }
}

#[derive(Debug, Default)]
struct ConfirmState {
    answers: VecDeque<Option<String>>,
    questions: Vec<String>,
}

/// Answers confirmations from a queue; accepts when the queue is empty.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConfirmer {
    state: Rc<RefCell<ConfirmState>>,
}

impl ScriptedConfirmer {
    pub fn push_accept(&self) {
        self.state.borrow_mut().answers.push_back(Some(String::new()));
    }

    pub fn push_decline(&self) {
        self.state.borrow_mut().answers.push_back(None);
    }

    /// Accept with the preview replaced by `text`.
    pub fn push_edit(&self, text: &str) {
        self.state
            .borrow_mut()
            .answers
            .push_back(Some(text.to_string()));
    }

    pub fn questions(&self) -> Vec<String> {
        self.state.borrow().questions.clone()
    }
}

impl Confirmer for ScriptedConfirmer {
    fn confirm(&mut self, preview: &str, question: &str, allow_edit: bool) -> Result<Confirmation> {
        let mut state = self.state.borrow_mut();
        state.questions.push(question.to_string());
        Ok(match state.answers.pop_front() {
            None => Confirmation::accepted(preview),
            Some(None) => Confirmation::declined(),
            Some(Some(edited)) if allow_edit && !edited.is_empty() => {
                Confirmation::accepted(edited)
            }
            Some(Some(_)) => Confirmation::accepted(preview),
        })
    }
}

#[derive(Debug, Default)]
struct ConsoleState {
    lines: Vec<String>,
    countdowns: Vec<u64>,
    cancel_countdowns_after: Option<usize>,
}

/// Console that keeps everything it is asked to show.
#[derive(Debug, Clone, Default)]
pub struct RecordingConsole {
    state: Rc<RefCell<ConsoleState>>,
}

impl RecordingConsole {
    pub fn lines(&self) -> Vec<String> {
        self.state.borrow().lines.clone()
    }

    pub fn countdowns(&self) -> Vec<u64> {
        self.state.borrow().countdowns.clone()
    }

    /// Report the countdown after the first `n` as cancelled, like a Ctrl-C.
    pub fn interrupt_countdowns_after(&self, n: usize) {
        self.state.borrow_mut().cancel_countdowns_after = Some(n);
    }

    fn push(&self, text: &str) {
        self.state.borrow_mut().lines.push(text.to_string());
    }
}

impl Console for RecordingConsole {
    fn status(&self, _glyph: &str, text: &str) {
        self.push(text);
    }

    fn plain(&self, text: &str) {
        self.push(text);
    }

    fn assistant(&self, text: &str) {
        self.push(text);
    }

    fn code(&self, text: &str) {
        self.push(text);
    }

    fn countdown(&self, secs: u64, cancel: &CancellationToken) -> bool {
        let mut state = self.state.borrow_mut();
        state.countdowns.push(secs);
        let interrupted = state
            .cancel_countdowns_after
            .is_some_and(|n| state.countdowns.len() > n);
        !interrupted && !cancel.is_cancelled()
    }

    fn spinner(&self) -> Progress {
        Progress::hidden()
    }
}
