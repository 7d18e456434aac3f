//! Conversation orchestration.
//!
//! One human request becomes a chain of model exchanges. Each exchange
//! snapshots the window, asks the model, scans and validates the reply,
//! dispatches its actions and then decides through [`Continuation`] whether
//! the chain goes on. The chain is a loop; nothing recurses.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::budget;
use crate::core::guidelines::{self, GuidelineViolation};
use crate::core::overrides::{SessionOverrides, Settings};
use crate::core::session::SessionState;
use crate::core::tags;
use crate::core::types::{ChatMessage, ParsedResponse};
use crate::dispatch::{Dispatcher, Stop};
use crate::io::config::PilotConfig;
use crate::io::confirm::Confirmer;
use crate::io::console::Console;
use crate::io::interrupt::CancelScope;
use crate::io::model::{ModelClient, ModelError};
use crate::io::prompt::{PromptEngine, PromptMode, TurnSnapshot};
use crate::io::tmux::PaneController;
use crate::io::transcript::{Exchange, Transcript};
use crate::workspace::Workspace;

pub const UPDATED_PANES: &str = "sending updated pane(s) content";

/// The real or scripted implementations the orchestrator drives.
pub struct Collaborators {
    pub panes: Box<dyn PaneController>,
    pub model: Box<dyn ModelClient>,
    pub confirmer: Box<dyn Confirmer>,
    pub console: Box<dyn Console>,
}

/// How a chain of exchanges ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Accomplished,
    WaitingForUser,
    NoComment,
    /// Actions ran during a watch turn; the watch loop decides what follows.
    Acted,
    Declined,
    Cancelled,
    Failed,
    /// The model kept breaking the tag rules.
    GuidelineRetriesExhausted,
}

/// Text for the next exchange of the same chain.
#[derive(Debug, Clone, Default)]
struct Followup {
    text: String,
    /// Rejected exchanges, shown to the model but kept out of history.
    replay: Vec<ChatMessage>,
    violations: u32,
    /// Run the next exchange under a new cancellation token.
    fresh_scope: bool,
}

impl Followup {
    fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

enum Continuation {
    Done(TurnOutcome),
    Next(Followup),
}

pub struct Orchestrator {
    pub(crate) config: PilotConfig,
    pub(crate) prompts: PromptEngine,
    pub(crate) panes: Box<dyn PaneController>,
    pub(crate) model: Box<dyn ModelClient>,
    pub(crate) confirmer: Box<dyn Confirmer>,
    pub(crate) console: Box<dyn Console>,
    pub(crate) cancel: CancelScope,
    pub(crate) state: SessionState,
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) workspace: Workspace,
    pub(crate) overrides: SessionOverrides,
    pub(crate) transcript: Option<Transcript>,
    pub(crate) cwd: PathBuf,
    /// File results held back by a reply that ended the turn; they lead the
    /// next turn's text.
    pub(crate) pending_files: Option<String>,
}

impl Orchestrator {
    pub fn new(
        config: PilotConfig,
        chat_pane_id: impl Into<String>,
        collaborators: Collaborators,
        cancel: CancelScope,
    ) -> Self {
        let Collaborators {
            panes,
            model,
            confirmer,
            console,
        } = collaborators;
        Self {
            prompts: PromptEngine::new(config.prompts.clone()),
            config,
            panes,
            model,
            confirmer,
            console,
            cancel,
            state: SessionState::default(),
            messages: Vec::new(),
            workspace: Workspace::new(chat_pane_id),
            overrides: SessionOverrides::default(),
            transcript: None,
            cwd: std::env::current_dir().unwrap_or_default(),
            pending_files: None,
        }
    }

    /// Write every exchange under `root/transcripts/`.
    pub fn with_transcript(mut self, root: impl Into<PathBuf>) -> Self {
        self.transcript = Some(Transcript::new(root));
        self
    }

    /// Directory relative `<ReadFile>` paths resolve against.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn init_exec_pane(&mut self) -> Result<()> {
        let pane = self.workspace.init_exec_pane(self.panes.as_ref())?;
        debug!(exec_pane = %pane.id, "exec pane ready");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Config values with session overrides applied.
    pub fn settings(&self) -> Settings {
        self.overrides.apply(&self.config.settings())
    }

    pub(crate) fn say(&self, text: &str) {
        self.console.status(self.state.glyph(), text);
    }

    /// Handle one non-command line from the human.
    pub fn submit(&mut self, text: &str) -> TurnOutcome {
        self.state.begin_turn();
        let token = self.cancel.fresh();
        self.run_chain(text, token)
    }

    /// Run exchanges until one ends the chain.
    pub(crate) fn run_chain(&mut self, text: &str, token: CancellationToken) -> TurnOutcome {
        let mut token = token;
        let mut next = match self.pending_files.take() {
            Some(files) => Followup::new(join_paragraphs(&files, text)),
            None => Followup::new(text),
        };
        loop {
            match self.exchange(&next, &token) {
                Continuation::Done(outcome) => {
                    info!(?outcome, status = %self.state.status(), "turn finished");
                    return outcome;
                }
                Continuation::Next(followup) => {
                    if followup.fresh_scope {
                        token = self.cancel.fresh();
                    }
                    next = followup;
                }
            }
        }
    }

    fn fail(&mut self, context: &str, err: &anyhow::Error) -> Continuation {
        warn!(err = %err, "{context}");
        self.state.finish();
        self.say(&format!("{context}: {err:#}"));
        Continuation::Done(TurnOutcome::Failed)
    }

    #[instrument(skip_all, fields(violations = input.violations))]
    fn exchange(&mut self, input: &Followup, cancel: &CancellationToken) -> Continuation {
        let settings = self.settings();

        let snapshot = match self
            .workspace
            .snapshot(self.panes.as_ref(), settings.max_capture_lines)
        {
            Ok(snapshot) => snapshot,
            Err(err) => return self.fail("Failed to read the tmux window", &err),
        };
        let mode = if self.state.watch_mode() {
            PromptMode::Watch
        } else if self.workspace.exec_pane_prepared() {
            PromptMode::PreparedAssistant
        } else {
            PromptMode::Assistant
        };
        let rendered = self.prompts.system_prompt(mode).and_then(|system| {
            let turn = self.prompts.turn_message(
                TurnSnapshot {
                    panes: &snapshot,
                    exec_pane_id: self.workspace.exec_pane_id(),
                    chat_pane_id: self.workspace.chat_pane_id(),
                },
                &input.text,
            )?;
            Ok((system, turn))
        });
        let (system, turn) = match rendered {
            Ok(rendered) => rendered,
            Err(err) => return self.fail("Failed to render the prompt", &err),
        };
        let current = ChatMessage::user(turn);

        if budget::needs_squash(&self.messages, &current.content, settings.max_context_size) {
            self.say("Exceeded context size, squashing history...");
            self.squash_history(cancel);
        }

        let mut outgoing = Vec::with_capacity(self.messages.len() + input.replay.len() + 2);
        outgoing.push(ChatMessage::assistant(system));
        outgoing.extend(self.messages.iter().cloned());
        outgoing.extend(input.replay.iter().cloned());
        outgoing.push(current.clone());

        let started = Instant::now();
        let reply = {
            let _spinner = self.console.spinner();
            self.model.send(&outgoing, &settings.model, cancel)
        };
        let reply = match reply {
            Ok(reply) => reply,
            Err(ModelError::Cancelled) => {
                debug!("model request cancelled");
                self.state.finish();
                return Continuation::Done(TurnOutcome::Cancelled);
            }
            Err(ModelError::Other(err)) => {
                self.record_transcript(&outgoing, &format!("ERROR: {err:#}"), None, None, started);
                return self.fail("Failed to get response from AI", &err);
            }
        };

        let parsed = tags::scan(&reply);
        debug!(parsed = %parsed, "scanned reply");
        let verdict = guidelines::validate(&parsed);
        self.record_transcript(
            &outgoing,
            &reply,
            Some(&parsed),
            verdict.as_ref().err(),
            started,
        );

        if let Err(violation) = verdict {
            return self.retry_after_violation(input, violation, current, reply);
        }
        self.after_valid_reply(parsed, current, reply, &settings, cancel)
    }

    fn retry_after_violation(
        &mut self,
        input: &Followup,
        violation: GuidelineViolation,
        current: ChatMessage,
        reply: String,
    ) -> Continuation {
        info!(violation = %violation, "reply broke the tag rules");
        if input.violations >= self.config.max_guideline_retries {
            self.state.finish();
            self.say(&format!(
                "AI didn't follow guidelines after {} retries, giving up.",
                input.violations
            ));
            return Continuation::Done(TurnOutcome::GuidelineRetriesExhausted);
        }
        self.say("AI didn't follow guidelines, trying again...");
        let mut replay = input.replay.clone();
        replay.push(current);
        replay.push(ChatMessage::assistant(reply));
        Continuation::Next(Followup {
            text: violation.to_string(),
            replay,
            violations: input.violations + 1,
            fresh_scope: false,
        })
    }

    fn after_valid_reply(
        &mut self,
        parsed: ParsedResponse,
        current: ChatMessage,
        reply: String,
        settings: &Settings,
        cancel: &CancellationToken,
    ) -> Continuation {
        if !parsed.message.is_empty() {
            self.console.assistant(&parsed.message);
        }
        if !parsed.is_transient() {
            self.messages.push(current);
            self.messages.push(ChatMessage::assistant(reply));
        }

        let glyph = self.state.glyph();
        let dispatched = Dispatcher {
            panes: self.panes.as_ref(),
            confirmer: self.confirmer.as_mut(),
            console: self.console.as_ref(),
            workspace: &mut self.workspace,
            settings,
            settle: Duration::from_millis(self.config.settle_delay_ms),
            cwd: &self.cwd,
            cancel,
            glyph,
        }
        .dispatch(&parsed);
        let report = match dispatched {
            Ok(report) => report,
            Err(err) => return self.fail("Failed to act on the tmux window", &err),
        };
        match report.stop {
            Some(Stop::Declined) => {
                self.state.finish();
                return Continuation::Done(TurnOutcome::Declined);
            }
            Some(Stop::Cancelled) => {
                self.state.finish();
                return Continuation::Done(TurnOutcome::Cancelled);
            }
            None => {}
        }

        let files = report.file_message();
        let ends_turn = !parsed.exec_pane_seems_busy
            && (parsed.request_accomplished
                || parsed.waiting_for_user_response
                || parsed.no_comment);
        if let Some(files) = files.as_deref()
            && ends_turn
        {
            debug!("holding file results for the next turn");
            self.pending_files = Some(match self.pending_files.take() {
                Some(held) => join_paragraphs(&held, files),
                None => files.to_string(),
            });
        }

        if parsed.exec_pane_seems_busy {
            let wait = settings.wait_interval_secs;
            if !self.console.countdown(wait, cancel) {
                self.state.finish();
                return Continuation::Done(TurnOutcome::Cancelled);
            }
            let waited = format!("waited for {wait} more seconds, here is the current pane(s) content");
            return Continuation::Next(Followup {
                fresh_scope: true,
                ..Followup::new(match files {
                    Some(files) => join_paragraphs(&files, &waited),
                    None => waited,
                })
            });
        }
        if parsed.request_accomplished {
            self.state.finish();
            return Continuation::Done(TurnOutcome::Accomplished);
        }
        if parsed.waiting_for_user_response {
            self.state.wait_for_user();
            return Continuation::Done(TurnOutcome::WaitingForUser);
        }
        if parsed.no_comment {
            return Continuation::Done(TurnOutcome::NoComment);
        }
        if let Some(files) = files {
            return Continuation::Next(Followup::new(files));
        }
        if self.state.watch_mode() {
            return Continuation::Done(TurnOutcome::Acted);
        }
        Continuation::Next(Followup::new(UPDATED_PANES))
    }

    fn record_transcript(
        &mut self,
        outgoing: &[ChatMessage],
        reply: &str,
        parsed: Option<&ParsedResponse>,
        violation: Option<&GuidelineViolation>,
        started: Instant,
    ) {
        let Some(transcript) = self.transcript.as_mut() else {
            return;
        };
        let model = self.overrides.apply(&self.config.settings()).model;
        let exchange = Exchange {
            model: &model,
            messages: outgoing,
            response: reply,
            parsed: parsed.map(ToString::to_string).unwrap_or_default(),
            violation: violation.map(ToString::to_string),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        if let Err(err) = transcript.record(&exchange) {
            warn!(err = %err, "could not write transcript");
        }
    }
}

/// `first`, a blank line, then `second`; empty parts are skipped.
fn join_paragraphs(first: &str, second: &str) -> String {
    match (first.is_empty(), second.is_empty()) {
        (_, true) => first.to_string(),
        (true, false) => second.to_string(),
        (false, false) => format!("{first}\n\n{second}"),
    }
}
