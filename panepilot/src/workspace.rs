//! Chat pane, primary exec pane and the exec history of prepared panes.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument};

use crate::core::exec_history;
use crate::core::types::{ExecHistoryEntry, PaneDetails};
use crate::io::tmux::PaneController;

/// Split arguments for a new exec pane next to the chat pane.
const SPLIT_ARGS: &[&str] = &["-d", "-h"];

/// Result of `/prepare`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub pane: PaneDetails,
    /// The marker prompt is visible after setup.
    pub prepared: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Workspace {
    chat_pane_id: String,
    exec_pane: Option<PaneDetails>,
    exec_history: Vec<ExecHistoryEntry>,
}

impl Workspace {
    pub fn new(chat_pane_id: impl Into<String>) -> Self {
        Self {
            chat_pane_id: chat_pane_id.into(),
            ..Self::default()
        }
    }

    pub fn chat_pane_id(&self) -> &str {
        &self.chat_pane_id
    }

    pub fn exec_pane(&self) -> Option<&PaneDetails> {
        self.exec_pane.as_ref()
    }

    pub fn exec_pane_id(&self) -> Option<&str> {
        self.exec_pane.as_ref().map(|pane| pane.id.as_str())
    }

    pub fn exec_history(&self) -> &[ExecHistoryEntry] {
        &self.exec_history
    }

    pub fn record(&mut self, entry: ExecHistoryEntry) {
        debug!(command = %entry.command, exit_code = entry.exit_code, "exec history entry");
        self.exec_history.push(entry);
    }

    /// Panes of the chat window, without content.
    pub fn list(&self, panes: &dyn PaneController) -> Result<Vec<PaneDetails>> {
        panes.list_panes(&self.chat_pane_id)
    }

    /// Use the first pane that is not the chat pane, or split one off.
    #[instrument(skip_all, fields(chat_pane = %self.chat_pane_id))]
    pub fn init_exec_pane(&mut self, panes: &dyn PaneController) -> Result<&PaneDetails> {
        let existing = self
            .list(panes)?
            .into_iter()
            .find(|pane| pane.id != self.chat_pane_id);
        let pane = match existing {
            Some(pane) => pane,
            None => self.split_exec_pane(panes)?,
        };
        info!(exec_pane = %pane.id, "exec pane selected");
        Ok(&*self.exec_pane.insert(pane))
    }

    /// Split a new pane off the chat pane and make it the exec pane.
    pub fn create_exec_pane(&mut self, panes: &dyn PaneController) -> Result<&PaneDetails> {
        let pane = self.split_exec_pane(panes)?;
        info!(exec_pane = %pane.id, "exec pane created");
        Ok(&*self.exec_pane.insert(pane))
    }

    fn split_exec_pane(&self, panes: &dyn PaneController) -> Result<PaneDetails> {
        let id = panes
            .split(&self.chat_pane_id, SPLIT_ARGS)
            .context("create exec pane")?;
        self.list(panes)?
            .into_iter()
            .find(|pane| pane.id == id)
            .ok_or_else(|| anyhow!("new pane {id} is missing from the window"))
    }

    /// The exec pane, initializing one if there is none yet.
    pub fn ensure_exec_pane(&mut self, panes: &dyn PaneController) -> Result<PaneDetails> {
        if let Some(pane) = &self.exec_pane {
            return Ok(pane.clone());
        }
        self.init_exec_pane(panes).cloned()
    }

    /// Look up `pane_id` in the chat window, or the exec pane when `None`.
    pub fn resolve(
        &mut self,
        panes: &dyn PaneController,
        pane_id: Option<&str>,
    ) -> Result<Option<PaneDetails>> {
        match pane_id {
            None => self.ensure_exec_pane(panes).map(Some),
            Some(id) => Ok(self.list(panes)?.into_iter().find(|pane| pane.id == id)),
        }
    }

    /// Every pane of the window with content captured. The stored exec pane
    /// is refreshed from the listing.
    pub fn snapshot(
        &mut self,
        panes: &dyn PaneController,
        max_lines: usize,
    ) -> Result<Vec<PaneDetails>> {
        let mut listed = self.list(panes)?;
        for pane in listed.iter_mut().filter(|pane| pane.id != self.chat_pane_id) {
            pane.content = panes.capture(&pane.id, max_lines)?;
        }
        if let Some(exec_id) = self.exec_pane_id().map(str::to_string) {
            self.exec_pane = listed.iter().find(|pane| pane.id == exec_id).cloned();
            if self.exec_pane.is_none() {
                info!(exec_pane = %exec_id, "exec pane disappeared");
            }
        }
        Ok(listed)
    }

    /// True when the exec pane shows the marker prompt.
    pub fn exec_pane_prepared(&self) -> bool {
        self.exec_pane
            .as_ref()
            .is_some_and(|pane| exec_history::is_prepared(&pane.content))
    }

    /// Switch a pane's shell prompt to the marker prompt, then load its
    /// exec history.
    #[instrument(skip(self, panes, settle))]
    pub fn prepare(
        &mut self,
        panes: &dyn PaneController,
        pane_id: Option<&str>,
        max_lines: usize,
        settle: Duration,
    ) -> Result<Prepared> {
        let Some(mut pane) = self.resolve(panes, pane_id)? else {
            bail!("Pane with ID {} not found.", pane_id.unwrap_or_default());
        };
        let Some(setup) = exec_history::prompt_setup_command(&pane.shell) else {
            bail!(
                "Pane {} runs {:?}; only bash, zsh, fish and sh can be prepared.",
                pane.id,
                pane.current_command
            );
        };
        panes.send_keys(&pane.id, setup, true)?;
        panes.send_keys(&pane.id, "clear", true)?;
        thread::sleep(settle);

        pane.content = panes.capture(&pane.id, max_lines)?;
        let prepared = exec_history::is_prepared(&pane.content);
        self.exec_history = exec_history::parse(&pane.content);
        if self.exec_pane_id() == Some(pane.id.as_str()) {
            self.exec_pane = Some(pane.clone());
        }
        info!(pane = %pane.id, prepared, entries = self.exec_history.len(), "pane prepared");
        Ok(Prepared { pane, prepared })
    }

    /// `/reset`: forget the exec pane and its history.
    pub fn reset(&mut self) {
        self.exec_pane = None;
        self.exec_history.clear();
    }
}
