//! Watch mode: poll the window and comment when something matters.

use tracing::{debug, info, instrument};

use crate::turn::{Orchestrator, TurnOutcome};

/// How a watch session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEnd {
    /// The model reported the watch goal as met.
    Accomplished,
    /// Ctrl-C during the countdown between polls.
    Interrupted,
    /// A turn failed, was declined or was cancelled.
    Stopped(TurnOutcome),
}

/// First-turn text; later polls send only the window.
pub fn watch_request(description: &str) -> String {
    format!(
        "\n1. Find out if there is new content in the pane based on chat history.\n\
         2. Comment only considering the new content in this pane output.\n\n\
         Watch for: {description}"
    )
}

impl Orchestrator {
    /// Poll every `wait_interval_secs` until the goal is met or the session
    /// goes idle.
    #[instrument(skip(self))]
    pub fn watch(&mut self, description: &str) -> WatchEnd {
        self.state.begin_watch();
        let mut text = watch_request(description);
        let mut polls = 0u32;

        loop {
            let token = self.cancel.fresh();
            let wait = self.settings().wait_interval_secs;
            if !self.console.countdown(wait, &token) {
                info!(polls, "watch interrupted");
                self.state.stop_watch();
                return WatchEnd::Interrupted;
            }

            polls += 1;
            let outcome = self.run_chain(&text, token);
            text.clear();
            debug!(polls, ?outcome, "watch poll finished");

            if outcome == TurnOutcome::Accomplished {
                self.state.stop_watch();
                return WatchEnd::Accomplished;
            }
            if self.state.is_idle() || !self.state.watch_mode() {
                self.state.stop_watch();
                return WatchEnd::Stopped(outcome);
            }
        }
    }
}
