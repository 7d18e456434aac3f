//! History compaction.
//!
//! Older messages are summarized by the model into one message; the most
//! recent exchanges stay verbatim. When the model cannot summarize, the
//! older messages are dropped instead.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::budget;
use crate::core::types::ChatMessage;
use crate::io::model::ModelError;
use crate::turn::Orchestrator;

/// Messages kept verbatim: the last two exchanges.
const KEEP_RECENT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Squashed {
    /// `before` messages became a summary plus the recent ones.
    Summarized { before: usize, after: usize },
    /// Summarizing failed; the oldest `dropped` messages were discarded.
    Trimmed { dropped: usize },
    /// Too little history to compact, or cancelled.
    Unchanged,
}

impl Orchestrator {
    pub fn squash_history(&mut self, cancel: &CancellationToken) -> Squashed {
        let before = self.messages.len();
        if before <= KEEP_RECENT {
            return Squashed::Unchanged;
        }
        let split = before - KEEP_RECENT;
        let model = self.settings().model;

        let summary = self
            .prompts
            .squash_request(&self.messages[..split])
            .map_err(ModelError::Other)
            .and_then(|request| {
                let _spinner = self.console.spinner();
                self.model
                    .send(&[ChatMessage::user(request)], &model, cancel)
            });

        match summary {
            Ok(summary) => {
                let mut squashed = vec![ChatMessage::assistant(format!(
                    "Summary of the earlier conversation:\n{}",
                    summary.trim()
                ))];
                squashed.extend(self.messages.drain(split..));
                self.messages = squashed;
                let after = self.messages.len();
                info!(
                    before,
                    after,
                    tokens = budget::estimate_history(&self.messages),
                    "history squashed"
                );
                Squashed::Summarized { before, after }
            }
            Err(ModelError::Cancelled) => Squashed::Unchanged,
            Err(ModelError::Other(err)) => {
                warn!(err = %err, "summary failed, dropping old messages");
                self.say(&format!("Could not summarize history ({err:#}); dropping older messages."));
                self.messages.drain(..split);
                Squashed::Trimmed { dropped: split }
            }
        }
    }
}
