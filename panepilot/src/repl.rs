//! Interactive prompt on the chat pane.

use std::borrow::Cow::{self, Borrowed, Owned};

use anyhow::{Context as _, Result};
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tracing::{debug, warn};

use crate::commands::Flow;
use crate::core::command::{self, ALL_COMMANDS};
use crate::io::console::prefix;
use crate::turn::Orchestrator;

/// Completion and hints for slash commands.
#[derive(Debug, Clone, Default)]
pub struct PilotHelper;

impl PilotHelper {
    fn matching(prefix: &str) -> impl Iterator<Item = &'static str> + '_ {
        ALL_COMMANDS
            .into_iter()
            .filter(move |name| name.starts_with(prefix))
    }
}

impl Helper for PilotHelper {}

impl Completer for PilotHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return Ok((0, Vec::new()));
        }
        let candidates = Self::matching(line)
            .map(|name| Pair {
                display: name.to_string(),
                replacement: name.to_string(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Hinter for PilotHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Option<String> {
        let line = &line[..pos];
        if !line.starts_with('/') || line.contains(' ') {
            return None;
        }
        Self::matching(line)
            .find(|name| name.len() > line.len())
            .map(|name| name[line.len()..].to_string())
    }
}

impl Highlighter for PilotHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if line.starts_with('/') {
            Owned(line.bright_cyan().to_string())
        } else {
            Borrowed(line)
        }
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned(hint.dimmed().to_string())
    }
}

impl Validator for PilotHelper {}

/// Read lines until `/exit` or Ctrl-D.
pub fn run(orchestrator: &mut Orchestrator) -> Result<()> {
    let mut editor: Editor<PilotHelper, DefaultHistory> =
        Editor::new().context("create line editor")?;
    editor.set_helper(Some(PilotHelper));

    loop {
        let prompt = prefix(orchestrator.state().glyph());
        match editor.readline(&prompt) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if let Err(err) = editor.add_history_entry(input) {
                    debug!(err = %err, "history entry not added");
                }

                if command::is_command(input) {
                    match orchestrator.execute(command::parse(input)) {
                        Ok(Flow::Exit) => break,
                        Ok(Flow::Continue) => {}
                        Err(err) => {
                            warn!(err = %err, "command failed");
                            eprintln!("{}", format!("Error: {err:#}").red());
                        }
                    }
                } else {
                    let outcome = orchestrator.submit(input);
                    debug!(?outcome, "turn finished");
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "Press Ctrl-D or type /exit to quit.".dimmed());
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("read input"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustyline::history::MemHistory;

    fn hint(line: &str) -> Option<String> {
        let history = MemHistory::new();
        let ctx = Context::new(&history);
        PilotHelper.hint(line, line.len(), &ctx)
    }

    #[test]
    fn hints_complete_the_first_matching_command() {
        assert_eq!(hint("/he"), Some("lp".to_string()));
        assert_eq!(hint("/w"), Some("atch".to_string()));
        assert_eq!(hint("/help"), None);
        assert_eq!(hint("/watch tests"), None);
        assert_eq!(hint("hello"), None);
    }

    #[test]
    fn completion_lists_prefix_matches() {
        let history = MemHistory::new();
        let ctx = Context::new(&history);
        let (start, pairs) = PilotHelper.complete("/c", 2, &ctx).expect("complete");
        assert_eq!(start, 0);
        let names: Vec<String> = pairs.into_iter().map(|pair| pair.replacement).collect();
        assert_eq!(names, vec!["/clear".to_string(), "/config".to_string()]);
    }
}
