//! Interactive confirmation before acting on a pane.

use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::debug;

/// Outcome of a confirmation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub confirmed: bool,
    /// The preview, possibly edited by the user.
    pub text: String,
}

impl Confirmation {
    pub fn accepted(text: impl Into<String>) -> Self {
        Self {
            confirmed: true,
            text: text.into(),
        }
    }

    pub fn declined() -> Self {
        Self {
            confirmed: false,
            text: String::new(),
        }
    }
}

pub trait Confirmer {
    /// Ask `question` about `preview`. With `allow_edit`, the user may rewrite
    /// the preview before accepting it.
    fn confirm(&mut self, preview: &str, question: &str, allow_edit: bool) -> Result<Confirmation>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    Edit,
}

/// Empty input accepts; anything unrecognized declines.
fn parse_answer(input: &str, allow_edit: bool) -> Answer {
    match input.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "yes" => Answer::Yes,
        "e" | "edit" if allow_edit => Answer::Edit,
        _ => Answer::No,
    }
}

/// Line-editor backed prompt on the chat pane.
pub struct TerminalConfirmer {
    editor: DefaultEditor,
}

impl TerminalConfirmer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new().context("create confirmation line editor")?,
        })
    }

    fn read(&mut self, prompt: &str, initial: &str) -> Result<Option<String>> {
        match self.editor.readline_with_initial(prompt, (initial, "")) {
            Ok(line) => Ok(Some(line)),
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err).context("read confirmation"),
        }
    }
}

impl Confirmer for TerminalConfirmer {
    fn confirm(&mut self, preview: &str, question: &str, allow_edit: bool) -> Result<Confirmation> {
        let choices = if allow_edit { "[Y]es/No/Edit" } else { "[Y]es/No" };
        let prompt = format!("{} {} ", question.bold(), choices.dimmed());
        let Some(answer) = self.read(&prompt, "")? else {
            return Ok(Confirmation::declined());
        };

        match parse_answer(&answer, allow_edit) {
            Answer::Yes => Ok(Confirmation::accepted(preview)),
            Answer::No => Ok(Confirmation::declined()),
            Answer::Edit => {
                let edited = self.read(&format!("{} ", "edit »".yellow()), preview)?;
                match edited.map(|text| text.trim().to_string()) {
                    Some(text) if !text.is_empty() => {
                        debug!(edited = %text, "confirmation edited");
                        Ok(Confirmation::accepted(text))
                    }
                    _ => Ok(Confirmation::declined()),
                }
            }
        }
    }
}
