//! Chat pane output.
//!
//! Everything the user sees goes through [`Console`] so the conversation loop
//! can be observed in tests.

use std::thread;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(100);

pub trait Console {
    /// A status line, prefixed with the session glyph.
    fn status(&self, glyph: &str, text: &str);
    /// Raw output (`/info`, `/config`, help text).
    fn plain(&self, text: &str);
    /// The model's message to the user.
    fn assistant(&self, text: &str);
    /// A command, keys or file content about to be acted on.
    fn code(&self, text: &str);
    /// Count down `secs` seconds. Returns `false` if cancelled first.
    fn countdown(&self, secs: u64, cancel: &CancellationToken) -> bool;
    /// Spinner shown while waiting on the model.
    fn spinner(&self) -> Progress;
}

/// Spinner handle; clears itself when dropped.
pub struct Progress {
    bar: Option<ProgressBar>,
}

impl Progress {
    pub fn hidden() -> Self {
        Self { bar: None }
    }

    fn spinner() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("thinking");
        bar.enable_steady_tick(TICK);
        Self { bar: Some(bar) }
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Prompt prefix: `panepilot [▶] » `.
pub fn prefix(glyph: &str) -> String {
    let mut out = "panepilot".green().bold().to_string();
    if !glyph.is_empty() {
        out.push(' ');
        out.push_str(&format!("[{glyph}]").magenta().bold().to_string());
    }
    out.push_str(&" » ".yellow().bold().to_string());
    out
}

/// Highlight fenced code blocks in a model message.
fn cosmetics(text: &str) -> String {
    let mut out = Vec::new();
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            out.push(line.dimmed().to_string());
        } else if in_fence {
            out.push(line.cyan().to_string());
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn status(&self, glyph: &str, text: &str) {
        println!("{}{text}", prefix(glyph));
    }

    fn plain(&self, text: &str) {
        println!("{text}");
    }

    fn assistant(&self, text: &str) {
        println!("{}", cosmetics(text));
    }

    fn code(&self, text: &str) {
        for line in text.lines() {
            println!("  {}", line.cyan());
        }
    }

    fn countdown(&self, secs: u64, cancel: &CancellationToken) -> bool {
        let bar = ProgressBar::new(secs);
        bar.set_style(
            ProgressStyle::with_template("{msg} {bar:20.yellow} {pos}/{len}s")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message("waiting");
        let ticks_per_sec = (Duration::from_secs(1).as_millis() / TICK.as_millis()) as u64;
        for _ in 0..secs * ticks_per_sec {
            if cancel.is_cancelled() {
                bar.abandon_with_message("cancelled");
                return false;
            }
            thread::sleep(TICK);
            bar.set_position(bar.elapsed().as_secs().min(secs));
        }
        bar.finish_and_clear();
        !cancel.is_cancelled()
    }

    fn spinner(&self) -> Progress {
        Progress::spinner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosmetics_keeps_text_and_line_count() {
        colored::control::set_override(false);
        let text = "run this:\n```sh\nls\n```\ndone";
        assert_eq!(cosmetics(text), text);
    }

    #[test]
    fn prefix_shows_glyph_only_when_set() {
        colored::control::set_override(false);
        assert_eq!(prefix(""), "panepilot » ");
        assert_eq!(prefix("∞"), "panepilot [∞] » ");
    }

    #[test]
    fn cancelled_countdown_returns_false() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!TerminalConsole.countdown(3, &token));
        assert!(TerminalConsole.countdown(0, &CancellationToken::new()));
    }
}
