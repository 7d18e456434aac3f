//! tmux adapter.
//!
//! The conversation loop only talks to panes through [`PaneController`], so it
//! can run against scripted panes in tests. [`TmuxController`] is the real
//! implementation and shells out to `tmux` for every operation.

use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::keys::{self, KeyStroke};
use crate::core::types::PaneDetails;
use crate::io::process::{HELPER_OUTPUT_LIMIT, HELPER_TIMEOUT, run_checked, run_command_with_timeout};

const PASTE_BUFFER: &str = "panepilot_paste_buffer";
const LIST_FORMAT: &str =
    "#{pane_id}\t#{pane_active}\t#{pane_pid}\t#{pane_current_command}\t#{history_size}\t#{history_limit}";
const KNOWN_SHELLS: &[&str] = &["bash", "zsh", "fish", "sh"];

/// Pane operations the conversation loop depends on.
pub trait PaneController {
    /// Panes of the window containing `pane_id`, without captured content.
    fn list_panes(&self, pane_id: &str) -> Result<Vec<PaneDetails>>;
    /// Visible content plus up to `max_lines` of scrollback, trimmed.
    fn capture(&self, pane_id: &str, max_lines: usize) -> Result<String>;
    /// Type `text` into the pane; see [`keys::plan`] for the translation.
    fn send_keys(&self, pane_id: &str, text: &str, auto_enter: bool) -> Result<()>;
    /// Paste `text` through a dedicated tmux buffer.
    fn paste(&self, pane_id: &str, text: &str) -> Result<()>;
    /// Split `target` and return the new pane id.
    fn split(&self, target: &str, args: &[&str]) -> Result<String>;
    /// Kill a pane; an already missing pane is not an error.
    fn kill(&self, pane_id: &str) -> Result<()>;
    /// Clear the pane's screen.
    fn clear(&self, pane_id: &str) -> Result<()>;
}

/// [`PaneController`] backed by the `tmux` binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct TmuxController;

impl TmuxController {
    fn run(&self, args: &[&str]) -> Result<String> {
        run_checked("tmux", args, None)
    }
}

impl PaneController for TmuxController {
    #[instrument(skip(self))]
    fn list_panes(&self, pane_id: &str) -> Result<Vec<PaneDetails>> {
        let out = self
            .run(&["list-panes", "-t", pane_id, "-F", LIST_FORMAT])
            .with_context(|| format!("list panes of {pane_id}"))?;
        let os = std::env::consts::OS;
        let mut panes = Vec::new();
        for line in out.lines().filter(|line| !line.trim().is_empty()) {
            match parse_pane_line(line, os) {
                Ok(mut pane) => {
                    pane.args = process_args(pane.pid);
                    panes.push(pane);
                }
                Err(err) => warn!(err = %err, line, "skipping malformed pane line"),
            }
        }
        if panes.is_empty() {
            bail!("no panes found for {pane_id}");
        }
        Ok(panes)
    }

    fn capture(&self, pane_id: &str, max_lines: usize) -> Result<String> {
        let start = format!("-{max_lines}");
        let out = self
            .run(&["capture-pane", "-p", "-t", pane_id, "-S", &start])
            .with_context(|| format!("capture pane {pane_id}"))?;
        Ok(out.trim().to_string())
    }

    #[instrument(skip(self, text), fields(len = text.len()))]
    fn send_keys(&self, pane_id: &str, text: &str, auto_enter: bool) -> Result<()> {
        for stroke in keys::plan(text, auto_enter) {
            let stroke_args = stroke.args();
            let mut args = vec!["send-keys", "-t", pane_id];
            args.extend(stroke_args.iter().map(String::as_str));
            self.run(&args).with_context(|| match &stroke {
                KeyStroke::Literal(_) => format!("send text to pane {pane_id}"),
                KeyStroke::Keys(_) => format!("send keys to pane {pane_id}"),
            })?;
        }
        Ok(())
    }

    #[instrument(skip(self, text), fields(len = text.len()))]
    fn paste(&self, pane_id: &str, text: &str) -> Result<()> {
        run_checked(
            "tmux",
            &["load-buffer", "-b", PASTE_BUFFER, "-"],
            Some(text.as_bytes()),
        )
        .context("load paste buffer")?;
        self.run(&["paste-buffer", "-b", PASTE_BUFFER, "-t", pane_id])
            .with_context(|| format!("paste into pane {pane_id}"))?;
        if let Err(err) = self.run(&["delete-buffer", "-b", PASTE_BUFFER]) {
            info!(err = %err, "could not delete paste buffer");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn split(&self, target: &str, args: &[&str]) -> Result<String> {
        let mut full = vec!["split-window", "-P", "-F", "#{pane_id}", "-t", target];
        full.extend_from_slice(args);
        let out = self
            .run(&full)
            .with_context(|| format!("split pane {target}"))?;
        let id = out.trim().to_string();
        if id.is_empty() {
            bail!("tmux split-window returned an empty pane id");
        }
        debug!(split_target = %target, new_pane = %id, "split pane");
        Ok(id)
    }

    fn kill(&self, pane_id: &str) -> Result<()> {
        let mut cmd = Command::new("tmux");
        cmd.args(["kill-pane", "-t", pane_id]);
        let output = run_command_with_timeout(cmd, None, HELPER_TIMEOUT, HELPER_OUTPUT_LIMIT)
            .context("run tmux kill-pane")?;
        if !output.status.success() {
            let stderr = output.stderr_text();
            if stderr.contains("no such pane") || stderr.contains("can't find pane") {
                info!(pane_id, "pane already gone");
                return Ok(());
            }
        }
        output.check("tmux kill-pane")?;
        debug!(pane_id, "killed pane");
        Ok(())
    }

    fn clear(&self, pane_id: &str) -> Result<()> {
        self.send_keys(pane_id, "C-l", false)
    }
}

/// Parse one `list-panes` line in [`LIST_FORMAT`].
fn parse_pane_line(line: &str, os: &str) -> Result<PaneDetails> {
    let fields: Vec<&str> = line.split('\t').collect();
    let &[id, active, pid, command, history_size, history_limit] = fields.as_slice() else {
        return Err(anyhow!("expected 6 fields, got {}", fields.len()));
    };
    let current_command = command.trim_start_matches('-').to_string();
    let known_shell = KNOWN_SHELLS.contains(&current_command.as_str());
    Ok(PaneDetails {
        id: id.to_string(),
        is_active: active == "1",
        pid: pid.parse().with_context(|| format!("pane pid {pid:?}"))?,
        shell: if known_shell {
            current_command.clone()
        } else {
            String::new()
        },
        is_sub_shell: !known_shell,
        current_command,
        args: String::new(),
        history_size: history_size.parse().unwrap_or_default(),
        history_limit: history_limit.parse().unwrap_or_default(),
        os: os.to_string(),
        content: String::new(),
    })
}

/// Command line of a pane's foreground process, best effort.
fn process_args(pid: u32) -> String {
    let pid = pid.to_string();
    match run_checked("ps", &["-o", "args=", "-p", &pid], None) {
        Ok(out) => out.trim().to_string(),
        Err(err) => {
            debug!(err = %err, pid = %pid, "ps lookup failed");
            String::new()
        }
    }
}

/// The pane this process runs in, from `TMUX_PANE`.
pub fn current_pane_id() -> Option<String> {
    std::env::var("TMUX_PANE")
        .ok()
        .filter(|id| !id.trim().is_empty())
}

/// Start a detached session, run `command_line` in it and attach.
///
/// Returns once the user detaches or the session ends.
#[instrument]
pub fn relaunch_in_new_session(command_line: &str) -> Result<()> {
    let controller = TmuxController;
    let pane_id = controller
        .run(&["new-session", "-d", "-P", "-F", "#{pane_id}"])
        .context("create tmux session")?
        .trim()
        .to_string();
    if pane_id.is_empty() {
        bail!("tmux new-session returned an empty pane id");
    }
    controller.send_keys(&pane_id, command_line, true)?;
    // Let the new shell finish starting before the terminal attaches.
    thread::sleep(Duration::from_secs(1));

    let status = Command::new("tmux")
        .args(["attach-session", "-t", &pane_id])
        .status()
        .context("attach tmux session")?;
    if !status.success() {
        bail!("tmux attach-session failed with status {:?}", status.code());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_shell_pane() {
        let pane = parse_pane_line("%3\t1\t4242\tzsh\t120\t2000", "linux").expect("parse");
        assert_eq!(
            pane,
            PaneDetails {
                id: "%3".to_string(),
                is_active: true,
                pid: 4242,
                current_command: "zsh".to_string(),
                args: String::new(),
                history_size: 120,
                history_limit: 2000,
                is_sub_shell: false,
                shell: "zsh".to_string(),
                os: "linux".to_string(),
                content: String::new(),
            }
        );
    }

    /// Anything other than a plain shell (ssh, a REPL, an editor) is a sub-shell.
    #[test]
    fn non_shell_command_is_sub_shell() {
        let pane = parse_pane_line("%7\t0\t99\tssh\t0\t2000", "macos").expect("parse");
        assert!(pane.is_sub_shell);
        assert_eq!(pane.shell, "");
        assert!(!pane.is_active);

        let login = parse_pane_line("%8\t0\t99\t-bash\t0\t2000", "linux").expect("parse");
        assert_eq!(login.shell, "bash");
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(parse_pane_line("%1\t1\t12", "linux").is_err());
        assert!(parse_pane_line("%1\t1\tnotapid\tbash\t0\t0", "linux").is_err());
    }
}
