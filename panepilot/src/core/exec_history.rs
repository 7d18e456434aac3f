//! Prepared-pane prompt marker and exec history parsing.
//!
//! A prepared pane shows `[panepilot:<exit>]» ` as its shell prompt, where
//! `<exit>` is the status of the previous command. A capture of such a pane
//! can be split into commands, their output and their exit codes.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::ExecHistoryEntry;

static PROMPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[panepilot:(\d+)\]» ?(.*)$").expect("prompt marker pattern")
});

/// Shell command that switches the pane's prompt to the marker prompt.
///
/// Returns `None` for shells without a known prompt variable.
pub fn prompt_setup_command(shell: &str) -> Option<&'static str> {
    match shell {
        "bash" | "sh" => Some("export PS1='[panepilot:$?]» '"),
        "zsh" => Some("PROMPT='[panepilot:%?]» '"),
        "fish" => Some("function fish_prompt; echo -n \"[panepilot:$status]» \"; end"),
        _ => None,
    }
}

struct PromptLine<'a> {
    code: i32,
    command: &'a str,
}

fn prompt_line(line: &str) -> Option<PromptLine<'_>> {
    let caps = PROMPT_RE.captures(line.trim_end())?;
    let code = caps.get(1)?.as_str().parse().ok()?;
    let command = caps.get(2).map_or("", |m| m.as_str().trim());
    Some(PromptLine { code, command })
}

/// Parse completed commands out of a prepared pane capture.
///
/// A command is complete once the next prompt line is visible; that line
/// carries its exit code. A trailing command without a following prompt is
/// still running and is not reported.
pub fn parse(capture: &str) -> Vec<ExecHistoryEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<(String, Vec<&str>)> = None;

    for line in capture.lines() {
        match prompt_line(line) {
            Some(prompt) => {
                if let Some((command, output)) = pending.take() {
                    entries.push(ExecHistoryEntry {
                        command,
                        output: output.join("\n").trim_end().to_string(),
                        exit_code: prompt.code,
                    });
                }
                if !prompt.command.is_empty() {
                    pending = Some((prompt.command.to_string(), Vec::new()));
                }
            }
            None => {
                if let Some((_, output)) = pending.as_mut() {
                    output.push(line);
                }
            }
        }
    }
    entries
}

/// True when the last non-empty line is a bare marker prompt.
pub fn is_idle(capture: &str) -> bool {
    capture
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(prompt_line)
        .is_some_and(|prompt| prompt.command.is_empty())
}

/// Number of marker prompt lines in a capture.
pub fn prompt_count(capture: &str) -> usize {
    capture.lines().filter(|line| prompt_line(line).is_some()).count()
}

/// True when any marker prompt is visible, i.e. the pane was prepared.
pub fn is_prepared(capture: &str) -> bool {
    prompt_count(capture) > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CAPTURE: &str = "\
[panepilot:0]» ls
Cargo.toml
src
[panepilot:0]» false
[panepilot:1]» cat missing
cat: missing: No such file or directory
[panepilot:1]»";

    #[test]
    fn parses_commands_output_and_exit_codes() {
        assert_eq!(
            parse(CAPTURE),
            vec![
                ExecHistoryEntry {
                    command: "ls".to_string(),
                    output: "Cargo.toml\nsrc".to_string(),
                    exit_code: 0,
                },
                ExecHistoryEntry {
                    command: "false".to_string(),
                    output: String::new(),
                    exit_code: 1,
                },
                ExecHistoryEntry {
                    command: "cat missing".to_string(),
                    output: "cat: missing: No such file or directory".to_string(),
                    exit_code: 1,
                },
            ]
        );
    }

    #[test]
    fn running_command_is_not_reported_and_pane_is_busy() {
        let capture = "[panepilot:0]» ping -c 3 host\nPING host\n64 bytes";
        assert!(parse(capture).is_empty());
        assert!(!is_idle(capture));
    }

    #[test]
    fn idle_when_last_line_is_bare_prompt() {
        assert!(is_idle(CAPTURE));
        assert!(is_idle("[panepilot:0]» \n\n  \n"));
        assert!(!is_idle("$ "));
        assert!(!is_idle(""));
    }

    #[test]
    fn setup_command_per_shell() {
        assert!(prompt_setup_command("zsh").is_some_and(|cmd| cmd.contains("%?")));
        assert!(prompt_setup_command("bash").is_some_and(|cmd| cmd.contains("$?")));
        assert!(prompt_setup_command("fish").is_some_and(|cmd| cmd.contains("$status")));
        assert_eq!(prompt_setup_command("python3"), None);
    }

    #[test]
    fn prompt_count_detects_preparation() {
        assert_eq!(prompt_count(CAPTURE), 4);
        assert!(is_prepared(CAPTURE));
        assert!(!is_prepared("user@host:~$ ls"));
    }
}
