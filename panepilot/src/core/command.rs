//! Slash-command parsing.
//!
//! Any input starting with `/` is a command. The first word matches a command
//! when it is a prefix of the command name (`/he` is `/help`); `/w` is an
//! alias for `/watch`. Ties resolve in [`ALL_COMMANDS`] order.

use crate::core::overrides::{ConfigKey, OverrideError};

pub const ALL_COMMANDS: [&str; 9] = [
    "/help", "/clear", "/reset", "/exit", "/info", "/watch", "/prepare", "/config", "/squash",
];

pub const HELP: &str = "\
Available commands:
- /info: Display system information
- /clear: Clear the chat history
- /reset: Reset the chat history
- /prepare [pane_id]: Prepare a pane for advanced command execution. Defaults to the primary exec pane.
- /watch <prompt>: Start watch mode
- /squash: Summarize the chat history
- /config [set <key> <value>]: Show configuration or override a key for this session
- /exit: Exit the application";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Info,
    Clear,
    Reset,
    Exit,
    Squash,
    Prepare { pane_id: Option<String> },
    Watch { description: String },
    /// `/watch` without a description.
    WatchUsage,
    ShowConfig,
    SetConfig { key: ConfigKey, value: String },
    InvalidConfigKey(OverrideError),
    Unknown(String),
}

/// True when `input` should be handled as a slash command.
pub fn is_command(input: &str) -> bool {
    input.trim_start().starts_with('/')
}

pub fn parse(input: &str) -> SlashCommand {
    let trimmed = input.trim();
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    let Some(first) = words.first() else {
        return SlashCommand::Unknown(trimmed.to_string());
    };
    let head = first.to_lowercase();

    let name = if head == "/w" {
        "/watch"
    } else {
        match ALL_COMMANDS.into_iter().find(|name| name.starts_with(head.as_str())) {
            Some(name) if head.len() > 1 => name,
            _ => return SlashCommand::Unknown(trimmed.to_string()),
        }
    };

    match name {
        "/help" => SlashCommand::Help,
        "/info" => SlashCommand::Info,
        "/clear" => SlashCommand::Clear,
        "/reset" => SlashCommand::Reset,
        "/exit" => SlashCommand::Exit,
        "/squash" => SlashCommand::Squash,
        "/prepare" => SlashCommand::Prepare {
            pane_id: words.get(1).map(|id| id.to_string()),
        },
        "/watch" => {
            if words.len() > 1 {
                SlashCommand::Watch {
                    description: words[1..].join(" "),
                }
            } else {
                SlashCommand::WatchUsage
            }
        }
        "/config" => parse_config(&words[1..]),
        _ => SlashCommand::Unknown(trimmed.to_string()),
    }
}

fn parse_config(args: &[&str]) -> SlashCommand {
    match args {
        [set, key, value @ ..] if set.eq_ignore_ascii_case("set") => {
            match key.to_lowercase().parse::<ConfigKey>() {
                Ok(key) => SlashCommand::SetConfig {
                    key,
                    value: value.join(" "),
                },
                Err(err) => SlashCommand::InvalidConfigKey(err),
            }
        }
        _ => SlashCommand::ShowConfig,
    }
}
