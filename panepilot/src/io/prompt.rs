//! Prompt rendering for model requests.
//!
//! System prompts, the per-turn message and the squash request are minijinja
//! templates compiled into the binary. Prompt text from the config file is
//! layered on top: `base_system` replaces the built-in base, the mode prompts
//! are appended.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::{ChatMessage, PaneDetails};
use crate::io::config::PromptsConfig;

const BASE_SYSTEM_TEMPLATE: &str = include_str!("prompts/base_system.md");
const ASSISTANT_TEMPLATE: &str = include_str!("prompts/assistant.md");
const WATCH_TEMPLATE: &str = include_str!("prompts/watch.md");
const TURN_TEMPLATE: &str = include_str!("prompts/turn.md");
const SQUASH_TEMPLATE: &str = include_str!("prompts/squash.md");

const EXEC_PANE_TAG: &str = "panepilot_exec_pane";
const READ_ONLY_PANE_TAG: &str = "read_only_pane";

/// Which system prompt a turn runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Watch,
    /// Chat with a prepared exec pane; the busy tag is replaced by exec-wait.
    PreparedAssistant,
    Assistant,
}

/// One pane as the model sees it.
#[derive(Debug, Clone, Serialize)]
struct PaneView<'a> {
    kind: &'static str,
    id: &'a str,
    current_command: &'a str,
    args: &'a str,
    active: bool,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct MessageView<'a> {
    role: &'static str,
    content: &'a str,
}

/// Window state rendered into the current-turn message.
#[derive(Debug, Clone, Copy)]
pub struct TurnSnapshot<'a> {
    /// Panes in window order, with content captured.
    pub panes: &'a [PaneDetails],
    pub exec_pane_id: Option<&'a str>,
    pub chat_pane_id: &'a str,
}

pub struct PromptEngine {
    env: Environment<'static>,
    prompts: PromptsConfig,
}

impl PromptEngine {
    pub fn new(prompts: PromptsConfig) -> Self {
        let mut env = Environment::new();
        env.add_template("base_system", BASE_SYSTEM_TEMPLATE)
            .expect("base_system template should be valid");
        env.add_template("assistant", ASSISTANT_TEMPLATE)
            .expect("assistant template should be valid");
        env.add_template("watch", WATCH_TEMPLATE)
            .expect("watch template should be valid");
        env.add_template("turn", TURN_TEMPLATE)
            .expect("turn template should be valid");
        env.add_template("squash", SQUASH_TEMPLATE)
            .expect("squash template should be valid");
        Self { env, prompts }
    }

    fn base(&self) -> Result<String> {
        let custom = self.prompts.base_system.trim();
        if !custom.is_empty() {
            return Ok(custom.to_string());
        }
        Ok(self.env.get_template("base_system")?.render(context! {})?)
    }

    pub fn system_prompt(&self, mode: PromptMode) -> Result<String> {
        let base = self.base()?;
        let rendered = match mode {
            PromptMode::Watch => self.env.get_template("watch")?.render(context! {
                base => base.trim(),
                extra => non_empty(&self.prompts.watch),
            })?,
            PromptMode::PreparedAssistant | PromptMode::Assistant => {
                self.env.get_template("assistant")?.render(context! {
                    base => base.trim(),
                    prepared => mode == PromptMode::PreparedAssistant,
                    extra => non_empty(&self.prompts.chat_assistant),
                })?
            }
        };
        Ok(rendered)
    }

    /// The current-turn message: pane snapshot, environment hint, then text.
    pub fn turn_message(&self, snapshot: TurnSnapshot<'_>, text: &str) -> Result<String> {
        let panes: Vec<PaneView<'_>> = snapshot
            .panes
            .iter()
            .filter(|pane| pane.id != snapshot.chat_pane_id)
            .map(|pane| PaneView {
                kind: if Some(pane.id.as_str()) == snapshot.exec_pane_id {
                    EXEC_PANE_TAG
                } else {
                    READ_ONLY_PANE_TAG
                },
                id: &pane.id,
                current_command: &pane.current_command,
                args: &pane.args,
                active: pane.is_active,
                content: pane.content.trim_end(),
            })
            .collect();

        let exec_pane = snapshot
            .exec_pane_id
            .and_then(|id| snapshot.panes.iter().find(|pane| pane.id == id));
        let env_hint = exec_pane.and_then(environment_hint);

        let rendered = self.env.get_template("turn")?.render(context! {
            panes => panes,
            env_hint => env_hint,
            text => non_empty(text),
        })?;
        Ok(rendered)
    }

    /// Request asking the model to summarize `messages`.
    pub fn squash_request(&self, messages: &[ChatMessage]) -> Result<String> {
        let messages: Vec<MessageView<'_>> = messages
            .iter()
            .map(|message| MessageView {
                role: if message.from_user { "user" } else { "assistant" },
                content: message.content.trim(),
            })
            .collect();
        Ok(self
            .env
            .get_template("squash")?
            .render(context! { messages => messages })?)
    }
}

/// Shell and OS hint for the exec pane; none inside a sub-shell.
fn environment_hint(pane: &PaneDetails) -> Option<String> {
    if pane.is_sub_shell {
        return None;
    }
    Some(format!(
        "Keep in mind, you are working within the shell: {} and OS: {}",
        pane.shell, pane.os
    ))
}

fn non_empty(text: &str) -> Option<&str> {
    Some(text.trim()).filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pane(id: &str, command: &str, content: &str) -> PaneDetails {
        PaneDetails {
            id: id.to_string(),
            current_command: command.to_string(),
            shell: command.to_string(),
            os: "linux".to_string(),
            content: content.to_string(),
            ..PaneDetails::default()
        }
    }

    #[test]
    fn busy_tag_only_in_unprepared_assistant_prompt() {
        let engine = PromptEngine::new(PromptsConfig::default());
        let plain = engine.system_prompt(PromptMode::Assistant).expect("render");
        let prepared = engine
            .system_prompt(PromptMode::PreparedAssistant)
            .expect("render");

        assert!(plain.starts_with("You are panepilot"));
        assert!(plain.contains("<ExecPaneSeemsBusy>: boolean tag"));
        assert!(!prepared.contains("<ExecPaneSeemsBusy>: boolean tag"));
        assert!(prepared.contains("<waiting_for_a_command_to_finish>"));
        assert!(plain.contains("<ReadFile>"));
    }

    #[test]
    fn watch_prompt_mentions_no_comment() {
        let engine = PromptEngine::new(PromptsConfig::default());
        let watch = engine.system_prompt(PromptMode::Watch).expect("render");
        assert!(watch.contains("<NoComment>1</NoComment>"));
        assert!(!watch.contains("<ExecCommand>"));
    }

    /// A custom base replaces the built-in one; mode extras are appended.
    #[test]
    fn configured_prompts_layer_on_templates() {
        let engine = PromptEngine::new(PromptsConfig {
            base_system: "Custom base.".to_string(),
            chat_assistant: "Prefer fish syntax.".to_string(),
            watch: "Only report errors.".to_string(),
        });
        let chat = engine.system_prompt(PromptMode::Assistant).expect("render");
        assert!(chat.starts_with("Custom base."));
        assert!(!chat.contains("You are panepilot"));
        assert!(chat.trim_end().ends_with("Prefer fish syntax."));

        let watch = engine.system_prompt(PromptMode::Watch).expect("render");
        assert!(watch.trim_end().ends_with("Only report errors."));
    }

    #[test]
    fn turn_message_marks_exec_pane_and_skips_chat_pane() {
        let engine = PromptEngine::new(PromptsConfig::default());
        let panes = vec![
            pane("%0", "panepilot", "chat text"),
            pane("%1", "zsh", "$ ls\nCargo.toml\n"),
            pane("%2", "htop", "cpu"),
        ];
        let message = engine
            .turn_message(
                TurnSnapshot {
                    panes: &panes,
                    exec_pane_id: Some("%1"),
                    chat_pane_id: "%0",
                },
                "what is here?",
            )
            .expect("render");

        assert_eq!(
            message,
            "<current_tmux_window_state>\n\
             <panepilot_exec_pane id=\"%1\" current_command=\"zsh\">\n\
             $ ls\nCargo.toml\n\
             </panepilot_exec_pane>\n\
             <read_only_pane id=\"%2\" current_command=\"htop\">\n\
             cpu\n\
             </read_only_pane>\n\
             </current_tmux_window_state>\n\n\
             Keep in mind, you are working within the shell: zsh and OS: linux\n\n\
             what is here?"
        );
    }

    #[test]
    fn sub_shell_exec_pane_has_no_hint_and_empty_text_is_omitted() {
        let engine = PromptEngine::new(PromptsConfig::default());
        let mut ssh = pane("%1", "ssh", "remote$");
        ssh.is_sub_shell = true;
        let message = engine
            .turn_message(
                TurnSnapshot {
                    panes: std::slice::from_ref(&ssh),
                    exec_pane_id: Some("%1"),
                    chat_pane_id: "%0",
                },
                "  ",
            )
            .expect("render");
        assert!(!message.contains("Keep in mind"));
        assert!(message.ends_with("</current_tmux_window_state>"));
    }

    #[test]
    fn squash_request_lists_roles() {
        let engine = PromptEngine::new(PromptsConfig::default());
        let request = engine
            .squash_request(&[ChatMessage::user("list files"), ChatMessage::assistant("done")])
            .expect("render");
        assert!(request.starts_with("Summarize the conversation"));
        assert!(request.contains("<user>\nlist files\n</user>"));
        assert!(request.contains("<assistant>\ndone\n</assistant>"));
    }
}
