//! Response guideline checks.
//!
//! A reply is either a state reply (one state flag, no actions) or an action
//! reply (at most one main action kind, optionally with `CreateExecPane`).
//! `ReadFile` is independent of both: it may accompany either but never counts
//! as a tag on its own. A violation is sent back to the model verbatim as a
//! corrective turn.

use thiserror::Error;

use crate::core::types::ParsedResponse;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuidelineViolation {
    #[error(
        "AI Error: Only one of <RequestAccomplished>, <ExecPaneSeemsBusy>, <WaitingForUserResponse>, or <NoComment> can be used at a time, but the response used {}.",
        join_tags(.0)
    )]
    MultipleStates(Vec<&'static str>),
    #[error(
        "AI Error: Only one of <ExecCommand>, <TmuxSendKeys>, or <PasteMultilineContent> can be used at a time, but the response used {}.",
        join_tags(.0)
    )]
    MultipleActions(Vec<&'static str>),
    #[error(
        "AI Error: State tags (like <RequestAccomplished>) cannot be combined with action tags (like <ExecCommand> or <CreateExecPane>), but the response combined {} with {}.",
        join_tags(.states),
        join_tags(.actions)
    )]
    StateWithAction {
        states: Vec<&'static str>,
        actions: Vec<&'static str>,
    },
    #[error("AI Error: The response must contain at least one valid XML tag.")]
    NoTags,
}

fn join_tags(names: &[&'static str]) -> String {
    names
        .iter()
        .map(|name| format!("<{name}>"))
        .collect::<Vec<_>>()
        .join(" and ")
}

fn state_tags(response: &ParsedResponse) -> Vec<&'static str> {
    [
        (response.request_accomplished, "RequestAccomplished"),
        (response.exec_pane_seems_busy, "ExecPaneSeemsBusy"),
        (response.waiting_for_user_response, "WaitingForUserResponse"),
        (response.no_comment, "NoComment"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect()
}

fn main_action_tags(response: &ParsedResponse) -> Vec<&'static str> {
    [
        (!response.exec_commands.is_empty(), "ExecCommand"),
        (!response.send_keys.is_empty(), "TmuxSendKeys"),
        (!response.paste_contents.is_empty(), "PasteMultilineContent"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect()
}

/// Check a scanned reply against the response guidelines.
pub fn validate(response: &ParsedResponse) -> Result<(), GuidelineViolation> {
    let states = state_tags(response);
    if states.len() > 1 {
        return Err(GuidelineViolation::MultipleStates(states));
    }

    let mut actions = main_action_tags(response);
    if actions.len() > 1 {
        return Err(GuidelineViolation::MultipleActions(actions));
    }

    if response.create_exec_pane {
        actions.push("CreateExecPane");
    }
    if !states.is_empty() && !actions.is_empty() {
        return Err(GuidelineViolation::StateWithAction { states, actions });
    }

    if states.is_empty() && actions.is_empty() {
        return Err(GuidelineViolation::NoTags);
    }
    Ok(())
}
