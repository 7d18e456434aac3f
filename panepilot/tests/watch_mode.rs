//! Watch-mode scenarios driven through the public orchestrator API.
//!
//! Each poll is one countdown followed by one model exchange; the scripted
//! console decides whether a countdown completes or is interrupted.

use panepilot::io::interrupt::CancelScope;
use panepilot::test_support::{
    FakePanes, RecordingConsole, ScriptedConfirmer, ScriptedModel, quiet_config,
};
use panepilot::turn::{Collaborators, Orchestrator, TurnOutcome};
use panepilot::watch::WatchEnd;
use pretty_assertions::assert_eq;

struct Window {
    panes: FakePanes,
    model: ScriptedModel,
    console: RecordingConsole,
    orchestrator: Orchestrator,
}

fn window() -> Window {
    let panes = FakePanes::new(&[("%0", "panepilot"), ("%1", "zsh"), ("%2", "cargo")]);
    panes.set_content("%2", "running 12 tests\ntest parse ... ok");
    let model = ScriptedModel::new();
    let console = RecordingConsole::default();
    let mut orchestrator = Orchestrator::new(
        quiet_config(),
        "%0",
        Collaborators {
            panes: Box::new(panes.clone()),
            model: Box::new(model.clone()),
            confirmer: Box::new(ScriptedConfirmer::default()),
            console: Box::new(console.clone()),
        },
        CancelScope::new(),
    );
    orchestrator.init_exec_pane().expect("exec pane");
    Window {
        panes,
        model,
        console,
        orchestrator,
    }
}

/// Quiet polls are neither shown nor kept; the accomplishing poll ends watch
/// mode and is the only exchange in history.
#[test]
fn watch_stops_on_accomplish_and_skips_no_comment_polls() {
    let mut w = window();
    w.model
        .reply("<NoComment>1</NoComment>")
        .reply("All 12 tests passed.<RequestAccomplished>1</RequestAccomplished>");

    let end = w.orchestrator.watch("failing tests");

    assert_eq!(end, WatchEnd::Accomplished);
    assert_eq!(w.console.countdowns(), vec![1, 1]);
    assert!(w.orchestrator.state().is_idle());
    assert!(!w.orchestrator.state().watch_mode());

    let turns = w.model.turn_texts();
    assert_eq!(turns.len(), 2);
    assert!(turns[0].contains("Watch for: failing tests"));
    assert!(!turns[1].contains("Watch for:"));
    assert!(turns[1].contains("test parse ... ok"));

    let history = w.orchestrator.messages();
    assert_eq!(history.len(), 2);
    assert!(history[1].content.contains("All 12 tests passed."));
    assert_eq!(w.console.lines(), vec!["All 12 tests passed.".to_string()]);
}

#[test]
fn watch_uses_the_watch_system_prompt() {
    let mut w = window();
    w.model.reply("<RequestAccomplished>1</RequestAccomplished>");
    w.orchestrator.watch("a panic");

    let request = &w.model.requests()[0];
    assert!(request[0].content.contains("<NoComment>1</NoComment>"));
}

/// An action in watch mode ends the poll instead of chaining follow-ups.
#[test]
fn watch_acts_then_keeps_polling() {
    let mut w = window();
    w.model
        .reply("The pager is open.<TmuxSendKeys pane_id=\"%2\">q</TmuxSendKeys>")
        .reply("<RequestAccomplished>1</RequestAccomplished>");

    assert_eq!(w.orchestrator.watch("the pager"), WatchEnd::Accomplished);
    assert_eq!(w.panes.sent("%2"), vec!["q".to_string()]);
    assert_eq!(w.model.requests().len(), 2);
    assert_eq!(w.orchestrator.messages().len(), 4);
}

#[test]
fn interrupt_between_polls_leaves_watch_mode() {
    let mut w = window();
    w.console.interrupt_countdowns_after(1);
    w.model.reply("<NoComment>1</NoComment>");

    assert_eq!(w.orchestrator.watch("errors"), WatchEnd::Interrupted);
    assert_eq!(w.model.requests().len(), 1);
    assert!(w.orchestrator.state().is_idle());
    assert!(!w.orchestrator.state().watch_mode());
    assert_eq!(w.orchestrator.state().glyph(), "");
}

#[test]
fn model_failure_stops_watching() {
    let mut w = window();
    w.model.fail("HTTP 502");

    assert_eq!(
        w.orchestrator.watch("errors"),
        WatchEnd::Stopped(TurnOutcome::Failed)
    );
    assert!(!w.orchestrator.state().watch_mode());
    assert!(w.console.lines()[0].starts_with("Failed to get response from AI"));
}
