//! A tmux-resident assistant that reads the panes of its window and acts on
//! them through a chat model.
//!
//! The crate keeps a strict split:
//!
//! - **[`core`]**: Pure logic (tag scanning, guideline checks, session state,
//!   command parsing). No I/O, fully testable in isolation.
//! - **[`io`]**: Side effects (tmux, the model provider, the terminal, files).
//!   Every boundary sits behind a trait so the loop can run against fakes.
//!
//! [`turn`] drives one conversation turn and its follow-ups; [`dispatch`]
//! applies a parsed reply to the window; [`watch`], [`squash`] and
//! [`commands`] build on the same orchestrator; [`repl`] reads user input.

pub mod commands;
pub mod core;
pub mod dispatch;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod repl;
pub mod squash;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod turn;
pub mod watch;
pub mod workspace;
