//! Session status and its transitions.
//!
//! The orchestrator owns exactly one [`SessionState`]. Every status change
//! goes through a method here so the legal moves live in one place.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Running,
    Waiting,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Running => "running",
            Status::Waiting => "waiting",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionState {
    status: Status,
    watch_mode: bool,
}

impl SessionState {
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn watch_mode(&self) -> bool {
        self.watch_mode
    }

    pub fn is_idle(&self) -> bool {
        self.status == Status::Idle
    }

    /// New human input (idle or waiting) starts a turn.
    pub fn begin_turn(&mut self) {
        self.status = Status::Running;
    }

    /// Enter watch mode; watch turns run until accomplished or stopped.
    pub fn begin_watch(&mut self) {
        self.status = Status::Running;
        self.watch_mode = true;
    }

    /// The model asked the human a question.
    pub fn wait_for_user(&mut self) {
        self.status = Status::Waiting;
    }

    /// Turn over: accomplished, aborted, failed or cancelled.
    pub fn finish(&mut self) {
        self.status = Status::Idle;
    }

    /// Leave watch mode and go idle.
    pub fn stop_watch(&mut self) {
        self.watch_mode = false;
        self.status = Status::Idle;
    }

    /// `/reset`: back to the initial state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Glyph shown in the console prompt, empty when idle.
    pub fn glyph(&self) -> &'static str {
        if self.watch_mode {
            return "∞";
        }
        match self.status {
            Status::Idle => "",
            Status::Running => "▶",
            Status::Waiting => "?",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_lifecycle() {
        let mut state = SessionState::default();
        assert!(state.is_idle());
        assert_eq!(state.glyph(), "");

        state.begin_turn();
        assert_eq!(state.status(), Status::Running);
        assert_eq!(state.glyph(), "▶");

        state.wait_for_user();
        assert_eq!(state.status(), Status::Waiting);
        assert_eq!(state.glyph(), "?");

        state.begin_turn();
        state.finish();
        assert!(state.is_idle());
    }

    /// The watch glyph shadows the status glyph while watch mode is on.
    #[test]
    fn watch_mode_glyph_and_stop() {
        let mut state = SessionState::default();
        state.begin_watch();
        assert!(state.watch_mode());
        assert_eq!(state.status(), Status::Running);
        assert_eq!(state.glyph(), "∞");

        state.stop_watch();
        assert!(!state.watch_mode());
        assert!(state.is_idle());
    }

    #[test]
    fn reset_clears_watch_and_status() {
        let mut state = SessionState::default();
        state.begin_watch();
        state.wait_for_user();
        state.reset();
        assert_eq!(state, SessionState::default());
    }
}
