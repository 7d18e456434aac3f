//! Deterministic, pure logic shared by the conversation loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod command;
pub mod exec_history;
pub mod guidelines;
pub mod keys;
pub mod overrides;
pub mod session;
pub mod tags;
pub mod types;
