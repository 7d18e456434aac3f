//! I/O boundaries: tmux, the model provider, the terminal and the filesystem.

pub mod config;
pub mod confirm;
pub mod console;
pub mod interrupt;
pub mod model;
pub mod process;
pub mod prompt;
pub mod read_file;
pub mod tmux;
pub mod transcript;
