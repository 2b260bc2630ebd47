//! CLI module for the `yo` binary.
//!
//! Commands only parse arguments and render results; planning and applying
//! live in [`Engine`](crate::reconciler::Engine).

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, ScopeArgs, StateCommands};
pub use output::OutputFormatter;
