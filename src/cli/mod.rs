//! Command-line interface
//!
//! Flag parsing and configuration loading are an interface layer over the
//! pipelines; nothing in here carries core semantics. `main.rs` parses,
//! dispatches, and turns errors into structured exit output.

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::run_command;
pub use errors::{CliError, CliResult};
