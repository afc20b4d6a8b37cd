//! Command-line interface.

mod commands;

pub use commands::{run, Cli};
