//! CLI argument parsing and command handling.

mod args;
pub mod progress;

pub use args::{CaptureArgs, Cli, Command, CommonArgs, ConfigAction};
