//! Command-line front-end

mod commands;
mod progress;

pub use commands::{Cli, Commands};
pub use progress::ProgressReporter;
