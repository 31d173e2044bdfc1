//! Command-line surface

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
