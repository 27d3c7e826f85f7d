//! Event profiler CLI library.
//!
//! This crate provides the CLI interface for recording and combining profiles.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::Config;
