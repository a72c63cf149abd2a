//! CLI Module Organization
//!
//! - args: argument structures and value enums
//! - commands: command execution
//! - config_layer: defaults, file and flag layering

pub mod args;
pub mod commands;
pub mod config_layer;

pub use args::*;
pub use commands::*;
