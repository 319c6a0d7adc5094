//! CLI module for framesock - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for listing daemons,
//! sending messages, and running a mock daemon.

pub mod commands;

pub use commands::Cli;
