//! CLI module for jobscout - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
