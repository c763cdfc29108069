//! Command line client for the ledger

pub mod commands;

pub use commands::run_cli;
