//! # boardsync-cli — Command-Line Interface
//!
//! Drives the boardsync lifecycle machines from the command line, mainly
//! for reproducing ordering and conflict behaviour from a script.
//!
//! ## Subcommands
//!
//! - `replay`: run a YAML scenario through a fresh coordinator and report
//!   every step plus the final machine states
//! - `table`: print a machine's transition table
//!
//! ## Crate Policy
//!
//! - Argument parsing lives in `main.rs`; handlers return an exit code.
//! - Lifecycle rules live in the domain crates. Nothing here bypasses them.

pub mod config;
pub mod replay;
pub mod table;
