//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod data;
pub mod init;
pub mod units;
