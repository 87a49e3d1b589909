//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and the Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Persistent unit repository
#[derive(Parser)]
#[command(
    name = "unitstore",
    version = env!("CARGO_PKG_VERSION"),
    about = "Inspect and edit a persistent unit repository",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Selects a unit by name and optional file-system namespace.
#[derive(clap::Args, Debug, Clone)]
pub struct UnitArgs {
    /// Unit name
    pub unit: String,

    /// File-system namespace of the unit (local when omitted)
    #[arg(long = "fs", value_name = "NAMESPACE")]
    pub file_system: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .unitstore directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .unitstore/settings.toml")]
    Config,

    /// List units known to the repository
    #[command(about = "List units and whether they have persisted data")]
    Units,

    /// Store a JSON value under a key
    #[command(after_help = "Examples:\n  unitstore put app decl:main '{\"line\": 3}'\n  unitstore put libc decl:printf true --fs sysroot")]
    Put {
        #[command(flatten)]
        unit: UnitArgs,

        /// Key name within the unit
        key: String,

        /// Value as JSON
        value: String,
    },

    /// Print the JSON value stored under a key
    Get {
        #[command(flatten)]
        unit: UnitArgs,

        /// Key name within the unit
        key: String,
    },

    /// Delete a key
    Remove {
        #[command(flatten)]
        unit: UnitArgs,

        /// Key name within the unit
        key: String,
    },

    /// Drop all persisted data of a unit
    Clean {
        #[command(flatten)]
        unit: UnitArgs,
    },
}
