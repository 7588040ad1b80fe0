//! Command-line interface definitions.
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the loadout installer.
#[derive(Parser, Debug)]
#[command(
    name = "loadout",
    about = "Declarative software manifest installer",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone, Default)]
pub struct GlobalOpts {
    /// Configuration file (default: $LOADOUT_CONFIG, ./loadout.toml, ~/.config/loadout/loadout.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install missing steps and update outdated ones
    Install(InstallOpts),
    /// Check the configuration without running anything
    Validate,
    /// Print this machine's id (for `machines` restrictions)
    MachineId,
    /// Generate shell completions
    Completions(CompletionsOpts),
    /// Print version information
    Version,
}

/// Options for the `install` subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct InstallOpts {
    /// Only run matching top-level steps (`name`, `!name`, `tag:x`, `!tag:x`)
    #[arg(short, long, value_delimiter = ',')]
    pub filter: Vec<String>,

    /// Check installed steps for updates (overrides `check_updates`)
    #[arg(long, overrides_with = "no_update")]
    pub update: bool,

    /// Skip update checks for installed steps
    #[arg(long, overrides_with = "update")]
    pub no_update: bool,
}

impl InstallOpts {
    /// Update-check override from the command line, if any.
    #[must_use]
    pub const fn check_updates(&self) -> Option<bool> {
        match (self.update, self.no_update) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Options for the `completions` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct CompletionsOpts {
    /// Target shell
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
