//! Declarative software manifest installer.
//!
//! A single TOML (or JSON) configuration lists install steps: packages from
//! system and language package managers, git checkouts, GitHub release
//! assets, rsync'd trees, shell snippets, Docker containers, and nested
//! groups or remote manifests. Each step is probed, installed when missing,
//! and updated when outdated.
//!
//! The crate is organised in layers:
//!
//! - **[`config`]**: load the configuration and resolve per-type defaults
//! - **[`installers`]**: one [`installers::Installer`] per step type
//! - **[`engine`]**: filtering, validation, the per-step workflow and the
//!   result tree
//! - **[`commands`]**: top-level subcommands (`install`, `validate`, ...)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod installers;
pub mod logging;
pub mod machine;
pub mod manifest;
pub mod platform;
