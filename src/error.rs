//! Domain-specific error types for the installer engine.
//!
//! This module provides a structured error hierarchy using [`thiserror`].
//! Internal modules return typed errors (e.g., [`ConfigError`], [`StepError`])
//! while command handlers at the CLI boundary convert them to [`anyhow::Error`]
//! via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! LoadoutError
//! ├── Config(ConfigError) file loading, unknown types, validation gate
//! ├── Step(StepError)     install/update/hook failures of a single step
//! └── Exec(ExecError)     external command spawn or exit failures
//! ```

use std::fmt;

use thiserror::Error;

/// Top-level error type for the installer engine.
#[derive(Error, Debug)]
pub enum LoadoutError {
    /// Configuration-related error (parsing, unknown types, validation).
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A step failed while executing.
    #[error("Step error: {0}")]
    Step(#[from] StepError),

    /// An external command could not be run or exited non-zero.
    #[error("Command error: {0}")]
    Exec(#[from] ExecError),
}

/// A field-level problem found while validating a step declaration.
///
/// Validation never touches the filesystem or network; these errors are
/// collected across every step before anything runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Name of the step that owns the offending field.
    pub step: String,
    /// Name of the offending field (e.g. `opts.repository`).
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error.
    #[must_use]
    pub fn new(
        step: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}': {}: {}", self.step, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Errors that arise from configuration loading and step declarations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A step declares a type tag outside the supported set.
    #[error("step '{step}': unsupported type '{tag}'")]
    UnsupportedType {
        /// Name of the offending step.
        step: String,
        /// The unrecognised type tag.
        tag: String,
    },

    /// No configuration file could be located.
    #[error("no configuration file found (searched: {0})")]
    NotFound(String),

    /// An I/O error occurred while reading a config file.
    #[error("IO error reading config file {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file could not be deserialised.
    #[error("invalid configuration in {path}: {message}")]
    Parse {
        /// Path to the file that failed to parse.
        path: String,
        /// Parser message.
        message: String,
    },

    /// One or more steps failed pre-flight validation.
    #[error("{} validation error(s)", .0.len())]
    Invalid(Vec<ValidationError>),

    /// Remote manifests nest deeper than allowed.
    #[error("step '{step}': manifest nesting exceeds {max} levels")]
    ManifestDepth {
        /// Name of the manifest step that would exceed the limit.
        step: String,
        /// Maximum allowed nesting.
        max: usize,
    },
}

/// Errors that arise while a step is being installed or updated.
#[derive(Error, Debug)]
pub enum StepError {
    /// The install or update action itself failed.
    #[error("step '{step}' failed to {action}: {reason}")]
    Failed {
        /// Name of the step.
        step: String,
        /// Action being performed (`install`, `update`, …).
        action: &'static str,
        /// Human-readable reason for the failure.
        reason: String,
    },

    /// A pre/post hook command failed.
    #[error("step '{step}': {hook} hook failed: {reason}")]
    Hook {
        /// Name of the step.
        step: String,
        /// Hook name (`pre_install`, `post_update`, …).
        hook: &'static str,
        /// Human-readable reason for the failure.
        reason: String,
    },
}

/// Errors raised by the command runner.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The program could not be started.
    #[error("failed to execute '{program}': {source}")]
    Spawn {
        /// Program that was invoked.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The program exited with a non-zero status.
    #[error("command '{program}' failed (exit {exit_code}): {stderr}")]
    Failed {
        /// Program that was invoked.
        program: String,
        /// Exit code, `-1` when terminated by a signal.
        exit_code: i32,
        /// Captured standard error output (may be empty for pass-through runs).
        stderr: String,
    },
}
