//! Arbitrary shell commands.
use anyhow::{Context as _, Result};

use super::Installer;
use crate::config::defaults::ResolvedStep;
use crate::config::validation::StepValidator;
use crate::engine::Context;
use crate::error::ValidationError;

/// Runs `opts.command` to install and `opts.update_command` (or `command`)
/// to update.
///
/// Without a `check_installed` script the step is considered installed when
/// `bin_name` is on `PATH`, and never installed when no `bin_name` is set.
#[derive(Debug)]
pub struct ShellInstaller {
    step: ResolvedStep,
}

impl ShellInstaller {
    /// Create a shell installer.
    #[must_use]
    pub const fn new(step: ResolvedStep) -> Self {
        Self { step }
    }

    fn command(&self) -> Result<&str> {
        self.step.opt_str("command").context("opts.command is not set")
    }
}

impl Installer for ShellInstaller {
    fn step(&self) -> &ResolvedStep {
        &self.step
    }

    fn validate(&self) -> Vec<ValidationError> {
        StepValidator::new(&self.step)
            .require_str("command")
            .optional_str("update_command")
            .finish()
    }

    fn probe_installed(&self, ctx: &Context) -> Result<bool> {
        Ok(self
            .step
            .bin_name
            .as_deref()
            .is_some_and(|bin| ctx.executor.which(bin)))
    }

    fn install(&self, ctx: &Context) -> Result<()> {
        ctx.run_script(&self.step, self.command()?)
    }

    fn update(&self, ctx: &Context) -> Result<()> {
        let script = match self.step.opt_str("update_command") {
            Some(cmd) => cmd,
            None => self.command()?,
        };
        ctx.run_script(&self.step, script)
    }
}
