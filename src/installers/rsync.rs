//! Directory synchronisation with `rsync`.
use anyhow::{Context as _, Result};

use super::Installer;
use crate::config::defaults::ResolvedStep;
use crate::config::validation::StepValidator;
use crate::engine::Context;
use crate::error::ValidationError;
use crate::exec::expand_home;

/// Mirrors `opts.source` into `opts.destination`.
///
/// `opts.flags` adds extra rsync arguments; `opts.delete` removes files from
/// the destination that no longer exist in the source.
#[derive(Debug)]
pub struct RsyncInstaller {
    step: ResolvedStep,
}

impl RsyncInstaller {
    /// Create an rsync installer.
    #[must_use]
    pub const fn new(step: ResolvedStep) -> Self {
        Self { step }
    }

    /// Full argument list for a sync, optionally as an itemised dry run.
    fn args(&self, dry_run: bool) -> Result<Vec<String>> {
        let source = self.step.opt_str("source").context("opts.source is not set")?;
        let dest = self
            .step
            .opt_str("destination")
            .context("opts.destination is not set")?;

        let mut args = vec!["-a".to_string()];
        if dry_run {
            args.extend(["--dry-run".to_string(), "--itemize-changes".to_string()]);
        }
        if let Some(flags) = self.step.opts.get("flags").and_then(|f| f.as_array()) {
            args.extend(flags.iter().filter_map(|f| f.as_str()).map(str::to_string));
        }
        if self.step.opt_bool("delete") {
            args.push("--delete".to_string());
        }
        args.push(expand_home(source).to_string_lossy().into_owned());
        args.push(expand_home(dest).to_string_lossy().into_owned());
        Ok(args)
    }
}

impl Installer for RsyncInstaller {
    fn step(&self) -> &ResolvedStep {
        &self.step
    }

    fn validate(&self) -> Vec<ValidationError> {
        StepValidator::new(&self.step)
            .require_str("source")
            .require_str("destination")
            .optional_str_list("flags")
            .optional_bool("delete")
            .finish()
    }

    fn probe_installed(&self, _ctx: &Context) -> Result<bool> {
        let dest = self
            .step
            .opt_str("destination")
            .context("opts.destination is not set")?;
        Ok(expand_home(dest).exists())
    }

    fn probe_needs_update(&self, ctx: &Context) -> Result<bool> {
        let args = self.args(true)?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Ok(ctx
            .probe_output(&self.step, "rsync", &args)
            .is_some_and(|out| !out.trim().is_empty()))
    }

    fn install(&self, ctx: &Context) -> Result<()> {
        let args = self.args(false)?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        ctx.run(&self.step, "rsync", &args)
    }
}
