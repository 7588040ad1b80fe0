//! Long-running Docker containers.
use anyhow::{Context as _, Result};

use super::Installer;
use crate::config::defaults::ResolvedStep;
use crate::config::validation::StepValidator;
use crate::engine::Context;
use crate::error::ValidationError;

/// Keeps a detached container named after the step running `opts.image`.
///
/// `opts.args` are passed to `docker run` before the image. An update pulls
/// the image and recreates the container when the pulled image differs from
/// the one the container was started from.
#[derive(Debug)]
pub struct DockerInstaller {
    step: ResolvedStep,
}

impl DockerInstaller {
    /// Create a docker installer.
    #[must_use]
    pub const fn new(step: ResolvedStep) -> Self {
        Self { step }
    }

    fn image(&self) -> Result<&str> {
        self.step.opt_str("image").context("opts.image is not set")
    }

    fn inspect(&self, ctx: &Context, object: &str, format: &str, target: &str) -> Option<String> {
        ctx.probe_output(
            &self.step,
            "docker",
            &[object, "inspect", "--format", format, target],
        )
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    }
}

impl Installer for DockerInstaller {
    fn step(&self) -> &ResolvedStep {
        &self.step
    }

    fn validate(&self) -> Vec<ValidationError> {
        StepValidator::new(&self.step)
            .require_str("image")
            .optional_str_list("args")
            .finish()
    }

    fn probe_installed(&self, ctx: &Context) -> Result<bool> {
        Ok(ctx.probe(
            &self.step,
            "docker",
            &["container", "inspect", &self.step.name],
        ))
    }

    fn probe_needs_update(&self, ctx: &Context) -> Result<bool> {
        let image = self.image()?;
        if !ctx.probe(&self.step, "docker", &["pull", "--quiet", image]) {
            ctx.log
                .warn(&format!("{}: docker pull failed, skipping update check", self.step.name));
            return Ok(false);
        }
        let pulled = self.inspect(ctx, "image", "{{.Id}}", image);
        let running = self.inspect(ctx, "container", "{{.Image}}", &self.step.name);
        Ok(match (pulled, running) {
            (Some(pulled), Some(running)) => pulled != running,
            _ => false,
        })
    }

    fn install(&self, ctx: &Context) -> Result<()> {
        let mut args = vec!["run", "-d", "--name", self.step.name.as_str()];
        if let Some(extra) = self.step.opts.get("args").and_then(|a| a.as_array()) {
            args.extend(extra.iter().filter_map(|a| a.as_str()));
        }
        args.push(self.image()?);
        ctx.run(&self.step, "docker", &args)
    }

    fn update(&self, ctx: &Context) -> Result<()> {
        ctx.run(&self.step, "docker", &["rm", "-f", &self.step.name])?;
        self.install(ctx)
    }
}
