//! Git repository checkouts.
use std::path::PathBuf;

use anyhow::{Context as _, Result};

use super::Installer;
use crate::config::defaults::ResolvedStep;
use crate::config::validation::StepValidator;
use crate::engine::Context;
use crate::error::ValidationError;
use crate::exec::expand_home;

/// Clones `opts.repository` into `opts.destination` and keeps it
/// fast-forwarded to its upstream.
#[derive(Debug)]
pub struct GitInstaller {
    step: ResolvedStep,
}

impl GitInstaller {
    /// Create a git installer.
    #[must_use]
    pub const fn new(step: ResolvedStep) -> Self {
        Self { step }
    }

    fn repository(&self) -> Result<&str> {
        self.step
            .opt_str("repository")
            .context("opts.repository is not set")
    }

    fn destination(&self) -> Result<PathBuf> {
        self.step
            .opt_str("destination")
            .map(expand_home)
            .context("opts.destination is not set")
    }

    fn rev(&self, ctx: &Context, dest: &str, rev: &str) -> Option<String> {
        ctx.probe_output(&self.step, "git", &["-C", dest, "rev-parse", rev])
            .map(|s| s.trim().to_string())
    }
}

impl Installer for GitInstaller {
    fn step(&self) -> &ResolvedStep {
        &self.step
    }

    fn validate(&self) -> Vec<ValidationError> {
        StepValidator::new(&self.step)
            .require_str("repository")
            .require_str("destination")
            .optional_str("ref")
            .finish()
    }

    fn probe_installed(&self, _ctx: &Context) -> Result<bool> {
        Ok(self.destination()?.join(".git").exists())
    }

    fn probe_needs_update(&self, ctx: &Context) -> Result<bool> {
        let dest = self.destination()?;
        let dest = dest.to_string_lossy();
        if !ctx.probe(&self.step, "git", &["-C", &dest, "fetch", "--quiet"]) {
            ctx.log
                .warn(&format!("{}: git fetch failed, skipping update check", self.step.name));
            return Ok(false);
        }
        let head = self.rev(ctx, &dest, "HEAD");
        let upstream = self.rev(ctx, &dest, "@{u}");
        Ok(match (head, upstream) {
            (Some(head), Some(upstream)) => head != upstream,
            _ => false,
        })
    }

    fn install(&self, ctx: &Context) -> Result<()> {
        let dest = self.destination()?.to_string_lossy().into_owned();
        let mut args = vec!["clone"];
        if let Some(reference) = self.step.opt_str("ref") {
            args.extend(["--branch", reference]);
        }
        args.extend([self.repository()?, dest.as_str()]);
        ctx.run(&self.step, "git", &args)
    }

    fn update(&self, ctx: &Context) -> Result<()> {
        let dest = self.destination()?;
        ctx.run(
            &self.step,
            "git",
            &["-C", &dest.to_string_lossy(), "pull", "--ff-only"],
        )
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::step::StepType;
    use crate::installers::test_helpers::{MockExecutor, context, resolved};
    use serde_json::json;

    fn installer(opts: serde_json::Value) -> GitInstaller {
        GitInstaller::new(resolved("dotfiles", StepType::Git, opts))
    }

    #[test]
    fn requires_repository_and_destination() {
        let fields: Vec<String> = installer(json!({ "ref": "" }))
            .validate()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["opts.repository", "opts.destination", "opts.ref"]);
    }

    #[test]
    fn installed_when_checkout_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("repo");
        let git = installer(json!({ "repository": "https://x/y.git", "destination": dest }));
        let ctx = context(MockExecutor::with_responses(vec![]));
        assert!(!git.probe_installed(&ctx).unwrap());
        std::fs::create_dir_all(dest.join(".git")).unwrap();
        assert!(git.probe_installed(&ctx).unwrap());
    }

    #[test]
    fn clone_honours_ref() {
        let git = installer(json!({
            "repository": "https://example.com/dots.git",
            "destination": "/opt/dots",
            "ref": "main"
        }));
        let exec = MockExecutor::ok("");
        let calls = exec.call_log();
        git.install(&context(exec)).unwrap();
        assert_eq!(
            calls.lock().unwrap()[0],
            "git clone --branch main https://example.com/dots.git /opt/dots"
        );
    }

    #[test]
    fn update_needed_when_behind_upstream() {
        let git = installer(json!({ "repository": "r", "destination": "/opt/dots" }));
        let exec = MockExecutor::with_responses(vec![
            (true, String::new()),
            (true, "aaa\n".to_string()),
            (true, "bbb\n".to_string()),
        ]);
        let calls = exec.call_log();
        assert!(git.probe_needs_update(&context(exec)).unwrap());
        assert_eq!(calls.lock().unwrap()[0], "git -C /opt/dots fetch --quiet");
    }

    #[test]
    fn no_update_when_in_sync_or_fetch_fails() {
        let git = installer(json!({ "repository": "r", "destination": "/opt/dots" }));
        let exec = MockExecutor::with_responses(vec![
            (true, String::new()),
            (true, "aaa\n".to_string()),
            (true, "aaa\n".to_string()),
        ]);
        assert!(!git.probe_needs_update(&context(exec)).unwrap());
        assert!(!git.probe_needs_update(&context(MockExecutor::fail())).unwrap());
    }

    #[test]
    fn update_fast_forwards() {
        let git = installer(json!({ "repository": "r", "destination": "/opt/dots" }));
        let exec = MockExecutor::ok("");
        let calls = exec.call_log();
        git.update(&context(exec)).unwrap();
        assert_eq!(calls.lock().unwrap()[0], "git -C /opt/dots pull --ff-only");
    }
}
