//! Composite steps: inline groups and fetched manifests.
//!
//! Composites never install anything themselves; the workflow runs their
//! hooks around the children they return.
use anyhow::{Context as _, Result};

use super::{Children, Installer};
use crate::config::defaults::ResolvedStep;
use crate::config::validation::StepValidator;
use crate::engine::Context;
use crate::error::{ConfigError, ValidationError};
use crate::manifest::{MAX_MANIFEST_DEPTH, ManifestSource};

/// An inline list of child steps sharing the group's environment.
#[derive(Debug)]
pub struct GroupInstaller {
    step: ResolvedStep,
}

impl GroupInstaller {
    /// Create a group.
    #[must_use]
    pub const fn new(step: ResolvedStep) -> Self {
        Self { step }
    }
}

impl Installer for GroupInstaller {
    fn step(&self) -> &ResolvedStep {
        &self.step
    }

    fn validate(&self) -> Vec<ValidationError> {
        StepValidator::new(&self.step)
            .check(|step, errors| {
                if step.steps.is_empty() {
                    errors.push(ValidationError::new(&step.name, "steps", "must not be empty"));
                }
            })
            .finish()
    }

    fn children(&self, ctx: &Context) -> Result<Children> {
        Ok(Children {
            steps: self.step.steps.clone(),
            defaults: None,
            env: ctx.step_env(&self.step),
            fetched: false,
        })
    }
}

/// Child steps loaded from another configuration file or repository.
///
/// The fetched configuration's `defaults` replace the inherited ones when it
/// declares any; its `env` is layered over the manifest step's environment.
#[derive(Debug)]
pub struct ManifestInstaller {
    step: ResolvedStep,
}

impl ManifestInstaller {
    /// Create a manifest step.
    #[must_use]
    pub const fn new(step: ResolvedStep) -> Self {
        Self { step }
    }

    fn source(&self) -> Result<ManifestSource> {
        Ok(ManifestSource {
            source: self
                .step
                .opt_str("source")
                .context("opts.source is not set")?
                .to_string(),
            reference: self.step.opt_str("ref").map(str::to_string),
            path: self.step.opt_str("path").map(str::to_string),
        })
    }
}

impl Installer for ManifestInstaller {
    fn step(&self) -> &ResolvedStep {
        &self.step
    }

    fn validate(&self) -> Vec<ValidationError> {
        StepValidator::new(&self.step)
            .require_str("source")
            .optional_str("ref")
            .optional_str("path")
            .check(|step, errors| {
                if !step.steps.is_empty() {
                    errors.push(ValidationError::new(
                        &step.name,
                        "steps",
                        "not supported by 'manifest' steps",
                    ));
                }
            })
            .finish()
    }

    fn children(&self, ctx: &Context) -> Result<Children> {
        if ctx.depth >= MAX_MANIFEST_DEPTH {
            return Err(ConfigError::ManifestDepth {
                step: self.step.name.clone(),
                max: MAX_MANIFEST_DEPTH,
            }
            .into());
        }

        let source = self.source()?;
        ctx.log
            .debug(&format!("{}: loading manifest from {}", self.step.name, source.source));
        let config = ctx
            .fetcher
            .fetch(&source, &ctx.cache_dir)
            .with_context(|| format!("loading manifest '{}'", source.source))?;

        let mut env = ctx.step_env(&self.step);
        env.extend(config.env_for(ctx.platform.os));
        let defaults = (!config.defaults.types.is_empty()).then_some(config.defaults);
        Ok(Children {
            steps: config.install,
            defaults,
            env,
            fetched: true,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::config::step::{StepDeclaration, StepType};
    use crate::installers::test_helpers::{MockExecutor, context, context_with_fetcher, resolved};
    use crate::manifest::MockManifestFetcher;
    use serde_json::json;

    #[test]
    fn empty_group_is_invalid() {
        let group = GroupInstaller::new(resolved("tools", StepType::Group, json!({})));
        assert_eq!(group.validate()[0].field, "steps");
    }

    #[test]
    fn group_children_carry_group_env() {
        let mut step = resolved("tools", StepType::Group, json!({}));
        step.steps = vec![StepDeclaration::new("a", "shell")];
        step.env.insert("GROUP".into(), "1".into());
        let children = GroupInstaller::new(step)
            .children(&context(MockExecutor::with_responses(vec![])))
            .unwrap();
        assert_eq!(children.steps.len(), 1);
        assert_eq!(children.env["GROUP"], "1");
        assert!(!children.fetched);
        assert!(children.defaults.is_none());
    }

    #[test]
    fn composites_install_nothing_themselves() {
        let exec = MockExecutor::with_responses(vec![]);
        let calls = exec.call_log();
        let ctx = context(exec);
        let group = GroupInstaller::new(resolved("tools", StepType::Group, json!({})));
        let manifest = ManifestInstaller::new(resolved("team", StepType::Manifest, json!({})));
        for unit in [&group as &dyn Installer, &manifest] {
            assert!(unit.check_is_installed(&ctx).unwrap());
            assert!(!unit.check_needs_update(&ctx).unwrap());
            unit.install(&ctx).unwrap();
        }
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn manifest_validation() {
        let mut step = resolved("work", StepType::Manifest, json!({ "path": "" }));
        step.steps = vec![StepDeclaration::new("a", "shell")];
        let fields: Vec<String> = ManifestInstaller::new(step)
            .validate()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["opts.source", "opts.path", "steps"]);
    }

    #[test]
    fn manifest_fetches_with_ref_and_path() {
        let mut fetcher = MockManifestFetcher::new();
        fetcher
            .expect_fetch()
            .withf(|source, _| {
                source.source == "https://example.com/team.git"
                    && source.reference.as_deref() == Some("v2")
                    && source.path.as_deref() == Some("tools.toml")
            })
            .times(1)
            .returning(|_, _| {
                Ok(AppConfig {
                    env: [("TEAM".to_string(), "yes".to_string())].into(),
                    install: vec![StepDeclaration::new("remote", "shell")],
                    ..AppConfig::default()
                })
            });
        let step = resolved(
            "team",
            StepType::Manifest,
            json!({ "source": "https://example.com/team.git", "ref": "v2", "path": "tools.toml" }),
        );
        let ctx = context_with_fetcher(MockExecutor::with_responses(vec![]), fetcher);
        let children = ManifestInstaller::new(step).children(&ctx).unwrap();
        assert!(children.fetched);
        assert_eq!(children.steps[0].name, "remote");
        assert_eq!(children.env["TEAM"], "yes");
        assert!(children.defaults.is_none(), "empty defaults are inherited");
    }

    #[test]
    fn fetch_failure_is_error() {
        let mut fetcher = MockManifestFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_, _| Err(anyhow::anyhow!("repository not found")));
        let step = resolved("team", StepType::Manifest, json!({ "source": "/nope" }));
        let ctx = context_with_fetcher(MockExecutor::with_responses(vec![]), fetcher);
        let err = ManifestInstaller::new(step).children(&ctx).unwrap_err();
        assert!(format!("{err:#}").contains("repository not found"));
    }

    #[test]
    fn depth_limit_is_checked_before_fetching() {
        let step = resolved("deep", StepType::Manifest, json!({ "source": "/x" }));
        let mut ctx = context(MockExecutor::with_responses(vec![]));
        ctx.depth = MAX_MANIFEST_DEPTH;
        let err = ManifestInstaller::new(step).children(&ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ManifestDepth { max: MAX_MANIFEST_DEPTH, .. })
        ));
    }
}
