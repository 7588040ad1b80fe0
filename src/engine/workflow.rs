//! Per-step lifecycle: applicability, install-or-update decision, hooks and
//! composite recursion.
use std::sync::Arc;

use anyhow::Result;

use super::summary::{Outcome, ResultNode};
use super::{Context, describe_error, filter, validate_steps};
use crate::config::step::{Enabled, StepDeclaration};
use crate::error::{ConfigError, StepError};
use crate::installers::{self, Children, Installer};

/// Lifecycle hook identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
    PreInstall,
    PostInstall,
    PreUpdate,
    PostUpdate,
}

impl Hook {
    const fn name(self) -> &'static str {
        match self {
            Self::PreInstall => "pre_install",
            Self::PostInstall => "post_install",
            Self::PreUpdate => "pre_update",
            Self::PostUpdate => "post_update",
        }
    }
}

/// Resolve, dispatch and run one declared step, returning its result.
///
/// `top_level` controls whether name filters apply.
///
/// # Errors
///
/// Returns the first failure: an install, update or hook error, a manifest
/// that cannot be fetched, or fetched steps that fail validation.
pub fn run_step(decl: &StepDeclaration, ctx: &Context, top_level: bool) -> Result<ResultNode> {
    let unit = installers::create(decl, &ctx.defaults)?;
    let step = unit.step();
    let skipped = ResultNode::leaf(&step.name, step.kind, Outcome::Skipped)
        .with_skip_summary(step.skip_summary);

    let filters: &[String] = if top_level { &ctx.filters } else { &[] };
    if !filter::is_applicable(
        step,
        ctx.platform.os,
        ctx.machine_id.as_deref(),
        &ctx.machine_aliases,
        filters,
    ) {
        ctx.log.debug(&format!("{}: not applicable, skipping", step.name));
        return Ok(skipped);
    }

    if !is_enabled(unit.as_ref(), ctx) {
        ctx.log.debug(&format!("{}: disabled, skipping", step.name));
        return Ok(skipped);
    }

    if step.kind.is_composite() {
        return run_composite(unit.as_ref(), ctx);
    }

    let outcome = run_leaf(unit.as_ref(), ctx)?;
    Ok(ResultNode::leaf(&step.name, step.kind, outcome).with_skip_summary(step.skip_summary))
}

fn is_enabled(unit: &dyn Installer, ctx: &Context) -> bool {
    let step = unit.step();
    match &step.enabled {
        None | Some(Enabled::Flag(true)) => true,
        Some(Enabled::Flag(false)) => false,
        Some(Enabled::Command(cmd)) => match ctx.script_succeeds(step, cmd) {
            Ok(ok) => ok,
            Err(e) => {
                ctx.log
                    .debug(&format!("{}: enabled check failed: {e}", step.name));
                false
            }
        },
    }
}

fn run_leaf(unit: &dyn Installer, ctx: &Context) -> Result<Outcome> {
    let step = unit.step();

    if !unit.check_is_installed(ctx)? {
        ctx.log.stage(&format!("Installing {}", step.name));
        run_hook(unit, ctx, Hook::PreInstall)?;
        unit.install(ctx).map_err(|e| failed(unit, "install", e))?;
        run_hook(unit, ctx, Hook::PostInstall)?;
        return Ok(Outcome::Installed);
    }

    if !ctx.check_updates {
        ctx.log.debug(&format!("{}: installed", step.name));
        return Ok(Outcome::UpToDate);
    }

    if unit.check_needs_update(ctx)? {
        ctx.log.stage(&format!("Updating {}", step.name));
        run_hook(unit, ctx, Hook::PreUpdate)?;
        unit.update(ctx).map_err(|e| failed(unit, "update", e))?;
        run_hook(unit, ctx, Hook::PostUpdate)?;
        return Ok(Outcome::Upgraded);
    }

    ctx.log.debug(&format!("{}: up to date", step.name));
    Ok(Outcome::UpToDate)
}

fn run_composite(unit: &dyn Installer, ctx: &Context) -> Result<ResultNode> {
    let step = unit.step();
    let Children {
        steps,
        defaults,
        env,
        fetched,
    } = unit
        .children(ctx)
        .map_err(|e| failed(unit, "load", e))?;

    let child_ctx = ctx.for_children(env, defaults.map(Arc::new), fetched);
    if fetched {
        let errors = validate_steps(&steps, &child_ctx.defaults);
        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors).into());
        }
    }

    run_hook(unit, ctx, Hook::PreInstall)?;
    let mut results = Vec::with_capacity(steps.len());
    for child in &steps {
        results.push(run_step(child, &child_ctx, false)?);
    }
    run_hook(unit, ctx, Hook::PostInstall)?;

    Ok(ResultNode::container(&step.name, step.kind, results).with_skip_summary(step.skip_summary))
}

fn run_hook(unit: &dyn Installer, ctx: &Context, hook: Hook) -> Result<()> {
    let step = unit.step();
    let script = match hook {
        Hook::PreInstall => step.pre_install.as_deref(),
        Hook::PostInstall => step.post_install.as_deref(),
        Hook::PreUpdate => step.pre_update.as_deref(),
        Hook::PostUpdate => step.post_update.as_deref(),
    };
    let Some(script) = script.filter(|s| !s.trim().is_empty()) else {
        return Ok(());
    };

    ctx.log.debug(&format!("{}: running {} hook", step.name, hook.name()));
    ctx.run_script(step, script).map_err(|e| {
        StepError::Hook {
            step: step.name.clone(),
            hook: hook.name(),
            reason: describe_error(&e),
        }
        .into()
    })
}

fn failed(unit: &dyn Installer, action: &'static str, e: anyhow::Error) -> anyhow::Error {
    let name = &unit.step().name;
    // Configuration problems keep their type so callers can report them.
    if e.downcast_ref::<ConfigError>().is_some() {
        return e.context(format!("step '{name}'"));
    }
    StepError::Failed {
        step: name.clone(),
        action,
        reason: describe_error(&e),
    }
    .into()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::config::defaults::{StepOverride, TypeDefaults};
    use crate::config::step::{Restriction, SkipSummary};
    use crate::installers::test_helpers::{MockExecutor, context, context_with_fetcher};
    use crate::manifest::{MAX_MANIFEST_DEPTH, MockManifestFetcher};
    use crate::platform::Os;
    use serde_json::json;

    fn ok() -> (bool, String) {
        (true, String::new())
    }

    fn fail() -> (bool, String) {
        (false, String::new())
    }

    /// A shell step whose installed state is decided by `check_installed`.
    fn shell(name: &str) -> StepDeclaration {
        let mut d = StepDeclaration::new(name, "shell");
        d.opts = serde_json::from_value(json!({ "command": format!("install {name}") })).ok();
        d.check_installed = Some(format!("check {name}"));
        d
    }

    fn group(name: &str, steps: Vec<StepDeclaration>) -> StepDeclaration {
        let mut d = StepDeclaration::new(name, "group");
        d.steps = Some(steps);
        d
    }

    #[test]
    fn missing_step_is_installed_with_hooks_in_order() {
        let mut decl = shell("tool");
        decl.pre_install = Some("before".to_string());
        decl.post_install = Some("after".to_string());
        let exec = MockExecutor::with_responses(vec![fail(), ok(), ok(), ok()]);
        let calls = exec.call_log();
        let result = run_step(&decl, &context(exec), true).unwrap();

        assert_eq!(result.outcome, Outcome::Installed);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "script: check tool",
                "script: before",
                "script: install tool",
                "script: after"
            ]
        );
    }

    #[test]
    fn installed_step_without_update_is_up_to_date() {
        let mut decl = shell("tool");
        decl.check_has_update = Some("outdated tool".to_string());
        let exec = MockExecutor::with_responses(vec![ok(), fail()]);
        let result = run_step(&decl, &context(exec), true).unwrap();
        assert_eq!(result.outcome, Outcome::UpToDate);
    }

    #[test]
    fn installed_step_with_update_runs_update_hooks_only() {
        let mut decl = shell("tool");
        decl.check_has_update = Some("outdated tool".to_string());
        decl.pre_install = Some("pre-install".to_string());
        decl.pre_update = Some("pre-update".to_string());
        decl.post_update = Some("post-update".to_string());
        let exec = MockExecutor::with_responses(vec![ok(), ok(), ok(), ok(), ok()]);
        let calls = exec.call_log();
        let result = run_step(&decl, &context(exec), true).unwrap();

        assert_eq!(result.outcome, Outcome::Upgraded);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "script: check tool",
                "script: outdated tool",
                "script: pre-update",
                "script: install tool",
                "script: post-update"
            ]
        );
    }

    #[test]
    fn update_checks_can_be_disabled() {
        let mut decl = shell("tool");
        decl.check_has_update = Some("outdated tool".to_string());
        let exec = MockExecutor::with_responses(vec![ok()]);
        let calls = exec.call_log();
        let ctx = context(exec).with_check_updates(false);
        let result = run_step(&decl, &ctx, true).unwrap();
        assert_eq!(result.outcome, Outcome::UpToDate);
        assert_eq!(calls.lock().unwrap().len(), 1, "no update probe");
    }

    #[test]
    fn failing_install_is_step_error() {
        let exec = MockExecutor::with_responses(vec![fail(), fail()]);
        let err = run_step(&shell("tool"), &context(exec), true).unwrap_err();
        let step_err = err.downcast_ref::<StepError>().unwrap();
        assert!(matches!(step_err, StepError::Failed { action: "install", .. }));
    }

    #[test]
    fn failing_hook_aborts_before_install() {
        let mut decl = shell("tool");
        decl.pre_install = Some("before".to_string());
        let exec = MockExecutor::with_responses(vec![fail(), fail()]);
        let calls = exec.call_log();
        let err = run_step(&decl, &context(exec), true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StepError>(),
            Some(StepError::Hook { hook: "pre_install", .. })
        ));
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn empty_hook_is_ignored() {
        let mut decl = shell("tool");
        decl.pre_install = Some(String::new());
        let exec = MockExecutor::with_responses(vec![fail(), ok()]);
        let result = run_step(&decl, &context(exec), true).unwrap();
        assert_eq!(result.outcome, Outcome::Installed);
    }

    #[test]
    fn inapplicable_step_is_skipped_without_running_anything() {
        let mut decl = shell("tool");
        decl.platforms = Some(Restriction::only(vec![Os::Windows]));
        let exec = MockExecutor::with_responses(vec![]);
        let calls = exec.call_log();
        let result = run_step(&decl, &context(exec), true).unwrap();
        assert_eq!(result.outcome, Outcome::Skipped);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn disabled_step_is_skipped() {
        let mut flag = shell("a");
        flag.enabled = Some(Enabled::Flag(false));
        let mut cmd = shell("b");
        cmd.enabled = Some(Enabled::Command("test -f /nope".to_string()));
        let exec = MockExecutor::with_responses(vec![fail()]);
        let ctx = context(exec);
        assert_eq!(run_step(&flag, &ctx, true).unwrap().outcome, Outcome::Skipped);
        assert_eq!(run_step(&cmd, &ctx, true).unwrap().outcome, Outcome::Skipped);
    }

    #[test]
    fn name_filters_apply_only_at_top_level() {
        let decl = group("cli-tools", vec![shell("ripgrep")]);
        let exec = MockExecutor::with_responses(vec![ok()]);
        let ctx = context(exec).with_filters(vec!["cli".to_string()]);
        let result = run_step(&decl, &ctx, true).unwrap();
        assert_eq!(result.children[0].outcome, Outcome::UpToDate);

        let other = run_step(&shell("jq"), &ctx, true).unwrap();
        assert_eq!(other.outcome, Outcome::Skipped);
    }

    #[test]
    fn group_runs_children_between_its_hooks_and_folds_outcome() {
        let mut decl = group("tools", vec![shell("a"), shell("b")]);
        decl.pre_install = Some("group-before".to_string());
        decl.post_install = Some("group-after".to_string());
        // a: installed already; b: missing -> install
        let exec = MockExecutor::with_responses(vec![ok(), ok(), fail(), ok(), ok()]);
        let calls = exec.call_log();
        let result = run_step(&decl, &context(exec), true).unwrap();

        assert_eq!(result.outcome, Outcome::Installed);
        assert_eq!(result.children.len(), 2);
        assert_eq!(result.children[0].outcome, Outcome::UpToDate);
        assert_eq!(result.children[1].outcome, Outcome::Installed);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "script: group-before",
                "script: check a",
                "script: check b",
                "script: install b",
                "script: group-after"
            ]
        );
    }

    #[test]
    fn group_env_is_inherited_by_children() {
        let mut decl = group("tools", vec![shell("a")]);
        decl.env = Some([("FROM_GROUP".to_string(), "1".to_string())].into());
        let exec = MockExecutor::with_responses(vec![ok()]);
        let envs = exec.env_log();
        run_step(&decl, &context(exec), true).unwrap();
        assert_eq!(envs.lock().unwrap()[0].get("FROM_GROUP").map(String::as_str), Some("1"));
    }

    #[test]
    fn skip_summary_is_carried_into_results() {
        let mut decl = shell("quiet");
        decl.skip_summary = Some(SkipSummary {
            install: true,
            update: false,
        });
        let exec = MockExecutor::with_responses(vec![fail(), ok()]);
        let result = run_step(&decl, &context(exec), true).unwrap();
        assert!(result.skip_summary.install);
    }

    fn manifest(name: &str) -> StepDeclaration {
        let mut d = StepDeclaration::new(name, "manifest");
        d.opts = serde_json::from_value(json!({ "source": "/srv/manifests" })).ok();
        d
    }

    #[test]
    fn manifest_children_run_with_manifest_defaults() {
        let mut fetcher = MockManifestFetcher::new();
        fetcher.expect_fetch().times(1).returning(|_, _| {
            let mut child = StepDeclaration::new("remote", "shell");
            child.opts = serde_json::from_value(json!({ "command": "install remote" })).ok();
            Ok(AppConfig {
                install: vec![child],
                defaults: TypeDefaults::default().with(
                    crate::config::step::StepType::Shell,
                    StepOverride {
                        check_installed: Some("remote-check".to_string()),
                        ..StepOverride::default()
                    },
                ),
                ..AppConfig::default()
            })
        });
        let exec = MockExecutor::with_responses(vec![ok()]);
        let calls = exec.call_log();
        let ctx = context_with_fetcher(exec, fetcher);
        let result = run_step(&manifest("work"), &ctx, true).unwrap();

        assert_eq!(result.children[0].name, "remote");
        assert_eq!(result.children[0].outcome, Outcome::UpToDate);
        assert_eq!(*calls.lock().unwrap(), vec!["script: remote-check"]);
    }

    #[test]
    fn invalid_manifest_children_abort_before_running() {
        let mut fetcher = MockManifestFetcher::new();
        fetcher.expect_fetch().returning(|_, _| {
            Ok(AppConfig {
                install: vec![shell("good"), StepDeclaration::new("bad", "rsync")],
                ..AppConfig::default()
            })
        });
        let exec = MockExecutor::with_responses(vec![]);
        let calls = exec.call_log();
        let ctx = context_with_fetcher(exec, fetcher);
        let err = run_step(&manifest("work"), &ctx, true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Invalid(errs)) if errs.iter().all(|e| e.step == "bad")
        ));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn manifest_depth_is_bounded() {
        let mut fetcher = MockManifestFetcher::new();
        fetcher.expect_fetch().returning(|_, _| {
            let mut again = StepDeclaration::new("again", "manifest");
            again.opts = serde_json::from_value(json!({ "source": "/srv/manifests" })).ok();
            Ok(AppConfig {
                install: vec![again],
                ..AppConfig::default()
            })
        });
        let ctx = context_with_fetcher(MockExecutor::with_responses(vec![]), fetcher);
        let err = run_step(&manifest("loop"), &ctx, true).unwrap_err();
        assert!(
            format!("{err:#}").contains(&format!("exceeds {MAX_MANIFEST_DEPTH}")),
            "{err:#}"
        );
    }
}
