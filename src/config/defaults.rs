//! Defaults resolution: turn a raw [`StepDeclaration`] into a [`ResolvedStep`].
//!
//! Resolution runs in two ordered phases:
//!
//! 1. **Base fill**: every absent collection becomes its empty value and the
//!    Linux-only package managers are restricted to Linux.
//! 2. **Override merge**: when [`TypeDefaults`] has an entry for the step's
//!    type, maps are merged key-by-key (override wins) and scalar fields that
//!    are *present* in the override replace the step's own value.
//!
//! The defaults table is always passed in explicitly; nothing here reads
//! global state.
use std::collections::BTreeMap;

use serde::Deserialize;

use super::step::{Enabled, Options, Restriction, SkipSummary, StepDeclaration, StepType};
use crate::exec::Env;
use crate::platform::Os;

/// Partial declaration applied to every step of one type.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepOverride {
    /// Options merged key-by-key into the step's `opts`.
    pub opts: Option<Options>,
    /// Environment merged key-by-key into the step's `env`.
    pub env: Option<Env>,
    /// Per-platform environment merged per OS key.
    pub platform_env: Option<BTreeMap<Os, Env>>,
    /// Replaces the step's platform restriction.
    pub platforms: Option<Restriction<Os>>,
    /// Replaces the step's `pre_install` hook.
    pub pre_install: Option<String>,
    /// Replaces the step's `post_install` hook.
    pub post_install: Option<String>,
    /// Replaces the step's `pre_update` hook.
    pub pre_update: Option<String>,
    /// Replaces the step's `post_update` hook.
    pub post_update: Option<String>,
    /// Replaces the step's `check_installed` command.
    pub check_installed: Option<String>,
    /// Replaces the step's `check_has_update` command.
    pub check_has_update: Option<String>,
}

/// Per-type override templates (`[defaults.type.<tag>]`).
///
/// Keys are kept as raw tags so that an unknown tag surfaces as a validation
/// error rather than a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDefaults {
    /// Override per type tag.
    #[serde(rename = "type", default)]
    pub types: BTreeMap<String, StepOverride>,
}

impl TypeDefaults {
    /// Look up the override for `kind`.
    #[must_use]
    pub fn get(&self, kind: StepType) -> Option<&StepOverride> {
        self.types.get(kind.as_str())
    }

    /// Add (or replace) the override for `kind`.
    #[must_use]
    pub fn with(mut self, kind: StepType, ov: StepOverride) -> Self {
        self.types.insert(kind.as_str().to_string(), ov);
        self
    }

    /// Tags in the table that do not name a supported type.
    pub fn unknown_tags(&self) -> impl Iterator<Item = &str> {
        self.types
            .keys()
            .map(String::as_str)
            .filter(|k| k.parse::<StepType>().is_err())
    }
}

/// A step after defaults resolution: no collection is left unset.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStep {
    /// Step name.
    pub name: String,
    /// Parsed type tag.
    pub kind: StepType,
    /// Enable predicate, `None` meaning always enabled.
    pub enabled: Option<Enabled>,
    /// Space-separated labels (possibly empty).
    pub tags: String,
    /// Step environment.
    pub env: Env,
    /// Per-platform environment.
    pub platform_env: BTreeMap<Os, Env>,
    /// Platform applicability.
    pub platforms: Restriction<Os>,
    /// Machine applicability.
    pub machines: Restriction<String>,
    /// Child declarations (composites only).
    pub steps: Vec<StepDeclaration>,
    /// Variant options.
    pub opts: Options,
    /// Binary name override.
    pub bin_name: Option<String>,
    /// Hook run before installing.
    pub pre_install: Option<String>,
    /// Hook run after installing.
    pub post_install: Option<String>,
    /// Hook run before updating.
    pub pre_update: Option<String>,
    /// Hook run after updating.
    pub post_update: Option<String>,
    /// Custom installed check.
    pub check_installed: Option<String>,
    /// Custom update check.
    pub check_has_update: Option<String>,
    /// Per-platform shell override.
    pub shell: BTreeMap<Os, String>,
    /// Summary visibility flags.
    pub skip_summary: SkipSummary,
}

impl ResolvedStep {
    /// Iterate the step's tags.
    pub fn tag_list(&self) -> impl Iterator<Item = &str> {
        self.tags.split_whitespace()
    }

    /// Binary name used by `PATH` probes: `bin_name`, else the step name.
    #[must_use]
    pub fn bin(&self) -> &str {
        self.bin_name.as_deref().unwrap_or(&self.name)
    }

    /// String option, if present and a string.
    #[must_use]
    pub fn opt_str(&self, key: &str) -> Option<&str> {
        self.opts.get(key).and_then(serde_json::Value::as_str)
    }

    /// Boolean option, `false` when absent or not a boolean.
    #[must_use]
    pub fn opt_bool(&self, key: &str) -> bool {
        self.opts
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    /// Environment for `os`: step `env` overlaid with its `platform_env` entry.
    #[must_use]
    pub fn env_for(&self, os: Os) -> Env {
        let mut env = self.env.clone();
        if let Some(extra) = self.platform_env.get(&os) {
            env.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        env
    }
}

impl From<ResolvedStep> for StepDeclaration {
    fn from(step: ResolvedStep) -> Self {
        Self {
            name: step.name,
            kind: step.kind.as_str().to_string(),
            enabled: step.enabled,
            tags: Some(step.tags),
            env: Some(step.env),
            platform_env: Some(step.platform_env),
            platforms: Some(step.platforms),
            machines: Some(step.machines),
            steps: Some(step.steps),
            opts: Some(step.opts),
            bin_name: step.bin_name,
            pre_install: step.pre_install,
            post_install: step.post_install,
            pre_update: step.pre_update,
            post_update: step.post_update,
            check_installed: step.check_installed,
            check_has_update: step.check_has_update,
            shell: Some(step.shell),
            skip_summary: Some(step.skip_summary),
        }
    }
}

/// Resolve `step` as type `kind` against `defaults`.
#[must_use]
pub fn resolve(step: &StepDeclaration, kind: StepType, defaults: &TypeDefaults) -> ResolvedStep {
    let mut resolved = base_fill(step, kind);
    if let Some(ov) = defaults.get(kind) {
        apply_override(&mut resolved, ov);
    }
    resolved
}

fn base_fill(step: &StepDeclaration, kind: StepType) -> ResolvedStep {
    let mut platforms = step.platforms.clone().unwrap_or_default();
    if kind.is_linux_only() && platforms.is_unset() {
        platforms = Restriction::only(vec![Os::Linux]);
    }

    ResolvedStep {
        name: step.name.clone(),
        kind,
        enabled: step.enabled.clone(),
        tags: step.tags.clone().unwrap_or_default(),
        env: step.env.clone().unwrap_or_default(),
        platform_env: step.platform_env.clone().unwrap_or_default(),
        platforms,
        machines: step.machines.clone().unwrap_or_default(),
        steps: step.steps.clone().unwrap_or_default(),
        opts: step.opts.clone().unwrap_or_default(),
        bin_name: step.bin_name.clone(),
        pre_install: step.pre_install.clone(),
        post_install: step.post_install.clone(),
        pre_update: step.pre_update.clone(),
        post_update: step.post_update.clone(),
        check_installed: step.check_installed.clone(),
        check_has_update: step.check_has_update.clone(),
        shell: step.shell.clone().unwrap_or_default(),
        skip_summary: step.skip_summary.unwrap_or_default(),
    }
}

fn apply_override(step: &mut ResolvedStep, ov: &StepOverride) {
    if let Some(opts) = &ov.opts {
        step.opts
            .extend(opts.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(env) = &ov.env {
        step.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(platform_env) = &ov.platform_env {
        for (os, env) in platform_env {
            step.platform_env
                .entry(*os)
                .or_default()
                .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    if let Some(platforms) = &ov.platforms {
        step.platforms = platforms.clone();
    }

    replace_if_present(&mut step.pre_install, ov.pre_install.as_ref());
    replace_if_present(&mut step.post_install, ov.post_install.as_ref());
    replace_if_present(&mut step.pre_update, ov.pre_update.as_ref());
    replace_if_present(&mut step.post_update, ov.post_update.as_ref());
    replace_if_present(&mut step.check_installed, ov.check_installed.as_ref());
    replace_if_present(&mut step.check_has_update, ov.check_has_update.as_ref());
}

fn replace_if_present(field: &mut Option<String>, value: Option<&String>) {
    if let Some(v) = value {
        *field = Some(v.clone());
    }
}
